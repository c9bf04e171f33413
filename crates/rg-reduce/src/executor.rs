//! Binds caller buffers to a cached graph and submits it to the stream.
//!
//! Operands and destinations are viewed with the plan's apparent shapes. The
//! view only reinterprets the shape; no buffer is copied or reallocated.

use rg_tensor::Tensor;
use tracing::trace;

use crate::cache::CachedGraph;
use crate::error::{ReduceError, Result};
use crate::plan::ReductionPlan;
use crate::stream::{ComputeStream, InputBinding, OutputBinding};

pub struct Executor<'a> {
    stream: &'a dyn ComputeStream,
}

impl<'a> Executor<'a> {
    pub fn new(stream: &'a dyn ComputeStream) -> Self {
        Executor { stream }
    }

    /// Run `cached` with `operands` bound to the plan's inputs and `outputs`
    /// to its results, in declaration order.
    pub fn run(
        &self,
        cached: &CachedGraph,
        plan: &ReductionPlan,
        operands: &[&Tensor],
        outputs: &mut [&mut Tensor],
    ) -> Result<()> {
        if operands.len() != plan.operands.len() || outputs.len() != plan.outputs.len() {
            return Err(ReduceError::internal(format!(
                "{}: bound {} operands and {} outputs, planned {} and {}",
                plan.op,
                operands.len(),
                outputs.len(),
                plan.operands.len(),
                plan.outputs.len()
            )));
        }

        let mut inputs = Vec::with_capacity(operands.len());
        for (spec, tensor) in plan.operands.iter().zip(operands) {
            check_view(spec.name, tensor, spec.apparent_shape.numel())?;
            inputs.push(InputBinding {
                name: spec.name,
                storage: tensor.storage(),
                shape: &spec.apparent_shape,
            });
        }

        let mut bindings = Vec::with_capacity(outputs.len());
        for (spec, tensor) in plan.outputs.iter().zip(outputs.iter_mut()) {
            check_view(spec.name, tensor, spec.apparent_shape.numel())?;
            bindings.push(OutputBinding {
                name: spec.name,
                storage: tensor.storage_mut(),
                shape: &spec.apparent_shape,
            });
        }

        trace!(
            op = plan.op.name(),
            stream = self.stream.name(),
            nodes = cached.graph().nodes().len(),
            "submitting graph"
        );
        self.stream.submit(cached.graph(), &inputs, &mut bindings)
    }
}

fn check_view(name: &str, tensor: &Tensor, numel: usize) -> Result<()> {
    if tensor.numel() != numel {
        return Err(ReduceError::internal(format!(
            "'{}' holds {} elements, its apparent shape needs {}",
            name,
            tensor.numel(),
            numel
        )));
    }
    Ok(())
}
