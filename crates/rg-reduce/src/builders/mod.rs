//! Graph builders, one per operator family.
//!
//! [`builder_for`] is a closed table from operator kind to an isolated build
//! function. Every build function reads only the [`ReductionPlan`], so each
//! can be exercised on its own.

mod basic;
mod index;
mod median;
mod norm;
mod stats;

use crate::error::{ReduceError, Result};
use crate::graph::{Graph, GraphBuilder, NodeId};
use crate::plan::ReductionPlan;
use crate::request::ReduceOp;

pub(crate) use median::lower_median_index;

pub type BuildFn = fn(&ReductionPlan) -> Result<Graph>;

pub fn builder_for(op: ReduceOp) -> BuildFn {
    match op {
        ReduceOp::Sum
        | ReduceOp::Mean
        | ReduceOp::Prod
        | ReduceOp::Amax
        | ReduceOp::Amin
        | ReduceOp::Max
        | ReduceOp::Min => basic::build_reduce,
        ReduceOp::NanSum => basic::build_nansum,
        ReduceOp::Aminmax => basic::build_aminmax,
        ReduceOp::CountNonzero => basic::build_count_nonzero,
        ReduceOp::Trace => basic::build_trace,
        ReduceOp::Any | ReduceOp::All => basic::build_logical,
        ReduceOp::Norm => norm::build_norm,
        ReduceOp::Cdist => norm::build_cdist,
        ReduceOp::Var | ReduceOp::Std | ReduceOp::VarMean | ReduceOp::StdMean => {
            stats::build_variance
        }
        ReduceOp::Argmax | ReduceOp::Argmin => index::build_arg_reduce,
        ReduceOp::MaxDim | ReduceOp::MinDim => index::build_extremum_with_index,
        ReduceOp::Median => median::build_median,
        ReduceOp::MedianDim => median::build_median_dim,
    }
}

/// Build the graph for `plan`.
pub fn build(plan: &ReductionPlan) -> Result<Graph> {
    builder_for(plan.op)(plan)
}

/// Declare operand `index` of the plan as a graph placeholder.
fn operand(g: &mut GraphBuilder, plan: &ReductionPlan, index: usize) -> Result<NodeId> {
    let spec = plan
        .operands
        .get(index)
        .ok_or_else(|| ReduceError::internal(format!("{} has no operand {}", plan.op, index)))?;
    Ok(g.placeholder(spec.name, spec.dtype, spec.apparent_shape.clone()))
}

/// Declare the primary input and cast it to the plan's working dtype.
fn working_input(g: &mut GraphBuilder, plan: &ReductionPlan) -> Result<NodeId> {
    let x = operand(g, plan, 0)?;
    Ok(g.cast(x, plan.working))
}

/// Cast `node` to output `index`'s dtype and register it under its name.
fn emit(g: &mut GraphBuilder, plan: &ReductionPlan, index: usize, node: NodeId) -> Result<()> {
    let out = plan
        .outputs
        .get(index)
        .ok_or_else(|| ReduceError::internal(format!("{} has no output {}", plan.op, index)))?;
    let node = g.cast(node, out.dtype);
    if g.shape(node) != &out.apparent_shape {
        return Err(ReduceError::internal(format!(
            "{}: output '{}' built with shape {}, planned {}",
            plan.op,
            out.name,
            g.shape(node),
            out.apparent_shape
        )));
    }
    g.output(out.name, node);
    Ok(())
}

#[cfg(test)]
pub(crate) mod test_support {
    use rg_tensor::{CpuStorage, Tensor};

    use crate::plan::ReductionPlan;
    use crate::request::ReductionRequest;
    use crate::stream::{ComputeStream, CpuStream, InputBinding, OutputBinding};

    /// Plan, build and run `request` on the CPU stream, returning each output
    /// as widened values.
    pub fn run(
        request: &ReductionRequest,
        input: &Tensor,
        other: Option<&Tensor>,
    ) -> Vec<Vec<f64>> {
        let plan = ReductionPlan::new(request).unwrap();
        let graph = super::build(&plan).unwrap();
        let operands: Vec<&Tensor> = std::iter::once(input).chain(other).collect();
        let inputs: Vec<InputBinding<'_>> = plan
            .operands
            .iter()
            .zip(&operands)
            .map(|(spec, t)| InputBinding {
                name: spec.name,
                storage: t.storage(),
                shape: &spec.apparent_shape,
            })
            .collect();
        let mut storages: Vec<CpuStorage> = plan
            .outputs
            .iter()
            .map(|o| CpuStorage::zeros(o.dtype, o.apparent_shape.numel()))
            .collect();
        let mut outputs: Vec<OutputBinding<'_>> = plan
            .outputs
            .iter()
            .zip(storages.iter_mut())
            .map(|(spec, storage)| OutputBinding {
                name: spec.name,
                storage,
                shape: &spec.apparent_shape,
            })
            .collect();
        CpuStream::new().submit(&graph, &inputs, &mut outputs).unwrap();
        drop(outputs);
        storages.iter().map(|s| s.to_f64_vec()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::{ReductionRequest, TensorDesc};
    use rg_tensor::{DType, Shape};

    #[test]
    fn test_every_op_builds_its_outputs() {
        let cases = [
            (ReduceOp::Sum, None),
            (ReduceOp::NanSum, None),
            (ReduceOp::Mean, None),
            (ReduceOp::Prod, None),
            (ReduceOp::Amax, None),
            (ReduceOp::Amin, None),
            (ReduceOp::Max, None),
            (ReduceOp::Min, None),
            (ReduceOp::Aminmax, None),
            (ReduceOp::CountNonzero, None),
            (ReduceOp::Trace, None),
            (ReduceOp::Any, None),
            (ReduceOp::All, None),
            (ReduceOp::Norm, None),
            (ReduceOp::Var, None),
            (ReduceOp::Std, None),
            (ReduceOp::VarMean, None),
            (ReduceOp::StdMean, None),
            (ReduceOp::Argmax, None),
            (ReduceOp::Argmin, Some(1)),
            (ReduceOp::MaxDim, Some(0)),
            (ReduceOp::MinDim, Some(1)),
            (ReduceOp::Median, None),
            (ReduceOp::MedianDim, Some(-1)),
        ];
        for (op, dim) in cases {
            let mut request =
                ReductionRequest::new(op, TensorDesc::new(DType::F16, Shape::from([3, 4])));
            if let Some(dim) = dim {
                request = request.with_dims(&[dim]);
            }
            let plan = ReductionPlan::new(&request).unwrap();
            let graph = build(&plan).unwrap();
            assert_eq!(graph.outputs().len(), op.output_names().len(), "{}", op);
            for (handle, spec) in graph.outputs().iter().zip(&plan.outputs) {
                assert_eq!(handle.name, spec.name);
                assert_eq!(handle.dtype, spec.dtype, "{}", op);
                assert_eq!(handle.shape, spec.apparent_shape, "{}", op);
            }
        }
    }

    #[test]
    fn test_cdist_builds() {
        let request = ReductionRequest::new(
            ReduceOp::Cdist,
            TensorDesc::new(DType::F32, Shape::from([2, 3])),
        )
        .with_other(TensorDesc::new(DType::F32, Shape::from([4, 3])));
        let plan = ReductionPlan::new(&request).unwrap();
        let graph = build(&plan).unwrap();
        assert_eq!(graph.inputs().len(), 2);
        assert_eq!(graph.outputs()[0].shape.dims(), &[1, 2, 4]);
    }
}
