//! The reduction entry points.
//!
//! Every call follows the same path: validate and plan, short-circuit
//! zero-size work, fetch or build the cached graph for the plan's signature,
//! then bind the caller's buffers and submit. Each operator has a
//! destination-buffer form (`*_into`) and an allocating form that asks the
//! tensor layer for zero-initialized outputs of the logical shape.

use std::sync::{Arc, OnceLock};

use rg_tensor::{DType, Tensor};
use tracing::debug;

use crate::backend::{self, fallback, ExecutionBackend};
use crate::builders;
use crate::cache::GraphCache;
use crate::error::{ReduceError, Result};
use crate::executor::Executor;
use crate::plan::ReductionPlan;
use crate::request::{ReduceOp, ReductionRequest, TensorDesc};
use crate::stream::{ComputeStream, CpuStream};

/// Options fixed when an engine is created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineOptions {
    /// Force a backend instead of probing the stream.
    pub backend: Option<ExecutionBackend>,
}

impl EngineOptions {
    pub fn with_backend(mut self, backend: ExecutionBackend) -> Self {
        self.backend = Some(backend);
        self
    }
}

/// Owns the graph cache and the stream graphs are submitted to.
///
/// The engine is `Send + Sync`; concurrent callers share one cache and
/// observe at most one build per signature.
#[derive(Debug)]
pub struct ReductionEngine {
    stream: Arc<dyn ComputeStream>,
    cache: GraphCache,
    options: EngineOptions,
    backend: OnceLock<ExecutionBackend>,
}

impl Default for ReductionEngine {
    fn default() -> Self {
        Self::new(Arc::new(CpuStream::new()))
    }
}

impl ReductionEngine {
    pub fn new(stream: Arc<dyn ComputeStream>) -> Self {
        Self::with_options(stream, EngineOptions::default())
    }

    pub fn with_options(stream: Arc<dyn ComputeStream>, options: EngineOptions) -> Self {
        ReductionEngine {
            stream,
            cache: GraphCache::new(),
            options,
            backend: OnceLock::new(),
        }
    }

    pub fn stream(&self) -> &dyn ComputeStream {
        self.stream.as_ref()
    }

    pub fn cache(&self) -> &GraphCache {
        &self.cache
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// The backend median runs on. Probed on first use, never again.
    pub fn backend(&self) -> ExecutionBackend {
        *self.backend.get_or_init(|| match self.options.backend {
            Some(forced) => forced,
            None => backend::select(self.stream.as_ref()),
        })
    }

    /// Run `request` writing into caller-provided destinations, one per
    /// output of the operator, each of the logical output shape and result
    /// dtype.
    pub fn execute(
        &self,
        request: &ReductionRequest,
        input: &Tensor,
        other: Option<&Tensor>,
        outputs: &mut [&mut Tensor],
    ) -> Result<()> {
        check_operands(request, input, other)?;
        let plan = ReductionPlan::new(request)?;
        check_destinations(&plan, outputs)?;
        self.run(&plan, input, other, outputs)
    }

    /// Run `request` into freshly allocated outputs.
    pub fn reduce(
        &self,
        request: &ReductionRequest,
        input: &Tensor,
        other: Option<&Tensor>,
    ) -> Result<Vec<Tensor>> {
        check_operands(request, input, other)?;
        let plan = ReductionPlan::new(request)?;
        let mut outputs: Vec<Tensor> = plan
            .outputs
            .iter()
            .map(|o| Tensor::zeros(o.logical_shape.clone(), o.dtype).on_device(input.device()))
            .collect();
        let mut refs: Vec<&mut Tensor> = outputs.iter_mut().collect();
        self.run(&plan, input, other, &mut refs)?;
        Ok(outputs)
    }

    fn run(
        &self,
        plan: &ReductionPlan,
        input: &Tensor,
        other: Option<&Tensor>,
        outputs: &mut [&mut Tensor],
    ) -> Result<()> {
        if plan.is_zero_size() {
            debug!(
                op = plan.op.name(),
                input = %plan.input.shape,
                "zero-size reduction, graph skipped"
            );
            if plan.op == ReduceOp::Prod {
                for out in outputs.iter_mut() {
                    out.storage_mut().fill(1.0);
                }
            }
            return Ok(());
        }

        if matches!(plan.op, ReduceOp::MaxDim | ReduceOp::MinDim) && plan.input.shape.ndim() == 0 {
            debug!(op = plan.op.name(), "rank-0 input, element copied without a graph");
            let given = outputs.len();
            let [values, indices] = outputs else {
                return Err(ReduceError::internal(format!(
                    "{} expects two destinations, got {}",
                    plan.op, given
                )));
            };
            values.storage_mut().copy_element(0, input.storage(), 0);
            indices.storage_mut().fill(0.0);
            return Ok(());
        }

        if matches!(plan.op, ReduceOp::Median | ReduceOp::MedianDim)
            && self.backend() == ExecutionBackend::HostFallback
        {
            return fallback::median(plan, input, outputs);
        }

        let cached = self
            .cache
            .get_or_build(&plan.signature(), || builders::build(plan))?;
        let operands: Vec<&Tensor> = std::iter::once(input).chain(other).collect();
        Executor::new(self.stream.as_ref()).run(&cached, plan, &operands, outputs)
    }

    pub fn sum(
        &self,
        input: &Tensor,
        dims: Option<&[i64]>,
        keepdim: bool,
        dtype: Option<DType>,
    ) -> Result<Tensor> {
        single(self.reduce(&typed(ReduceOp::Sum, input, dims, keepdim, dtype), input, None)?)
    }

    pub fn sum_into(
        &self,
        input: &Tensor,
        dims: Option<&[i64]>,
        keepdim: bool,
        dtype: Option<DType>,
        out: &mut Tensor,
    ) -> Result<()> {
        self.execute(&typed(ReduceOp::Sum, input, dims, keepdim, dtype), input, None, &mut [out])
    }

    /// Sum treating NaN as zero.
    pub fn nansum(
        &self,
        input: &Tensor,
        dims: Option<&[i64]>,
        keepdim: bool,
        dtype: Option<DType>,
    ) -> Result<Tensor> {
        single(self.reduce(&typed(ReduceOp::NanSum, input, dims, keepdim, dtype), input, None)?)
    }

    pub fn nansum_into(
        &self,
        input: &Tensor,
        dims: Option<&[i64]>,
        keepdim: bool,
        dtype: Option<DType>,
        out: &mut Tensor,
    ) -> Result<()> {
        self.execute(&typed(ReduceOp::NanSum, input, dims, keepdim, dtype), input, None, &mut [out])
    }

    pub fn mean(
        &self,
        input: &Tensor,
        dims: Option<&[i64]>,
        keepdim: bool,
        dtype: Option<DType>,
    ) -> Result<Tensor> {
        single(self.reduce(&typed(ReduceOp::Mean, input, dims, keepdim, dtype), input, None)?)
    }

    pub fn mean_into(
        &self,
        input: &Tensor,
        dims: Option<&[i64]>,
        keepdim: bool,
        dtype: Option<DType>,
        out: &mut Tensor,
    ) -> Result<()> {
        self.execute(&typed(ReduceOp::Mean, input, dims, keepdim, dtype), input, None, &mut [out])
    }

    pub fn prod(
        &self,
        input: &Tensor,
        dims: Option<&[i64]>,
        keepdim: bool,
        dtype: Option<DType>,
    ) -> Result<Tensor> {
        single(self.reduce(&typed(ReduceOp::Prod, input, dims, keepdim, dtype), input, None)?)
    }

    pub fn prod_into(
        &self,
        input: &Tensor,
        dims: Option<&[i64]>,
        keepdim: bool,
        dtype: Option<DType>,
        out: &mut Tensor,
    ) -> Result<()> {
        self.execute(&typed(ReduceOp::Prod, input, dims, keepdim, dtype), input, None, &mut [out])
    }

    pub fn amax(&self, input: &Tensor, dims: Option<&[i64]>, keepdim: bool) -> Result<Tensor> {
        single(self.reduce(&over(ReduceOp::Amax, input, dims, keepdim), input, None)?)
    }

    pub fn amax_into(
        &self,
        input: &Tensor,
        dims: Option<&[i64]>,
        keepdim: bool,
        out: &mut Tensor,
    ) -> Result<()> {
        self.execute(&over(ReduceOp::Amax, input, dims, keepdim), input, None, &mut [out])
    }

    pub fn amin(&self, input: &Tensor, dims: Option<&[i64]>, keepdim: bool) -> Result<Tensor> {
        single(self.reduce(&over(ReduceOp::Amin, input, dims, keepdim), input, None)?)
    }

    pub fn amin_into(
        &self,
        input: &Tensor,
        dims: Option<&[i64]>,
        keepdim: bool,
        out: &mut Tensor,
    ) -> Result<()> {
        self.execute(&over(ReduceOp::Amin, input, dims, keepdim), input, None, &mut [out])
    }

    /// Largest element of the whole tensor.
    pub fn max(&self, input: &Tensor) -> Result<Tensor> {
        single(self.reduce(&ReductionRequest::new(ReduceOp::Max, input), input, None)?)
    }

    pub fn max_into(&self, input: &Tensor, out: &mut Tensor) -> Result<()> {
        self.execute(&ReductionRequest::new(ReduceOp::Max, input), input, None, &mut [out])
    }

    /// Smallest element of the whole tensor.
    pub fn min(&self, input: &Tensor) -> Result<Tensor> {
        single(self.reduce(&ReductionRequest::new(ReduceOp::Min, input), input, None)?)
    }

    pub fn min_into(&self, input: &Tensor, out: &mut Tensor) -> Result<()> {
        self.execute(&ReductionRequest::new(ReduceOp::Min, input), input, None, &mut [out])
    }

    /// `(amin, amax)` from one graph.
    pub fn aminmax(
        &self,
        input: &Tensor,
        dims: Option<&[i64]>,
        keepdim: bool,
    ) -> Result<(Tensor, Tensor)> {
        pair(self.reduce(&over(ReduceOp::Aminmax, input, dims, keepdim), input, None)?)
    }

    pub fn aminmax_into(
        &self,
        input: &Tensor,
        dims: Option<&[i64]>,
        keepdim: bool,
        min: &mut Tensor,
        max: &mut Tensor,
    ) -> Result<()> {
        self.execute(&over(ReduceOp::Aminmax, input, dims, keepdim), input, None, &mut [min, max])
    }

    pub fn count_nonzero(
        &self,
        input: &Tensor,
        dims: Option<&[i64]>,
        keepdim: bool,
    ) -> Result<Tensor> {
        single(self.reduce(&over(ReduceOp::CountNonzero, input, dims, keepdim), input, None)?)
    }

    pub fn count_nonzero_into(
        &self,
        input: &Tensor,
        dims: Option<&[i64]>,
        keepdim: bool,
        out: &mut Tensor,
    ) -> Result<()> {
        self.execute(&over(ReduceOp::CountNonzero, input, dims, keepdim), input, None, &mut [out])
    }

    /// Sum of the main diagonal of a 2-D input.
    pub fn trace(&self, input: &Tensor) -> Result<Tensor> {
        single(self.reduce(&ReductionRequest::new(ReduceOp::Trace, input), input, None)?)
    }

    pub fn trace_into(&self, input: &Tensor, out: &mut Tensor) -> Result<()> {
        self.execute(&ReductionRequest::new(ReduceOp::Trace, input), input, None, &mut [out])
    }

    pub fn any(&self, input: &Tensor, dims: Option<&[i64]>, keepdim: bool) -> Result<Tensor> {
        single(self.reduce(&over(ReduceOp::Any, input, dims, keepdim), input, None)?)
    }

    pub fn any_into(
        &self,
        input: &Tensor,
        dims: Option<&[i64]>,
        keepdim: bool,
        out: &mut Tensor,
    ) -> Result<()> {
        self.execute(&over(ReduceOp::Any, input, dims, keepdim), input, None, &mut [out])
    }

    pub fn all(&self, input: &Tensor, dims: Option<&[i64]>, keepdim: bool) -> Result<Tensor> {
        single(self.reduce(&over(ReduceOp::All, input, dims, keepdim), input, None)?)
    }

    pub fn all_into(
        &self,
        input: &Tensor,
        dims: Option<&[i64]>,
        keepdim: bool,
        out: &mut Tensor,
    ) -> Result<()> {
        self.execute(&over(ReduceOp::All, input, dims, keepdim), input, None, &mut [out])
    }

    /// p-norm over `dims`. `p` may be 0, any positive value, or ±inf.
    pub fn norm(
        &self,
        input: &Tensor,
        p: f64,
        dims: Option<&[i64]>,
        keepdim: bool,
        dtype: Option<DType>,
    ) -> Result<Tensor> {
        let request = typed(ReduceOp::Norm, input, dims, keepdim, dtype).with_scalar(p);
        single(self.reduce(&request, input, None)?)
    }

    pub fn norm_into(
        &self,
        input: &Tensor,
        p: f64,
        dims: Option<&[i64]>,
        keepdim: bool,
        dtype: Option<DType>,
        out: &mut Tensor,
    ) -> Result<()> {
        let request = typed(ReduceOp::Norm, input, dims, keepdim, dtype).with_scalar(p);
        self.execute(&request, input, None, &mut [out])
    }

    /// Pairwise p-norm distances between the rows of `x1` (`[*, r1, c]`) and
    /// `x2` (`[*, r2, c]`), shaped `[*, r1, r2]`.
    pub fn cdist(&self, x1: &Tensor, x2: &Tensor, p: f64) -> Result<Tensor> {
        let request = ReductionRequest::new(ReduceOp::Cdist, x1)
            .with_other(x2)
            .with_scalar(p);
        single(self.reduce(&request, x1, Some(x2))?)
    }

    pub fn cdist_into(&self, x1: &Tensor, x2: &Tensor, p: f64, out: &mut Tensor) -> Result<()> {
        let request = ReductionRequest::new(ReduceOp::Cdist, x1)
            .with_other(x2)
            .with_scalar(p);
        self.execute(&request, x1, Some(x2), &mut [out])
    }

    pub fn var(
        &self,
        input: &Tensor,
        dims: Option<&[i64]>,
        correction: f64,
        keepdim: bool,
    ) -> Result<Tensor> {
        let request = over(ReduceOp::Var, input, dims, keepdim).with_scalar(correction);
        single(self.reduce(&request, input, None)?)
    }

    pub fn var_into(
        &self,
        input: &Tensor,
        dims: Option<&[i64]>,
        correction: f64,
        keepdim: bool,
        out: &mut Tensor,
    ) -> Result<()> {
        let request = over(ReduceOp::Var, input, dims, keepdim).with_scalar(correction);
        self.execute(&request, input, None, &mut [out])
    }

    pub fn std(
        &self,
        input: &Tensor,
        dims: Option<&[i64]>,
        correction: f64,
        keepdim: bool,
    ) -> Result<Tensor> {
        let request = over(ReduceOp::Std, input, dims, keepdim).with_scalar(correction);
        single(self.reduce(&request, input, None)?)
    }

    pub fn std_into(
        &self,
        input: &Tensor,
        dims: Option<&[i64]>,
        correction: f64,
        keepdim: bool,
        out: &mut Tensor,
    ) -> Result<()> {
        let request = over(ReduceOp::Std, input, dims, keepdim).with_scalar(correction);
        self.execute(&request, input, None, &mut [out])
    }

    /// `(var, mean)` from one graph.
    pub fn var_mean(
        &self,
        input: &Tensor,
        dims: Option<&[i64]>,
        correction: f64,
        keepdim: bool,
    ) -> Result<(Tensor, Tensor)> {
        let request = over(ReduceOp::VarMean, input, dims, keepdim).with_scalar(correction);
        pair(self.reduce(&request, input, None)?)
    }

    pub fn var_mean_into(
        &self,
        input: &Tensor,
        dims: Option<&[i64]>,
        correction: f64,
        keepdim: bool,
        var: &mut Tensor,
        mean: &mut Tensor,
    ) -> Result<()> {
        let request = over(ReduceOp::VarMean, input, dims, keepdim).with_scalar(correction);
        self.execute(&request, input, None, &mut [var, mean])
    }

    /// `(std, mean)` from one graph.
    pub fn std_mean(
        &self,
        input: &Tensor,
        dims: Option<&[i64]>,
        correction: f64,
        keepdim: bool,
    ) -> Result<(Tensor, Tensor)> {
        let request = over(ReduceOp::StdMean, input, dims, keepdim).with_scalar(correction);
        pair(self.reduce(&request, input, None)?)
    }

    pub fn std_mean_into(
        &self,
        input: &Tensor,
        dims: Option<&[i64]>,
        correction: f64,
        keepdim: bool,
        std: &mut Tensor,
        mean: &mut Tensor,
    ) -> Result<()> {
        let request = over(ReduceOp::StdMean, input, dims, keepdim).with_scalar(correction);
        self.execute(&request, input, None, &mut [std, mean])
    }

    /// Index of the largest element along `dim`, or of the flattened input.
    pub fn argmax(&self, input: &Tensor, dim: Option<i64>, keepdim: bool) -> Result<Tensor> {
        single(self.reduce(&along(ReduceOp::Argmax, input, dim, keepdim), input, None)?)
    }

    pub fn argmax_into(
        &self,
        input: &Tensor,
        dim: Option<i64>,
        keepdim: bool,
        out: &mut Tensor,
    ) -> Result<()> {
        self.execute(&along(ReduceOp::Argmax, input, dim, keepdim), input, None, &mut [out])
    }

    pub fn argmin(&self, input: &Tensor, dim: Option<i64>, keepdim: bool) -> Result<Tensor> {
        single(self.reduce(&along(ReduceOp::Argmin, input, dim, keepdim), input, None)?)
    }

    pub fn argmin_into(
        &self,
        input: &Tensor,
        dim: Option<i64>,
        keepdim: bool,
        out: &mut Tensor,
    ) -> Result<()> {
        self.execute(&along(ReduceOp::Argmin, input, dim, keepdim), input, None, &mut [out])
    }

    /// `(values, indices)` of the maximum along `dim`.
    pub fn max_dim(&self, input: &Tensor, dim: i64, keepdim: bool) -> Result<(Tensor, Tensor)> {
        pair(self.reduce(&along(ReduceOp::MaxDim, input, Some(dim), keepdim), input, None)?)
    }

    pub fn max_dim_into(
        &self,
        input: &Tensor,
        dim: i64,
        keepdim: bool,
        values: &mut Tensor,
        indices: &mut Tensor,
    ) -> Result<()> {
        let request = along(ReduceOp::MaxDim, input, Some(dim), keepdim);
        self.execute(&request, input, None, &mut [values, indices])
    }

    /// `(values, indices)` of the minimum along `dim`.
    pub fn min_dim(&self, input: &Tensor, dim: i64, keepdim: bool) -> Result<(Tensor, Tensor)> {
        pair(self.reduce(&along(ReduceOp::MinDim, input, Some(dim), keepdim), input, None)?)
    }

    pub fn min_dim_into(
        &self,
        input: &Tensor,
        dim: i64,
        keepdim: bool,
        values: &mut Tensor,
        indices: &mut Tensor,
    ) -> Result<()> {
        let request = along(ReduceOp::MinDim, input, Some(dim), keepdim);
        self.execute(&request, input, None, &mut [values, indices])
    }

    /// Lower median of the flattened input.
    ///
    /// NaN sorts after every number, so NaN is returned only once the lower
    /// median position falls among the NaNs: `[1, NaN, 3]` gives 3.
    pub fn median(&self, input: &Tensor) -> Result<Tensor> {
        single(self.reduce(&ReductionRequest::new(ReduceOp::Median, input), input, None)?)
    }

    pub fn median_into(&self, input: &Tensor, out: &mut Tensor) -> Result<()> {
        self.execute(&ReductionRequest::new(ReduceOp::Median, input), input, None, &mut [out])
    }

    /// `(values, indices)` of the lower median along `dim`. NaN ordering
    /// follows [`ReductionEngine::median`].
    pub fn median_dim(&self, input: &Tensor, dim: i64, keepdim: bool) -> Result<(Tensor, Tensor)> {
        pair(self.reduce(&along(ReduceOp::MedianDim, input, Some(dim), keepdim), input, None)?)
    }

    pub fn median_dim_into(
        &self,
        input: &Tensor,
        dim: i64,
        keepdim: bool,
        values: &mut Tensor,
        indices: &mut Tensor,
    ) -> Result<()> {
        let request = along(ReduceOp::MedianDim, input, Some(dim), keepdim);
        self.execute(&request, input, None, &mut [values, indices])
    }
}

fn over(op: ReduceOp, input: &Tensor, dims: Option<&[i64]>, keepdim: bool) -> ReductionRequest {
    let request = ReductionRequest::new(op, input).with_keepdim(keepdim);
    match dims {
        Some(dims) => request.with_dims(dims),
        None => request,
    }
}

fn typed(
    op: ReduceOp,
    input: &Tensor,
    dims: Option<&[i64]>,
    keepdim: bool,
    dtype: Option<DType>,
) -> ReductionRequest {
    let request = over(op, input, dims, keepdim);
    match dtype {
        Some(dtype) => request.with_dtype(dtype),
        None => request,
    }
}

fn along(op: ReduceOp, input: &Tensor, dim: Option<i64>, keepdim: bool) -> ReductionRequest {
    over(op, input, dim.as_ref().map(std::slice::from_ref), keepdim)
}

fn single(outputs: Vec<Tensor>) -> Result<Tensor> {
    let n = outputs.len();
    let mut outputs = outputs.into_iter();
    match (outputs.next(), outputs.next()) {
        (Some(out), None) => Ok(out),
        _ => Err(ReduceError::internal(format!("expected one output, got {}", n))),
    }
}

fn pair(outputs: Vec<Tensor>) -> Result<(Tensor, Tensor)> {
    let n = outputs.len();
    let mut outputs = outputs.into_iter();
    match (outputs.next(), outputs.next(), outputs.next()) {
        (Some(a), Some(b), None) => Ok((a, b)),
        _ => Err(ReduceError::internal(format!("expected two outputs, got {}", n))),
    }
}

/// The request must describe the tensors it is run with.
fn check_operands(
    request: &ReductionRequest,
    input: &Tensor,
    other: Option<&Tensor>,
) -> Result<()> {
    if request.input != TensorDesc::from(input) {
        return Err(ReduceError::invalid(format!(
            "input tensor ({} {} on {}) does not match the request ({} {} on {})",
            input.dtype(),
            input.shape(),
            input.device(),
            request.input.dtype,
            request.input.shape,
            request.input.device
        )));
    }
    match (&request.other, other) {
        (None, None) => Ok(()),
        (Some(desc), Some(t)) if *desc == TensorDesc::from(t) => Ok(()),
        (Some(_), Some(_)) => Err(ReduceError::invalid(
            "second operand does not match the request",
        )),
        (Some(_), None) => Err(ReduceError::invalid(
            "request names a second operand but none was given",
        )),
        (None, Some(_)) => Err(ReduceError::invalid(
            "a second operand was given but the request has none",
        )),
    }
}

fn check_destinations(plan: &ReductionPlan, outputs: &[&mut Tensor]) -> Result<()> {
    if outputs.len() != plan.outputs.len() {
        return Err(ReduceError::invalid(format!(
            "{} produces {} outputs, {} destinations given",
            plan.op,
            plan.outputs.len(),
            outputs.len()
        )));
    }
    for (spec, out) in plan.outputs.iter().zip(outputs) {
        if out.dtype() != spec.dtype || out.shape() != &spec.logical_shape {
            return Err(ReduceError::invalid(format!(
                "{}: destination '{}' is {} {}, expected {} {}",
                plan.op,
                spec.name,
                out.dtype(),
                out.shape(),
                spec.dtype,
                spec.logical_shape
            )));
        }
        if out.device() != plan.input.device {
            return Err(ReduceError::invalid(format!(
                "{}: destination '{}' is on {}, input is on {}",
                plan.op,
                spec.name,
                out.device(),
                plan.input.device
            )));
        }
    }
    Ok(())
}
