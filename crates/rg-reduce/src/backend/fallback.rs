//! Host-side median for streams without a native sort.

use rg_tensor::Tensor;

use crate::builders::lower_median_index;
use crate::error::{ReduceError, Result};
use crate::plan::ReductionPlan;
use crate::request::ReduceOp;
use crate::stream::cpu::sort_along;

/// Compute median or median_dim for `plan` on the host and copy the
/// (values, indices) results into `outputs`.
///
/// Produces exactly what the native graph would: the lower median of each
/// lane under a stable ascending sort with NaN last.
pub(crate) fn median(
    plan: &ReductionPlan,
    input: &Tensor,
    outputs: &mut [&mut Tensor],
) -> Result<()> {
    if !matches!(plan.op, ReduceOp::Median | ReduceOp::MedianDim) {
        return Err(ReduceError::internal(format!(
            "host fallback cannot run {}",
            plan.op
        )));
    }
    let shape = &plan.projection.apparent_input_shape;
    let axis = match plan.graph_axes().as_slice() {
        [axis] => *axis,
        axes => {
            return Err(ReduceError::internal(format!(
                "{} planned over {:?}",
                plan.op, axes
            )))
        }
    };
    let x = input.to_f64_vec();
    if x.len() != shape.numel() {
        return Err(ReduceError::internal(format!(
            "input holds {} elements, planned shape {} needs {}",
            x.len(),
            shape,
            shape.numel()
        )));
    }

    let dims = shape.dims();
    let outer: usize = dims[..axis].iter().product();
    let n = dims[axis];
    let inner: usize = dims[axis + 1..].iter().product();
    let k = lower_median_index(n)?;

    let (sorted, order) = sort_along(&x, shape, axis);
    let mut values = Vec::with_capacity(outer * inner);
    let mut indices = Vec::with_capacity(outer * inner);
    for o in 0..outer {
        for i in 0..inner {
            let at = (o * n + k) * inner + i;
            values.push(sorted[at]);
            indices.push(order[at]);
        }
    }

    for ((out, spec), data) in outputs.iter_mut().zip(&plan.outputs).zip([values, indices]) {
        if out.numel() != data.len() || out.dtype() != spec.dtype {
            return Err(ReduceError::internal(format!(
                "destination '{}' does not match the planned output",
                spec.name
            )));
        }
        out.storage_mut().fill_from_f64(&data)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::ReductionRequest;
    use rg_tensor::{CpuStorage, DType};

    fn destinations(plan: &ReductionPlan) -> Vec<Tensor> {
        plan.outputs
            .iter()
            .map(|o| Tensor::zeros(o.logical_shape.clone(), o.dtype))
            .collect()
    }

    #[test]
    fn test_fallback_median() {
        let x = Tensor::new(vec![5.0, 1.0, 3.0, 2.0, 4.0, 6.0], [6]);
        let plan = ReductionPlan::new(&ReductionRequest::new(ReduceOp::Median, &x)).unwrap();
        let mut outs = destinations(&plan);
        let mut refs: Vec<&mut Tensor> = outs.iter_mut().collect();
        median(&plan, &x, &mut refs).unwrap();
        assert_eq!(outs[0].to_f64_vec(), vec![3.0]);
    }

    #[test]
    fn test_fallback_median_dim() {
        let x = Tensor::from_storage(CpuStorage::I32(vec![3, 9, 1, 7, 5, 8]), [3, 2]).unwrap();
        let request = ReductionRequest::new(ReduceOp::MedianDim, &x).with_dims(&[0]);
        let plan = ReductionPlan::new(&request).unwrap();
        let mut outs = destinations(&plan);
        let mut refs: Vec<&mut Tensor> = outs.iter_mut().collect();
        median(&plan, &x, &mut refs).unwrap();
        assert_eq!(outs[0].dtype(), DType::I32);
        assert_eq!(outs[0].to_f64_vec(), vec![3.0, 8.0]);
        assert_eq!(outs[1].to_f64_vec(), vec![0.0, 2.0]);
    }

    #[test]
    fn test_fallback_rejects_other_ops() {
        let x = Tensor::new(vec![1.0], [1]);
        let plan = ReductionPlan::new(&ReductionRequest::new(ReduceOp::Sum, &x)).unwrap();
        let mut outs = destinations(&plan);
        let mut refs: Vec<&mut Tensor> = outs.iter_mut().collect();
        assert!(matches!(median(&plan, &x, &mut refs), Err(ReduceError::Internal(_))));
    }
}
