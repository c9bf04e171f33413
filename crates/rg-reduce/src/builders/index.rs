use crate::builders::{emit, working_input};
use crate::error::{ReduceError, Result};
use crate::graph::{ArgKind, Graph, GraphBuilder, ReduceKind};
use crate::plan::ReductionPlan;
use crate::request::ReduceOp;

fn single_axis(plan: &ReductionPlan) -> Result<usize> {
    match plan.graph_axes().as_slice() {
        [axis] => Ok(*axis),
        axes => Err(ReduceError::internal(format!(
            "{} planned over {:?}, expected one axis",
            plan.op, axes
        ))),
    }
}

/// argmax/argmin. Ties resolve to the first occurrence and NaN counts as the
/// extremum. The index is clamped into `[0, i64::MAX]`.
pub(super) fn build_arg_reduce(plan: &ReductionPlan) -> Result<Graph> {
    let kind = match plan.op {
        ReduceOp::Argmax => ArgKind::Max,
        ReduceOp::Argmin => ArgKind::Min,
        other => {
            return Err(ReduceError::internal(format!(
                "build_arg_reduce cannot build {}",
                other
            )))
        }
    };
    let mut g = GraphBuilder::new();
    let x = working_input(&mut g, plan)?;
    let index = g.arg_reduce(kind, x, single_axis(plan)?)?;
    let index = g.clamp(index, 0.0, i64::MAX as f64);
    emit(&mut g, plan, 0, index)?;
    g.finish()
}

/// max/min along one dim, returning (values, indices).
pub(super) fn build_extremum_with_index(plan: &ReductionPlan) -> Result<Graph> {
    let (reduce, arg) = match plan.op {
        ReduceOp::MaxDim => (ReduceKind::Max, ArgKind::Max),
        ReduceOp::MinDim => (ReduceKind::Min, ArgKind::Min),
        other => {
            return Err(ReduceError::internal(format!(
                "build_extremum_with_index cannot build {}",
                other
            )))
        }
    };
    let axis = single_axis(plan)?;
    let mut g = GraphBuilder::new();
    let x = working_input(&mut g, plan)?;
    let values = g.reduce(reduce, x, &[axis])?;
    let indices = g.arg_reduce(arg, x, axis)?;
    emit(&mut g, plan, 0, values)?;
    emit(&mut g, plan, 1, indices)?;
    g.finish()
}

#[cfg(test)]
mod tests {
    use crate::builders::test_support::run;
    use crate::request::{ReduceOp, ReductionRequest};
    use rg_tensor::{CpuStorage, Tensor};

    #[test]
    fn test_argmax_ties_pick_first() {
        let x = Tensor::new(vec![1.0, 3.0, 3.0, 2.0], [4]);
        let out = run(&ReductionRequest::new(ReduceOp::Argmax, &x), &x, None);
        assert_eq!(out, vec![vec![1.0]]);
        let y = Tensor::new(vec![2.0, 0.0, 0.0], [3]);
        let out = run(&ReductionRequest::new(ReduceOp::Argmin, &y), &y, None);
        assert_eq!(out, vec![vec![1.0]]);
    }

    #[test]
    fn test_argmax_flattens_without_dim() {
        let x = Tensor::new(vec![1.0, 2.0, 9.0, 4.0, 5.0, 6.0], [2, 3]);
        let out = run(&ReductionRequest::new(ReduceOp::Argmax, &x), &x, None);
        assert_eq!(out, vec![vec![2.0]]);
    }

    #[test]
    fn test_argmin_along_dim() {
        let x = Tensor::new(vec![1.0, 2.0, 9.0, 4.0, 0.0, 6.0], [2, 3]);
        let out = run(&ReductionRequest::new(ReduceOp::Argmin, &x).with_dims(&[0]), &x, None);
        assert_eq!(out, vec![vec![0.0, 1.0, 1.0]]);
        let out = run(&ReductionRequest::new(ReduceOp::Argmin, &x).with_dims(&[-1]), &x, None);
        assert_eq!(out, vec![vec![0.0, 1.0]]);
    }

    #[test]
    fn test_argmax_nan_wins() {
        let x = Tensor::new(vec![1.0, f32::NAN, 5.0], [3]);
        let out = run(&ReductionRequest::new(ReduceOp::Argmax, &x), &x, None);
        assert_eq!(out, vec![vec![1.0]]);
    }

    #[test]
    fn test_argmax_of_u8_upcasts() {
        let x = Tensor::from_storage(CpuStorage::U8(vec![7, 200, 13]), [3]).unwrap();
        let out = run(&ReductionRequest::new(ReduceOp::Argmax, &x), &x, None);
        assert_eq!(out, vec![vec![1.0]]);
    }

    #[test]
    fn test_max_dim_values_and_indices() {
        let x = Tensor::new(vec![1.0, 7.0, 3.0, 8.0, 2.0, 8.0], [2, 3]);
        let out = run(&ReductionRequest::new(ReduceOp::MaxDim, &x).with_dims(&[1]), &x, None);
        assert_eq!(out, vec![vec![7.0, 8.0], vec![1.0, 0.0]]);
    }

    #[test]
    fn test_min_dim_keepdim_on_integers() {
        let x = Tensor::from_storage(CpuStorage::I16(vec![4, -1, 3, -6]), [2, 2]).unwrap();
        let out = run(
            &ReductionRequest::new(ReduceOp::MinDim, &x)
                .with_dims(&[0])
                .with_keepdim(true),
            &x,
            None,
        );
        assert_eq!(out, vec![vec![3.0, -6.0], vec![1.0, 1.0]]);
    }
}
