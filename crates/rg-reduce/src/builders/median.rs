use crate::builders::{emit, working_input};
use crate::error::{ReduceError, Result};
use crate::graph::{Graph, GraphBuilder};
use crate::plan::ReductionPlan;

/// Position of the lower median in a sorted lane of `n` elements.
pub(crate) fn lower_median_index(n: usize) -> Result<usize> {
    if n == 0 {
        return Err(ReduceError::internal("median of an empty lane"));
    }
    Ok((n + 1) / 2 - 1)
}

/// Median of the flattened input.
pub(super) fn build_median(plan: &ReductionPlan) -> Result<Graph> {
    let mut g = GraphBuilder::new();
    let x = working_input(&mut g, plan)?;
    let k = lower_median_index(g.shape(x).dim(0))?;
    let sorted = g.sort(x, 0)?;
    let value = g.slice(sorted, 0, k, 1)?;
    emit(&mut g, plan, 0, value)?;
    g.finish()
}

/// Median along one dim, returning (values, indices).
pub(super) fn build_median_dim(plan: &ReductionPlan) -> Result<Graph> {
    let axis = match plan.graph_axes().as_slice() {
        [axis] => *axis,
        axes => {
            return Err(ReduceError::internal(format!(
                "median_dim planned over {:?}",
                axes
            )))
        }
    };
    let mut g = GraphBuilder::new();
    let x = working_input(&mut g, plan)?;
    let k = lower_median_index(g.shape(x).dim(axis))?;

    let sorted = g.sort(x, axis)?;
    let values = g.slice(sorted, axis, k, 1)?;
    let order = g.argsort(x, axis)?;
    let indices = g.slice(order, axis, k, 1)?;
    emit(&mut g, plan, 0, values)?;
    emit(&mut g, plan, 1, indices)?;
    g.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builders::test_support::run;
    use crate::request::{ReduceOp, ReductionRequest};
    use rg_tensor::{CpuStorage, Tensor};

    #[test]
    fn test_lower_median_index() {
        assert_eq!(lower_median_index(1).unwrap(), 0);
        assert_eq!(lower_median_index(4).unwrap(), 1);
        assert_eq!(lower_median_index(5).unwrap(), 2);
        assert!(matches!(lower_median_index(0), Err(ReduceError::Internal(_))));
    }

    #[test]
    fn test_median_odd_and_even() {
        let odd = Tensor::new(vec![5.0, 1.0, 3.0, 2.0, 4.0], [5]);
        let out = run(&ReductionRequest::new(ReduceOp::Median, &odd), &odd, None);
        assert_eq!(out, vec![vec![3.0]]);
        let even = Tensor::new(vec![1.0, 2.0, 3.0, 4.0], [4]);
        let out = run(&ReductionRequest::new(ReduceOp::Median, &even), &even, None);
        assert_eq!(out, vec![vec![2.0]]);
    }

    #[test]
    fn test_median_flattens_matrix() {
        let x = Tensor::from_storage(CpuStorage::I32(vec![9, 1, 8, 2, 7, 3]), [2, 3]).unwrap();
        assert_eq!(run(&ReductionRequest::new(ReduceOp::Median, &x), &x, None), vec![vec![3.0]]);
    }

    #[test]
    fn test_median_dim_values_and_indices() {
        let x = Tensor::new(vec![3.0, 1.0, 2.0, 10.0, 40.0, 20.0, 30.0, 0.0], [2, 4]);
        let out = run(&ReductionRequest::new(ReduceOp::MedianDim, &x).with_dims(&[1]), &x, None);
        // Row 0 sorts to [1, 2, 3, 10]; row 1 to [0, 20, 30, 40].
        assert_eq!(out, vec![vec![2.0, 20.0], vec![2.0, 1.0]]);
    }

    #[test]
    fn test_median_dim_ties_keep_first_index() {
        let x = Tensor::new(vec![2.0, 2.0, 2.0], [3, 1]);
        let out = run(
            &ReductionRequest::new(ReduceOp::MedianDim, &x)
                .with_dims(&[0])
                .with_keepdim(true),
            &x,
            None,
        );
        assert_eq!(out, vec![vec![2.0], vec![1.0]]);
    }
}
