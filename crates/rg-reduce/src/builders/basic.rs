use crate::builders::{emit, working_input};
use crate::error::{ReduceError, Result};
use crate::graph::{Graph, GraphBuilder, ReduceKind, UnaryOp};
use crate::plan::ReductionPlan;
use crate::request::ReduceOp;

/// sum, mean, prod, amax, amin and the whole-tensor max/min: one reduction
/// primitive in the working dtype.
pub(super) fn build_reduce(plan: &ReductionPlan) -> Result<Graph> {
    let kind = match plan.op {
        ReduceOp::Sum => ReduceKind::Sum,
        ReduceOp::Mean => ReduceKind::Mean,
        ReduceOp::Prod => ReduceKind::Prod,
        ReduceOp::Amax | ReduceOp::Max => ReduceKind::Max,
        ReduceOp::Amin | ReduceOp::Min => ReduceKind::Min,
        other => {
            return Err(ReduceError::internal(format!(
                "build_reduce cannot build {}",
                other
            )))
        }
    };
    let mut g = GraphBuilder::new();
    let x = working_input(&mut g, plan)?;
    let r = g.reduce(kind, x, &plan.graph_axes())?;
    emit(&mut g, plan, 0, r)?;
    g.finish()
}

pub(super) fn build_nansum(plan: &ReductionPlan) -> Result<Graph> {
    let mut g = GraphBuilder::new();
    let x = working_input(&mut g, plan)?;
    let cleaned = g.unary(UnaryOp::NanToZero, x);
    let r = g.reduce(ReduceKind::Sum, cleaned, &plan.graph_axes())?;
    emit(&mut g, plan, 0, r)?;
    g.finish()
}

pub(super) fn build_aminmax(plan: &ReductionPlan) -> Result<Graph> {
    let mut g = GraphBuilder::new();
    let x = working_input(&mut g, plan)?;
    let axes = plan.graph_axes();
    let min = g.reduce(ReduceKind::Min, x, &axes)?;
    let max = g.reduce(ReduceKind::Max, x, &axes)?;
    emit(&mut g, plan, 0, min)?;
    emit(&mut g, plan, 1, max)?;
    g.finish()
}

/// `sum(x != 0)`, counted in I32 and widened on output.
pub(super) fn build_count_nonzero(plan: &ReductionPlan) -> Result<Graph> {
    let mut g = GraphBuilder::new();
    let x = working_input(&mut g, plan)?;
    let nonzero = g.unary(UnaryOp::NotZero, x);
    let ones = g.cast(nonzero, rg_tensor::DType::I32);
    let r = g.reduce(ReduceKind::Sum, ones, &plan.graph_axes())?;
    emit(&mut g, plan, 0, r)?;
    g.finish()
}

/// Sum of the zero-bandwidth diagonal band of a matrix.
pub(super) fn build_trace(plan: &ReductionPlan) -> Result<Graph> {
    let mut g = GraphBuilder::new();
    let x = working_input(&mut g, plan)?;
    let diagonal = g.diagonal_band(x)?;
    let r = g.reduce(ReduceKind::Sum, diagonal, &[0, 1])?;
    emit(&mut g, plan, 0, r)?;
    g.finish()
}

/// any/all: logical OR/AND reduction, then Bool.
pub(super) fn build_logical(plan: &ReductionPlan) -> Result<Graph> {
    let kind = match plan.op {
        ReduceOp::Any => ReduceKind::Or,
        ReduceOp::All => ReduceKind::And,
        other => {
            return Err(ReduceError::internal(format!(
                "build_logical cannot build {}",
                other
            )))
        }
    };
    let mut g = GraphBuilder::new();
    let x = working_input(&mut g, plan)?;
    let r = g.reduce(kind, x, &plan.graph_axes())?;
    emit(&mut g, plan, 0, r)?;
    g.finish()
}

#[cfg(test)]
mod tests {
    use crate::builders::test_support::run;
    use crate::request::{ReduceOp, ReductionRequest};
    use approx::assert_relative_eq;
    use rg_tensor::{CpuStorage, DType, Tensor};

    fn matrix() -> Tensor {
        Tensor::new(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], [2, 3])
    }

    #[test]
    fn test_sum_all_and_axis() {
        let x = matrix();
        let all = run(&ReductionRequest::new(ReduceOp::Sum, &x), &x, None);
        assert_eq!(all, vec![vec![21.0]]);
        let rows = run(&ReductionRequest::new(ReduceOp::Sum, &x).with_dims(&[1]), &x, None);
        assert_eq!(rows, vec![vec![6.0, 15.0]]);
        let cols = run(&ReductionRequest::new(ReduceOp::Sum, &x).with_dims(&[0]), &x, None);
        assert_eq!(cols, vec![vec![5.0, 7.0, 9.0]]);
    }

    #[test]
    fn test_sum_integer_widens() {
        let x = Tensor::from_storage(CpuStorage::I16(vec![30000, 30000, 30000]), [3]).unwrap();
        let out = run(&ReductionRequest::new(ReduceOp::Sum, &x), &x, None);
        assert_eq!(out, vec![vec![90000.0]]);
    }

    #[test]
    fn test_sum_requested_dtype() {
        let x = Tensor::new(vec![1.5, 2.25], [2]);
        let out = run(
            &ReductionRequest::new(ReduceOp::Sum, &x).with_dtype(DType::I32),
            &x,
            None,
        );
        // Input is cast to I32 before reducing: 1 + 2.
        assert_eq!(out, vec![vec![3.0]]);
    }

    #[test]
    fn test_mean_prod_amax_amin() {
        let x = matrix();
        let mean = run(&ReductionRequest::new(ReduceOp::Mean, &x).with_dims(&[0]), &x, None);
        assert_eq!(mean, vec![vec![2.5, 3.5, 4.5]]);
        let prod = run(&ReductionRequest::new(ReduceOp::Prod, &x), &x, None);
        assert_eq!(prod, vec![vec![720.0]]);
        let amax = run(&ReductionRequest::new(ReduceOp::Amax, &x).with_dims(&[1]), &x, None);
        assert_eq!(amax, vec![vec![3.0, 6.0]]);
        let amin = run(&ReductionRequest::new(ReduceOp::Amin, &x).with_dims(&[0, 1]), &x, None);
        assert_eq!(amin, vec![vec![1.0]]);
    }

    #[test]
    fn test_mean_of_f16_is_computed_in_f32() {
        // The f16 sum would overflow to infinity; the f32 accumulator does not.
        let data = CpuStorage::from_f64_slice(DType::F16, &[60000.0, 60000.0]);
        let x = Tensor::from_storage(data, [2]).unwrap();
        let out = run(&ReductionRequest::new(ReduceOp::Mean, &x), &x, None);
        assert_eq!(out, vec![vec![60000.0]]);
    }

    #[test]
    fn test_nansum() {
        let x = Tensor::new(vec![1.0, f32::NAN, 2.0], [3]);
        let out = run(&ReductionRequest::new(ReduceOp::NanSum, &x), &x, None);
        assert_eq!(out, vec![vec![3.0]]);
    }

    #[test]
    fn test_aminmax() {
        let x = Tensor::from_storage(CpuStorage::I32(vec![4, -2, 9, 0]), [2, 2]).unwrap();
        let out = run(&ReductionRequest::new(ReduceOp::Aminmax, &x).with_dims(&[1]), &x, None);
        assert_eq!(out, vec![vec![-2.0, 0.0], vec![4.0, 9.0]]);
    }

    #[test]
    fn test_count_nonzero() {
        let x = Tensor::new(vec![0.0, 1.5, 0.0, -2.0, 3.0, 0.0], [2, 3]);
        let out = run(&ReductionRequest::new(ReduceOp::CountNonzero, &x).with_dims(&[1]), &x, None);
        assert_eq!(out, vec![vec![1.0, 2.0]]);
    }

    #[test]
    fn test_trace() {
        let x = Tensor::new(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0], [3, 3]);
        let out = run(&ReductionRequest::new(ReduceOp::Trace, &x), &x, None);
        assert_relative_eq!(out[0][0], 15.0);

        let wide = matrix();
        let out = run(&ReductionRequest::new(ReduceOp::Trace, &wide), &wide, None);
        assert_relative_eq!(out[0][0], 6.0);
    }

    #[test]
    fn test_any_all() {
        let x =
            Tensor::from_storage(CpuStorage::Bool(vec![true, false, true, true]), [2, 2]).unwrap();
        let any = run(&ReductionRequest::new(ReduceOp::Any, &x).with_dims(&[1]), &x, None);
        assert_eq!(any, vec![vec![1.0, 1.0]]);
        let all = run(&ReductionRequest::new(ReduceOp::All, &x).with_dims(&[1]), &x, None);
        assert_eq!(all, vec![vec![0.0, 1.0]]);
        let all_flat = run(&ReductionRequest::new(ReduceOp::All, &x), &x, None);
        assert_eq!(all_flat, vec![vec![0.0]]);
    }
}
