use rg_tensor::Shape;

use crate::builders::{emit, operand, working_input};
use crate::error::{ReduceError, Result};
use crate::graph::{BinaryOp, Graph, GraphBuilder, NodeId, ReduceKind, UnaryOp};
use crate::plan::ReductionPlan;

/// `||x||_p` over `axes`, in the dtype of `x`.
///
/// p = 0 counts nonzero elements (0^0 is taken as 0), p = +inf and p = -inf
/// select the largest and smallest magnitude, anything else is
/// `sum(|x|^p)^(1/p)`.
fn norm_over(g: &mut GraphBuilder, x: NodeId, p: f64, axes: &[usize]) -> Result<NodeId> {
    let dtype = g.dtype(x);
    if p == 0.0 {
        let nonzero = g.unary(UnaryOp::NotZero, x);
        let ones = g.cast(nonzero, dtype);
        return g.reduce(ReduceKind::Sum, ones, axes);
    }
    let abs = g.unary(UnaryOp::Abs, x);
    if p == f64::INFINITY {
        return g.reduce(ReduceKind::Max, abs, axes);
    }
    if p == f64::NEG_INFINITY {
        return g.reduce(ReduceKind::Min, abs, axes);
    }
    if p == 1.0 {
        return g.reduce(ReduceKind::Sum, abs, axes);
    }
    let exponent = g.constant(p, dtype);
    let powered = g.binary(BinaryOp::Pow, abs, exponent)?;
    let summed = g.reduce(ReduceKind::Sum, powered, axes)?;
    let root = g.constant(p.recip(), dtype);
    g.binary(BinaryOp::Pow, summed, root)
}

pub(super) fn build_norm(plan: &ReductionPlan) -> Result<Graph> {
    let mut g = GraphBuilder::new();
    let x = working_input(&mut g, plan)?;
    let r = norm_over(&mut g, x, plan.scalar()?, &plan.graph_axes())?;
    emit(&mut g, plan, 0, r)?;
    g.finish()
}

/// Pairwise p-norm distance between the rows of two `[b, r, c]` operands.
///
/// Both sides are tiled to `[b, r1, r2, c]`, subtracted and reduced over the
/// trailing axis.
pub(super) fn build_cdist(plan: &ReductionPlan) -> Result<Graph> {
    let mut g = GraphBuilder::new();
    let x1 = working_input(&mut g, plan)?;
    let x2 = operand(&mut g, plan, 1)?;
    let x2 = g.cast(x2, plan.working);

    let (b, r1, c) = match *g.shape(x1).dims() {
        [b, r1, c] => (b, r1, c),
        _ => {
            return Err(ReduceError::internal(format!(
                "cdist operand planned with shape {}",
                g.shape(x1)
            )))
        }
    };
    let r2 = g.shape(x2).dim(1);
    let tiled = Shape::new(vec![b, r1, r2, c]);

    let rows = g.reshape(x1, Shape::new(vec![b, r1, 1, c]))?;
    let rows = g.broadcast_to(rows, tiled.clone())?;
    let cols = g.reshape(x2, Shape::new(vec![b, 1, r2, c]))?;
    let cols = g.broadcast_to(cols, tiled)?;
    let diff = g.binary(BinaryOp::Sub, rows, cols)?;

    let dist = norm_over(&mut g, diff, plan.scalar()?, &[3])?;
    let dist = g.reshape(dist, Shape::new(vec![b, r1, r2]))?;
    emit(&mut g, plan, 0, dist)?;
    g.finish()
}

#[cfg(test)]
mod tests {
    use crate::builders::test_support::run;
    use crate::request::{ReduceOp, ReductionRequest};
    use approx::assert_relative_eq;
    use rg_tensor::{CpuStorage, DType, Tensor};

    fn norm(x: &Tensor, p: f64, dims: Option<&[i64]>) -> Vec<f64> {
        let mut request = ReductionRequest::new(ReduceOp::Norm, x).with_scalar(p);
        if let Some(dims) = dims {
            request = request.with_dims(dims);
        }
        run(&request, x, None).remove(0)
    }

    #[test]
    fn test_euclidean_norm() {
        let x = Tensor::new(vec![3.0, 4.0], [2]);
        assert_relative_eq!(norm(&x, 2.0, Some(&[0]))[0], 5.0, epsilon = 1e-6);
        // Default p is 2.
        let default = run(&ReductionRequest::new(ReduceOp::Norm, &x), &x, None);
        assert_relative_eq!(default[0][0], 5.0, epsilon = 1e-6);
    }

    #[test]
    fn test_norm_special_exponents() {
        let x = Tensor::new(vec![0.0, -3.0, 2.0, 0.0, 1.0, -5.0], [2, 3]);
        assert_eq!(norm(&x, 0.0, Some(&[1])), vec![2.0, 2.0]);
        assert_eq!(norm(&x, f64::INFINITY, Some(&[1])), vec![3.0, 5.0]);
        assert_eq!(norm(&x, f64::NEG_INFINITY, Some(&[1])), vec![0.0, 0.0]);
        assert_eq!(norm(&x, 1.0, None), vec![11.0]);
        assert_relative_eq!(norm(&x, 3.0, None)[0], 161.0f64.cbrt(), epsilon = 1e-5);
    }

    #[test]
    fn test_norm_of_integers_is_float() {
        let x = Tensor::from_storage(CpuStorage::I32(vec![6, 8]), [2]).unwrap();
        let out = run(&ReductionRequest::new(ReduceOp::Norm, &x), &x, None);
        assert_relative_eq!(out[0][0], 10.0, epsilon = 1e-6);
    }

    #[test]
    fn test_cdist_euclidean() {
        let x1 = Tensor::new(vec![0.0, 0.0, 0.0, 1.0, 1.0, 1.0], [2, 3]);
        let x2 = Tensor::new(
            vec![0.0, 0.0, 0.0, 3.0, 4.0, 0.0, 1.0, 1.0, 1.0, 1.0, 2.0, 3.0],
            [4, 3],
        );
        let request = ReductionRequest::new(ReduceOp::Cdist, &x1).with_other(&x2);
        let out = run(&request, &x1, Some(&x2)).remove(0);
        let expected = [
            0.0,
            5.0,
            3.0f64.sqrt(),
            14.0f64.sqrt(),
            3.0f64.sqrt(),
            (4.0f64 + 9.0 + 1.0).sqrt(),
            0.0,
            5.0f64.sqrt(),
        ];
        assert_eq!(out.len(), expected.len());
        for (got, want) in out.iter().zip(expected) {
            assert_relative_eq!(*got, want, epsilon = 1e-5);
        }
    }

    #[test]
    fn test_cdist_batched_manhattan() {
        let x1 = Tensor::new(vec![1.0, 2.0, 3.0, 4.0], [2, 1, 2]);
        let x2 = Tensor::new(vec![0.0, 0.0, 1.0, 1.0], [2, 1, 2]);
        let request = ReductionRequest::new(ReduceOp::Cdist, &x1)
            .with_other(&x2)
            .with_scalar(1.0);
        let out = run(&request, &x1, Some(&x2)).remove(0);
        assert_eq!(out, vec![3.0, 5.0]);
    }

    #[test]
    fn test_cdist_f16_outputs_f16() {
        let half = |v: &[f64]| CpuStorage::from_f64_slice(DType::F16, v);
        let x1 = Tensor::from_storage(half(&[0.0, 0.0]), [1, 2]).unwrap();
        let x2 = Tensor::from_storage(half(&[3.0, 4.0]), [1, 2]).unwrap();
        let request = ReductionRequest::new(ReduceOp::Cdist, &x1).with_other(&x2);
        let out = run(&request, &x1, Some(&x2));
        assert_eq!(out, vec![vec![5.0]]);
    }
}
