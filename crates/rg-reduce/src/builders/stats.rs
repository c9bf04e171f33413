use crate::builders::{emit, working_input};
use crate::error::Result;
use crate::graph::{BinaryOp, Graph, GraphBuilder, ReduceKind, UnaryOp};
use crate::plan::ReductionPlan;
use crate::request::ReduceOp;

/// var, std, var_mean and std_mean.
///
/// The primitive yields the biased variance; a nonzero correction rescales it
/// by `n / max(n - correction, 0)` where `n` is the number of reduced
/// elements.
pub(super) fn build_variance(plan: &ReductionPlan) -> Result<Graph> {
    let mut g = GraphBuilder::new();
    let x = working_input(&mut g, plan)?;
    let axes = plan.graph_axes();

    let mut var = g.reduce(ReduceKind::Variance, x, &axes)?;
    let correction = plan.scalar()?;
    if correction != 0.0 {
        let n = plan.projection.correction_n as f64;
        let scale = g.constant(n / (n - correction).max(0.0), plan.working);
        var = g.binary(BinaryOp::Mul, var, scale)?;
    }

    let spread = match plan.op {
        ReduceOp::Std | ReduceOp::StdMean => g.unary(UnaryOp::Sqrt, var),
        _ => var,
    };
    emit(&mut g, plan, 0, spread)?;

    if matches!(plan.op, ReduceOp::VarMean | ReduceOp::StdMean) {
        let mean = g.reduce(ReduceKind::Mean, x, &axes)?;
        emit(&mut g, plan, 1, mean)?;
    }
    g.finish()
}
