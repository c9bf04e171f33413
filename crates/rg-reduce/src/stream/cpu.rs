use std::cmp::Ordering;

use rg_tensor::{DType, Shape};

use crate::error::{ReduceError, Result};
use crate::graph::{ArgKind, BinaryOp, Graph, Node, Op, ReduceKind, UnaryOp};
use crate::stream::{Capabilities, ComputeStream, InputBinding, OutputBinding};

/// Host interpreter for reduction graphs.
///
/// Every node is evaluated in f64 and then rounded into the node's dtype,
/// so a graph working in F32 or F16 sees that type's precision at each step.
/// Intended as a reference implementation and fallback.
#[derive(Debug, Clone, Default)]
pub struct CpuStream {
    capabilities: Capabilities,
}

impl CpuStream {
    pub fn new() -> Self {
        Self::default()
    }

    /// A stream that reports no native sort support, as on platforms whose
    /// graph runtime lacks a sort primitive.
    pub fn without_sort() -> Self {
        CpuStream {
            capabilities: Capabilities { sort: false },
        }
    }
}

impl ComputeStream for CpuStream {
    fn name(&self) -> &str {
        "cpu"
    }

    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    fn submit(
        &self,
        graph: &Graph,
        inputs: &[InputBinding<'_>],
        outputs: &mut [OutputBinding<'_>],
    ) -> Result<()> {
        if graph.uses_sort() && !self.capabilities.sort {
            return Err(ReduceError::UnsupportedPlatform(
                "sort is not available on this stream".to_string(),
            ));
        }

        let mut values: Vec<Vec<f64>> = Vec::with_capacity(graph.nodes().len());
        for node in graph.nodes() {
            let mut v = eval(node, graph, &values, inputs)?;
            if !matches!(node.op, Op::Placeholder { .. }) {
                round_into(&mut v, node.dtype);
            }
            values.push(v);
        }

        for out in outputs.iter_mut() {
            let handle = graph.output(out.name).ok_or_else(|| {
                ReduceError::internal(format!("graph has no output named '{}'", out.name))
            })?;
            check_binding(out.name, handle.dtype, &handle.shape, out.storage.dtype(), out.shape)?;
            if out.storage.len() != handle.shape.numel() {
                return Err(ReduceError::internal(format!(
                    "output '{}' buffer holds {} elements, graph produces {}",
                    out.name,
                    out.storage.len(),
                    handle.shape.numel()
                )));
            }
            out.storage.fill_from_f64(&values[handle.node.index()])?;
        }
        Ok(())
    }
}

fn check_binding(
    name: &str,
    want: DType,
    want_shape: &Shape,
    got: DType,
    got_shape: &Shape,
) -> Result<()> {
    if want != got {
        return Err(ReduceError::internal(format!(
            "binding '{}' has dtype {}, graph expects {}",
            name, got, want
        )));
    }
    if want_shape != got_shape {
        return Err(ReduceError::internal(format!(
            "binding '{}' has shape {}, graph expects {}",
            name, got_shape, want_shape
        )));
    }
    Ok(())
}

fn round_into(values: &mut [f64], dtype: DType) {
    if dtype == DType::I64 {
        // Indices and counts; f64 already holds them exactly.
        return;
    }
    for v in values.iter_mut() {
        *v = dtype.round_value(*v);
    }
}

fn eval(
    node: &Node,
    graph: &Graph,
    values: &[Vec<f64>],
    inputs: &[InputBinding<'_>],
) -> Result<Vec<f64>> {
    let operand = |i: usize| operand_of(node, graph, values, i);

    let out = match &node.op {
        Op::Placeholder { name } => {
            let binding = inputs
                .iter()
                .find(|b| b.name == name.as_str())
                .ok_or_else(|| ReduceError::internal(format!("input '{}' is not bound", name)))?;
            check_binding(name, node.dtype, &node.shape, binding.storage.dtype(), binding.shape)?;
            if binding.storage.len() != node.shape.numel() {
                return Err(ReduceError::internal(format!(
                    "input '{}' buffer holds {} elements, shape {} needs {}",
                    name,
                    binding.storage.len(),
                    node.shape,
                    node.shape.numel()
                )));
            }
            binding.storage.to_f64_vec()
        }
        Op::Constant(c) => vec![*c],
        Op::Cast | Op::Reshape => operand(0).0.to_vec(),
        Op::Unary(op) => {
            let (x, _) = operand(0);
            x.iter().map(|&v| unary(*op, v)).collect()
        }
        Op::Binary(op) => {
            let (a, sa) = operand(0);
            let (b, sb) = operand(1);
            let ia = broadcast_map(sa, &node.shape);
            let ib = broadcast_map(sb, &node.shape);
            ia.iter()
                .zip(&ib)
                .map(|(&i, &j)| binary(*op, a[i], b[j]))
                .collect()
        }
        Op::Reduce { kind, axes } => {
            let (x, shape) = operand(0);
            reduce(*kind, x, shape, axes, &node.shape)
        }
        Op::ArgReduce { kind, axis } => {
            let (x, shape) = operand(0);
            arg_reduce(*kind, x, shape, *axis)?
        }
        Op::DiagonalBand => {
            let (x, shape) = operand(0);
            let cols = shape.dim(1);
            x.iter()
                .enumerate()
                .map(|(i, &v)| if i / cols == i % cols { v } else { 0.0 })
                .collect()
        }
        Op::Sort { axis } => {
            let (x, shape) = operand(0);
            sort_along(x, shape, *axis).0
        }
        Op::ArgSort { axis } => {
            let (x, shape) = operand(0);
            sort_along(x, shape, *axis).1
        }
        Op::Slice { axis, start, len } => {
            let (x, shape) = operand(0);
            let (outer, n, inner) = split_at_axis(shape, *axis);
            let mut out = Vec::with_capacity(outer * len * inner);
            for o in 0..outer {
                for k in *start..start + len {
                    let base = (o * n + k) * inner;
                    out.extend_from_slice(&x[base..base + inner]);
                }
            }
            out
        }
        Op::BroadcastTo => {
            let (x, shape) = operand(0);
            broadcast_map(shape, &node.shape)
                .into_iter()
                .map(|i| x[i])
                .collect()
        }
        Op::Clamp { min, max } => {
            let (x, _) = operand(0);
            x.iter()
                .map(|&v| if v < *min { *min } else if v > *max { *max } else { v })
                .collect()
        }
    };
    Ok(out)
}

fn operand_of<'a>(
    node: &Node,
    graph: &'a Graph,
    values: &'a [Vec<f64>],
    i: usize,
) -> (&'a [f64], &'a Shape) {
    let id = node.operands[i];
    (values[id.index()].as_slice(), &graph.node(id).shape)
}

fn unary(op: UnaryOp, v: f64) -> f64 {
    match op {
        UnaryOp::Abs => v.abs(),
        UnaryOp::Sqrt => v.sqrt(),
        UnaryOp::NotZero => {
            if v != 0.0 {
                1.0
            } else {
                0.0
            }
        }
        UnaryOp::NanToZero => {
            if v.is_nan() {
                0.0
            } else {
                v
            }
        }
    }
}

fn binary(op: BinaryOp, a: f64, b: f64) -> f64 {
    match op {
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Pow => a.powf(b),
    }
}

/// `(outer, size, inner)` element counts around `axis` of a row-major shape.
fn split_at_axis(shape: &Shape, axis: usize) -> (usize, usize, usize) {
    let dims = shape.dims();
    let outer = dims[..axis].iter().product();
    let inner = dims[axis + 1..].iter().product();
    (outer, dims[axis], inner)
}

/// For every element of `to`, the linear index of the `from` element that
/// broadcasts onto it.
fn broadcast_map(from: &Shape, to: &Shape) -> Vec<usize> {
    let offset = to.ndim() - from.ndim();
    let from_strides = from.strides();
    let strides: Vec<usize> = (0..to.ndim())
        .map(|k| {
            if k < offset || from.dim(k - offset) == 1 {
                0
            } else {
                from_strides[k - offset]
            }
        })
        .collect();
    gather_map(to, &strides)
}

/// Linear index into a source for every element of `shape`, given per-axis
/// source strides.
fn gather_map(shape: &Shape, strides: &[usize]) -> Vec<usize> {
    let dims = shape.dims();
    let mut coords = vec![0usize; dims.len()];
    let mut map = Vec::with_capacity(shape.numel());
    for _ in 0..shape.numel() {
        map.push(coords.iter().zip(strides).map(|(c, s)| c * s).sum());
        for k in (0..dims.len()).rev() {
            coords[k] += 1;
            if coords[k] < dims[k] {
                break;
            }
            coords[k] = 0;
        }
    }
    map
}

fn reduce(
    kind: ReduceKind,
    x: &[f64],
    shape: &Shape,
    axes: &[usize],
    out_shape: &Shape,
) -> Vec<f64> {
    // Map each input element to the output slot it folds into.
    let out_strides = out_shape.strides();
    let strides: Vec<usize> = (0..shape.ndim())
        .map(|k| if axes.contains(&k) { 0 } else { out_strides[k] })
        .collect();
    let slots = gather_map(shape, &strides);
    let n_out = out_shape.numel();
    let count = if n_out == 0 { 0 } else { x.len() / n_out };

    let init = match kind {
        ReduceKind::Prod | ReduceKind::And => 1.0,
        ReduceKind::Max => f64::NEG_INFINITY,
        ReduceKind::Min => f64::INFINITY,
        _ => 0.0,
    };
    let mut acc = vec![init; n_out];

    match kind {
        ReduceKind::Sum | ReduceKind::Mean | ReduceKind::Variance => {
            for (&v, &o) in x.iter().zip(&slots) {
                acc[o] += v;
            }
        }
        ReduceKind::Prod => {
            for (&v, &o) in x.iter().zip(&slots) {
                acc[o] *= v;
            }
        }
        ReduceKind::Max | ReduceKind::Min => {
            for (&v, &o) in x.iter().zip(&slots) {
                let a = acc[o];
                let better = match kind {
                    ReduceKind::Max => v > a,
                    _ => v < a,
                };
                if !a.is_nan() && (v.is_nan() || better) {
                    acc[o] = v;
                }
            }
        }
        ReduceKind::Or => {
            for (&v, &o) in x.iter().zip(&slots) {
                if v != 0.0 {
                    acc[o] = 1.0;
                }
            }
        }
        ReduceKind::And => {
            for (&v, &o) in x.iter().zip(&slots) {
                if v == 0.0 {
                    acc[o] = 0.0;
                }
            }
        }
    }

    if matches!(kind, ReduceKind::Mean | ReduceKind::Variance) {
        for a in acc.iter_mut() {
            *a /= count as f64;
        }
    }
    if kind == ReduceKind::Variance {
        let means = acc;
        let mut sq = vec![0.0; n_out];
        for (&v, &o) in x.iter().zip(&slots) {
            let d = v - means[o];
            sq[o] += d * d;
        }
        for s in sq.iter_mut() {
            *s /= count as f64;
        }
        return sq;
    }
    acc
}

fn arg_reduce(kind: ArgKind, x: &[f64], shape: &Shape, axis: usize) -> Result<Vec<f64>> {
    let (outer, n, inner) = split_at_axis(shape, axis);
    if n == 0 {
        return Err(ReduceError::internal("arg_reduce over an empty axis"));
    }
    let mut out = Vec::with_capacity(outer * inner);
    for o in 0..outer {
        for i in 0..inner {
            let at = |k: usize| x[(o * n + k) * inner + i];
            let mut best = 0;
            let mut best_val = at(0);
            for k in 1..n {
                if best_val.is_nan() {
                    break;
                }
                let v = at(k);
                let better = match kind {
                    ArgKind::Max => v > best_val,
                    ArgKind::Min => v < best_val,
                };
                if v.is_nan() || better {
                    best = k;
                    best_val = v;
                }
            }
            out.push(best as f64);
        }
    }
    Ok(out)
}

/// Ascending order with NaN after every number.
pub(crate) fn ascending(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
    }
}

/// Stable sort of every lane along `axis`; returns (values, source indices).
pub(crate) fn sort_along(x: &[f64], shape: &Shape, axis: usize) -> (Vec<f64>, Vec<f64>) {
    let (outer, n, inner) = split_at_axis(shape, axis);
    let mut values = vec![0.0; x.len()];
    let mut indices = vec![0.0; x.len()];
    let mut order: Vec<usize> = Vec::with_capacity(n);
    for o in 0..outer {
        for i in 0..inner {
            let at = |k: usize| (o * n + k) * inner + i;
            order.clear();
            order.extend(0..n);
            order.sort_by(|&a, &b| ascending(x[at(a)], x[at(b)]));
            for (k, &src) in order.iter().enumerate() {
                values[at(k)] = x[at(src)];
                indices[at(k)] = src as f64;
            }
        }
    }
    (values, indices)
}
