//! Axis resolution: turns an optional, possibly negative dim list into a
//! canonical axis set plus the rank-preserving shapes the graph is built on.

use std::fmt;

use rg_tensor::Shape;

use crate::error::{ReduceError, Result};

/// Canonical set of reduced axes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AxisSet {
    /// Reduce every element; the input is viewed as one flat axis.
    All,
    /// Ascending, duplicate-free axes of the original input.
    Dims(Vec<usize>),
}

impl AxisSet {
    /// Axes to hand to a graph reduction over the apparent input shape.
    pub fn graph_axes(&self) -> Vec<usize> {
        match self {
            AxisSet::All => vec![0],
            AxisSet::Dims(dims) => dims.clone(),
        }
    }

    pub fn is_all(&self) -> bool {
        matches!(self, AxisSet::All)
    }
}

impl fmt::Display for AxisSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AxisSet::All => write!(f, "all"),
            AxisSet::Dims(dims) => write!(f, "{:?}", dims),
        }
    }
}

/// Output of axis resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAxes {
    pub axes: AxisSet,
    /// Graph-facing input shape: the flattened `[numel]` for reduce-all,
    /// otherwise the input shape (rank-0 inputs become `[1]`).
    pub apparent_input_shape: Shape,
    /// `apparent_input_shape` with every reduced axis set to 1.
    pub apparent_output_shape: Shape,
}

/// Resolve `dims` against `input`.
///
/// `None` or an empty list selects reduce-all. Each dim is wrapped into
/// `[0, rank)`; anything still out of range is an InvalidArgument.
pub fn resolve_axes(input: &Shape, dims: Option<&[i64]>) -> Result<ResolvedAxes> {
    let dims = match dims {
        Some(dims) if !dims.is_empty() => dims,
        _ => return Ok(reduce_all(input)),
    };

    let mut axes = Vec::with_capacity(dims.len());
    for &dim in dims {
        let axis = input.wrap_axis(dim).map_err(|_| {
            ReduceError::invalid(format!(
                "dimension {} out of range for input of rank {}",
                dim,
                input.ndim()
            ))
        })?;
        axes.push(axis);
    }
    axes.sort_unstable();
    axes.dedup();

    // A scalar has one implicit axis of size 1.
    let apparent_input_shape = if input.ndim() == 0 {
        Shape::from([1])
    } else {
        input.clone()
    };
    let apparent_output_shape = reduced_shape(&apparent_input_shape, &axes);

    Ok(ResolvedAxes {
        axes: AxisSet::Dims(axes),
        apparent_input_shape,
        apparent_output_shape,
    })
}

/// Resolve a single required axis (argmax, max_dim, median_dim).
pub fn resolve_single_axis(input: &Shape, dim: i64) -> Result<ResolvedAxes> {
    resolve_axes(input, Some(&[dim]))
}

fn reduce_all(input: &Shape) -> ResolvedAxes {
    ResolvedAxes {
        axes: AxisSet::All,
        apparent_input_shape: Shape::new(vec![input.numel()]),
        apparent_output_shape: Shape::from([1]),
    }
}

/// `shape` with each axis in `axes` replaced by 1.
pub(crate) fn reduced_shape(shape: &Shape, axes: &[usize]) -> Shape {
    let dims = shape
        .dims()
        .iter()
        .enumerate()
        .map(|(i, &d)| if axes.contains(&i) { 1 } else { d })
        .collect();
    Shape::new(dims)
}
