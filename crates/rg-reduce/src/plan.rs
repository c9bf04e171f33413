//! Request validation and shape planning.
//!
//! `ReductionPlan::new` runs every argument check, resolves axes and projects
//! shapes. Nothing here touches the graph cache, so a rejected request can
//! never leave partial cache state behind.

use rg_tensor::{DType, Shape};

use crate::axis::{resolve_axes, AxisSet, ResolvedAxes};
use crate::error::{ReduceError, Result};
use crate::projection::{project, ShapeProjection};
use crate::request::{ReduceOp, ReductionRequest, TensorDesc};
use crate::signature::{OperandKey, ScalarKey, Signature};

/// A graph input: name, dtype and the apparent shape it is bound with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperandPlan {
    pub name: &'static str,
    pub dtype: DType,
    pub apparent_shape: Shape,
}

/// A graph output and the caller-facing shape of its destination buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPlan {
    pub name: &'static str,
    pub dtype: DType,
    pub apparent_shape: Shape,
    pub logical_shape: Shape,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReductionPlan {
    pub op: ReduceOp,
    pub input: TensorDesc,
    pub other: Option<TensorDesc>,
    pub axes: AxisSet,
    pub projection: ShapeProjection,
    pub keepdim: bool,
    /// Dtype the reduction runs in.
    pub working: DType,
    /// `p` or `correction`, with the operator default filled in.
    pub scalar: Option<f64>,
    pub operands: Vec<OperandPlan>,
    pub outputs: Vec<OutputPlan>,
}

impl ReductionPlan {
    pub fn new(request: &ReductionRequest) -> Result<Self> {
        validate(request)?;
        let op = request.op;
        let input = &request.input;

        let (resolved, keepdim) = match op {
            ReduceOp::Cdist => return plan_cdist(request),
            ReduceOp::Trace => (resolve_axes(&input.shape, Some(&[0, 1]))?, false),
            ReduceOp::Max | ReduceOp::Min | ReduceOp::Median => {
                (resolve_axes(&input.shape, None)?, false)
            }
            ReduceOp::Argmax | ReduceOp::Argmin => {
                (resolve_index_axis(request, false)?, request.keepdim)
            }
            ReduceOp::MaxDim | ReduceOp::MinDim | ReduceOp::MedianDim => {
                (resolve_index_axis(request, true)?, request.keepdim)
            }
            _ => (resolve_axes(&input.shape, request.dim_list())?, request.keepdim),
        };
        let projection = project(&input.shape, &resolved, keepdim);

        let working = working_dtype(op, input.dtype, request.dtype);
        let outputs = op
            .output_names()
            .iter()
            .zip(output_dtypes(op, input.dtype, request.dtype))
            .map(|(&name, dtype)| OutputPlan {
                name,
                dtype,
                apparent_shape: projection.apparent_output_shape.clone(),
                logical_shape: projection.logical_output_shape.clone(),
            })
            .collect();

        Ok(ReductionPlan {
            op,
            input: input.clone(),
            other: None,
            axes: resolved.axes,
            operands: vec![OperandPlan {
                name: "input",
                dtype: input.dtype,
                apparent_shape: projection.apparent_input_shape.clone(),
            }],
            projection,
            keepdim,
            working,
            scalar: request.scalar.or(op.scalar_default()),
            outputs,
        })
    }

    /// Axes to reduce over in the apparent input shape.
    pub fn graph_axes(&self) -> Vec<usize> {
        self.axes.graph_axes()
    }

    /// The scalar parameter, or an internal error if the operator has none.
    pub fn scalar(&self) -> Result<f64> {
        self.scalar
            .ok_or_else(|| ReduceError::internal(format!("{} has no scalar parameter", self.op)))
    }

    /// True when an operand or an output holds no elements.
    pub fn is_zero_size(&self) -> bool {
        self.input.shape.is_empty()
            || self.other.as_ref().is_some_and(|o| o.shape.is_empty())
            || self.outputs.iter().any(|o| o.logical_shape.is_empty())
    }

    pub fn signature(&self) -> Signature {
        let mut inputs = vec![OperandKey {
            dtype: self.input.dtype,
            shape: self.input.shape.clone(),
        }];
        if let Some(other) = &self.other {
            inputs.push(OperandKey {
                dtype: other.dtype,
                shape: other.shape.clone(),
            });
        }
        Signature {
            op: self.op,
            inputs,
            axes: self.axes.clone(),
            keepdim: self.keepdim,
            working: self.working,
            outputs: self.outputs.iter().map(|o| o.dtype).collect(),
            scalar: self.scalar.map(ScalarKey::new),
        }
    }
}

fn validate(request: &ReductionRequest) -> Result<()> {
    let op = request.op;
    let input = &request.input;

    match (&request.other, op) {
        (None, ReduceOp::Cdist) => {
            return Err(ReduceError::invalid("cdist requires a second operand"));
        }
        (Some(other), ReduceOp::Cdist) => {
            if other.device != input.device {
                return Err(ReduceError::invalid(format!(
                    "operands are on different devices ({} and {})",
                    input.device, other.device
                )));
            }
        }
        (Some(_), _) => {
            return Err(ReduceError::invalid(format!(
                "{} does not take a second operand",
                op
            )));
        }
        (None, _) => {}
    }

    if let Some(dtype) = request.dtype {
        if !op.accepts_dtype() {
            return Err(ReduceError::invalid(format!(
                "{} does not accept a result dtype",
                op
            )));
        }
        if op.needs_float() && !dtype.is_float() {
            return Err(ReduceError::invalid(format!(
                "{} needs a floating result dtype, got {}",
                op, dtype
            )));
        }
    }

    if op.is_extremum() && input.dtype == DType::I64 {
        return Err(ReduceError::invalid(format!(
            "{} does not support 64-bit integer inputs",
            op
        )));
    }

    match (op.scalar_default(), request.scalar) {
        (None, Some(_)) => {
            return Err(ReduceError::invalid(format!(
                "{} does not take a scalar parameter",
                op
            )));
        }
        (Some(_), Some(s)) if s.is_nan() => {
            return Err(ReduceError::invalid(format!("{}: scalar parameter is NaN", op)));
        }
        (Some(_), Some(p)) if op == ReduceOp::Norm && p < 0.0 && p != f64::NEG_INFINITY => {
            return Err(ReduceError::invalid(format!(
                "norm: p must be non-negative or -inf, got {}",
                p
            )));
        }
        (Some(_), Some(p)) if op == ReduceOp::Cdist && p < 0.0 => {
            return Err(ReduceError::invalid(format!(
                "cdist: p must be non-negative, got {}",
                p
            )));
        }
        _ => {}
    }

    let takes_dims = !matches!(
        op,
        ReduceOp::Trace | ReduceOp::Max | ReduceOp::Min | ReduceOp::Median | ReduceOp::Cdist
    );
    if !takes_dims && request.dim_list().is_some() {
        return Err(ReduceError::invalid(format!("{} does not take dims", op)));
    }

    if op == ReduceOp::Trace && input.shape.ndim() != 2 {
        return Err(ReduceError::invalid(format!(
            "trace expects a 2-D input, got shape {}",
            input.shape
        )));
    }
    Ok(())
}

/// Axis resolution for the index-producing operators: at most one dim, or
/// exactly one when `required`, and never a selection from zero candidates.
fn resolve_index_axis(request: &ReductionRequest, required: bool) -> Result<ResolvedAxes> {
    let op = request.op;
    let shape = &request.input.shape;
    match request.dim_list() {
        None if required => Err(ReduceError::invalid(format!("{} requires a dim", op))),
        None => {
            if shape.is_empty() {
                return Err(ReduceError::IndexError(format!(
                    "{} of an empty tensor needs an explicit dim",
                    op
                )));
            }
            resolve_axes(shape, None)
        }
        Some([dim]) => {
            let resolved = resolve_axes(shape, Some(&[*dim]))?;
            let axis = resolved.axes.graph_axes()[0];
            if resolved.apparent_input_shape.dim(axis) == 0 {
                return Err(ReduceError::IndexError(format!(
                    "{}: dim {} has size zero",
                    op, dim
                )));
            }
            Ok(resolved)
        }
        Some(dims) => Err(ReduceError::invalid(format!(
            "{} takes a single dim, got {:?}",
            op, dims
        ))),
    }
}

/// Pairwise distance: `[*batch, r1, c]` x `[*batch, r2, c]` -> `[*batch, r1, r2]`.
fn plan_cdist(request: &ReductionRequest) -> Result<ReductionPlan> {
    let x1 = &request.input;
    let x2 = request
        .other
        .as_ref()
        .ok_or_else(|| ReduceError::internal("cdist planned without a second operand"))?;
    let (s1, s2) = (x1.shape.dims(), x2.shape.dims());

    if s1.len() < 2 || s2.len() < 2 {
        return Err(ReduceError::invalid(format!(
            "cdist expects operands of rank >= 2, got {} and {}",
            x1.shape, x2.shape
        )));
    }
    if s1.len() != s2.len() || s1[..s1.len() - 2] != s2[..s2.len() - 2] {
        return Err(ReduceError::invalid(format!(
            "cdist batch dimensions differ: {} vs {}",
            x1.shape, x2.shape
        )));
    }
    let rank = s1.len();
    let (r1, r2, cols) = (s1[rank - 2], s2[rank - 2], s1[rank - 1]);
    if s2[rank - 1] != cols {
        return Err(ReduceError::invalid(format!(
            "cdist operands must share the trailing dimension, got {} and {}",
            cols,
            s2[rank - 1]
        )));
    }

    let batch_dims = &s1[..rank - 2];
    let batch: usize = batch_dims.iter().product();
    let mut logical = batch_dims.to_vec();
    logical.extend([r1, r2]);

    let working = working_dtype(ReduceOp::Cdist, x1.dtype, None);
    let out_dtype = output_dtypes(ReduceOp::Cdist, x1.dtype, None)[0];
    let apparent_out = Shape::new(vec![batch, r1, r2]);
    let projection = ShapeProjection {
        apparent_input_shape: Shape::new(vec![batch, r1, cols]),
        apparent_output_shape: apparent_out.clone(),
        logical_output_shape: Shape::new(logical.clone()),
        correction_n: cols,
    };

    Ok(ReductionPlan {
        op: ReduceOp::Cdist,
        input: x1.clone(),
        other: Some(x2.clone()),
        axes: AxisSet::Dims(vec![rank - 1]),
        operands: vec![
            OperandPlan {
                name: "input",
                dtype: x1.dtype,
                apparent_shape: projection.apparent_input_shape.clone(),
            },
            OperandPlan {
                name: "other",
                dtype: x2.dtype,
                apparent_shape: Shape::new(vec![batch, r2, cols]),
            },
        ],
        projection,
        keepdim: false,
        working,
        scalar: request.scalar.or(ReduceOp::Cdist.scalar_default()),
        outputs: vec![OutputPlan {
            name: "output",
            dtype: out_dtype,
            apparent_shape: apparent_out,
            logical_shape: Shape::new(logical),
        }],
    })
}

/// The dtype the reduction primitive runs in.
///
/// A requested float or I32 result dtype is used directly; otherwise I32 and
/// F32 inputs reduce natively and everything else upcasts to F32. Operators
/// with a fixed input contract (logical, index, median) override this.
pub fn working_dtype(op: ReduceOp, input: DType, requested: Option<DType>) -> DType {
    match op {
        ReduceOp::Any | ReduceOp::All => match input {
            DType::I32 | DType::F32 | DType::F16 => input,
            _ => DType::I32,
        },
        ReduceOp::Argmax | ReduceOp::Argmin => {
            if input.is_float() || input == DType::I32 {
                input
            } else {
                DType::F32
            }
        }
        ReduceOp::Median | ReduceOp::MedianDim => input,
        _ => {
            let working = match requested {
                Some(d) if d.is_float() || d == DType::I32 => d,
                _ if matches!(input, DType::I32 | DType::F32) => input,
                _ => DType::F32,
            };
            if op.needs_float() && !working.is_float() {
                DType::F32
            } else {
                working
            }
        }
    }
}

/// Result dtypes, one per entry of [`ReduceOp::output_names`].
pub fn output_dtypes(op: ReduceOp, input: DType, requested: Option<DType>) -> Vec<DType> {
    let float_or_f32 = if input.is_float() { input } else { DType::F32 };
    match op {
        ReduceOp::Sum | ReduceOp::NanSum | ReduceOp::Prod | ReduceOp::Trace => {
            vec![requested.unwrap_or(if input.is_float() { input } else { DType::I64 })]
        }
        ReduceOp::Mean | ReduceOp::Norm => vec![requested.unwrap_or(float_or_f32)],
        ReduceOp::Cdist | ReduceOp::Var | ReduceOp::Std => vec![float_or_f32],
        ReduceOp::VarMean | ReduceOp::StdMean => vec![float_or_f32, float_or_f32],
        ReduceOp::Amax | ReduceOp::Amin | ReduceOp::Max | ReduceOp::Min | ReduceOp::Median => {
            vec![input]
        }
        ReduceOp::Aminmax => vec![input, input],
        ReduceOp::CountNonzero | ReduceOp::Argmax | ReduceOp::Argmin => vec![DType::I64],
        ReduceOp::Any | ReduceOp::All => vec![DType::Bool],
        ReduceOp::MaxDim | ReduceOp::MinDim | ReduceOp::MedianDim => vec![input, DType::I64],
    }
}
