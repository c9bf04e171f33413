use std::fmt;

use rg_tensor::{DType, Device, Shape, Tensor};

/// Every reduction the engine knows how to build a graph for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ReduceOp {
    Sum,
    NanSum,
    Mean,
    Prod,
    Amax,
    Amin,
    /// Whole-tensor maximum.
    Max,
    /// Whole-tensor minimum.
    Min,
    Aminmax,
    CountNonzero,
    Trace,
    Any,
    All,
    Norm,
    /// Pairwise p-norm distance between the rows of two operands.
    Cdist,
    Var,
    Std,
    VarMean,
    StdMean,
    Argmax,
    Argmin,
    /// Maximum along one axis together with its index.
    MaxDim,
    /// Minimum along one axis together with its index.
    MinDim,
    /// Lower median of the flattened input.
    Median,
    /// Lower median along one axis together with its index.
    MedianDim,
}

impl ReduceOp {
    pub fn name(&self) -> &'static str {
        match self {
            ReduceOp::Sum => "sum",
            ReduceOp::NanSum => "nansum",
            ReduceOp::Mean => "mean",
            ReduceOp::Prod => "prod",
            ReduceOp::Amax => "amax",
            ReduceOp::Amin => "amin",
            ReduceOp::Max => "max",
            ReduceOp::Min => "min",
            ReduceOp::Aminmax => "aminmax",
            ReduceOp::CountNonzero => "count_nonzero",
            ReduceOp::Trace => "trace",
            ReduceOp::Any => "any",
            ReduceOp::All => "all",
            ReduceOp::Norm => "norm",
            ReduceOp::Cdist => "cdist",
            ReduceOp::Var => "var",
            ReduceOp::Std => "std",
            ReduceOp::VarMean => "var_mean",
            ReduceOp::StdMean => "std_mean",
            ReduceOp::Argmax => "argmax",
            ReduceOp::Argmin => "argmin",
            ReduceOp::MaxDim => "max_dim",
            ReduceOp::MinDim => "min_dim",
            ReduceOp::Median => "median",
            ReduceOp::MedianDim => "median_dim",
        }
    }

    /// Names of the graph outputs, in the order callers pass destinations.
    pub fn output_names(&self) -> &'static [&'static str] {
        match self {
            ReduceOp::Aminmax => &["min", "max"],
            ReduceOp::VarMean => &["var", "mean"],
            ReduceOp::StdMean => &["std", "mean"],
            ReduceOp::MaxDim | ReduceOp::MinDim | ReduceOp::MedianDim => &["values", "indices"],
            _ => &["output"],
        }
    }

    /// Min/max-family operators, which refuse 64-bit integer inputs.
    pub fn is_extremum(&self) -> bool {
        matches!(
            self,
            ReduceOp::Amax
                | ReduceOp::Amin
                | ReduceOp::Max
                | ReduceOp::Min
                | ReduceOp::Aminmax
                | ReduceOp::MaxDim
                | ReduceOp::MinDim
        )
    }

    /// Operators that accept an explicit result dtype.
    pub fn accepts_dtype(&self) -> bool {
        matches!(
            self,
            ReduceOp::Sum | ReduceOp::NanSum | ReduceOp::Mean | ReduceOp::Prod | ReduceOp::Norm
        )
    }

    /// Operators whose arithmetic only makes sense in a floating working type.
    pub fn needs_float(&self) -> bool {
        matches!(
            self,
            ReduceOp::Mean
                | ReduceOp::Norm
                | ReduceOp::Cdist
                | ReduceOp::Var
                | ReduceOp::Std
                | ReduceOp::VarMean
                | ReduceOp::StdMean
        )
    }

    /// The scalar parameter an operator reads, and its default.
    pub fn scalar_default(&self) -> Option<f64> {
        match self {
            ReduceOp::Norm | ReduceOp::Cdist => Some(2.0),
            ReduceOp::Var | ReduceOp::Std | ReduceOp::VarMean | ReduceOp::StdMean => Some(1.0),
            _ => None,
        }
    }
}

impl fmt::Display for ReduceOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Shape, dtype and location of an operand, without its data.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TensorDesc {
    pub dtype: DType,
    pub shape: Shape,
    pub device: Device,
}

impl TensorDesc {
    pub fn new(dtype: DType, shape: impl Into<Shape>) -> Self {
        TensorDesc {
            dtype,
            shape: shape.into(),
            device: Device::Cpu,
        }
    }
}

impl From<&Tensor> for TensorDesc {
    fn from(t: &Tensor) -> Self {
        TensorDesc {
            dtype: t.dtype(),
            shape: t.shape().clone(),
            device: t.device(),
        }
    }
}

/// One reduction call, created per request and consumed by planning.
#[derive(Debug, Clone, PartialEq)]
pub struct ReductionRequest {
    pub op: ReduceOp,
    pub input: TensorDesc,
    /// Axis list; `None` or empty reduces every axis.
    pub dims: Option<Vec<i64>>,
    pub keepdim: bool,
    /// Requested result dtype.
    pub dtype: Option<DType>,
    /// `p` for norm/cdist, `correction` for the variance family.
    pub scalar: Option<f64>,
    /// Second operand (cdist only).
    pub other: Option<TensorDesc>,
}

impl ReductionRequest {
    pub fn new(op: ReduceOp, input: impl Into<TensorDesc>) -> Self {
        ReductionRequest {
            op,
            input: input.into(),
            dims: None,
            keepdim: false,
            dtype: None,
            scalar: None,
            other: None,
        }
    }

    pub fn with_dims(mut self, dims: &[i64]) -> Self {
        self.dims = Some(dims.to_vec());
        self
    }

    pub fn with_keepdim(mut self, keepdim: bool) -> Self {
        self.keepdim = keepdim;
        self
    }

    pub fn with_dtype(mut self, dtype: DType) -> Self {
        self.dtype = Some(dtype);
        self
    }

    pub fn with_scalar(mut self, scalar: f64) -> Self {
        self.scalar = Some(scalar);
        self
    }

    pub fn with_other(mut self, other: impl Into<TensorDesc>) -> Self {
        self.other = Some(other.into());
        self
    }

    /// The dim list with the "absent or empty" case folded to `None`.
    pub fn dim_list(&self) -> Option<&[i64]> {
        match &self.dims {
            Some(dims) if !dims.is_empty() => Some(dims.as_slice()),
            _ => None,
        }
    }
}
