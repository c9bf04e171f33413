use thiserror::Error;

use rg_tensor::TensorError;

#[derive(Error, Debug)]
pub enum ReduceError {
    /// A request the reduction entry points refuse: bad axis, unsupported
    /// dtype, negative norm exponent, mismatched operands.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// An index-producing reduction asked to pick from zero candidates.
    #[error("index error: {0}")]
    IndexError(String),
    /// The compute stream lacks a capability. Consumed by the backend probe,
    /// which reroutes to the host fallback instead of failing.
    #[error("unsupported platform: {0}")]
    UnsupportedPlatform(String),
    /// A graph builder saw inconsistent axis or shape state.
    #[error("internal invariant violated: {0}")]
    Internal(String),
    #[error("tensor error: {0}")]
    Tensor(#[from] TensorError),
}

impl ReduceError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        ReduceError::InvalidArgument(msg.into())
    }

    pub(crate) fn internal(msg: impl Into<String>) -> Self {
        ReduceError::Internal(msg.into())
    }

    /// True for every caller-side argument error, including index errors and
    /// axis errors surfaced by the tensor layer.
    pub fn is_invalid_argument(&self) -> bool {
        matches!(
            self,
            ReduceError::InvalidArgument(_)
                | ReduceError::IndexError(_)
                | ReduceError::Tensor(TensorError::InvalidAxis { .. })
        )
    }
}

pub type Result<T> = std::result::Result<T, ReduceError>;
