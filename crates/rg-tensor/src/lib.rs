//! `rg-tensor` - Typed host tensors for reduce-graph.
//!
//! This crate provides:
//! - A `Tensor` type backed by typed CPU storage
//! - Data type definitions (bool, integers, F16, F32)
//! - Shape utilities, axis wrapping, and broadcasting
//! - A `Device` tag for rejecting operands bound to different locations

pub mod device;
pub mod dtype;
pub mod error;
pub mod shape;
pub mod storage;
pub mod tensor;

// Re-export primary types at the crate root for convenience.
pub use device::Device;
pub use dtype::DType;
pub use error::{Result, TensorError};
pub use shape::Shape;
pub use storage::CpuStorage;
pub use tensor::Tensor;
