//! `rg-reduce` - Cached dataflow graphs for tensor reductions.
//!
//! This crate provides:
//! - Axis resolution and shape projection for reduce-all/per-axis and
//!   keepdim/squeeze requests
//! - A small graph IR with a per-operator builder table
//! - A signature-keyed graph cache that builds each graph at most once
//! - A `ComputeStream` trait with a reference `CpuStream`
//! - `ReductionEngine`, the per-operator entry points

pub mod axis;
pub mod backend;
pub mod builders;
pub mod cache;
pub mod engine;
pub mod error;
pub mod executor;
pub mod graph;
pub mod plan;
pub mod projection;
pub mod request;
pub mod signature;
pub mod stream;

// Re-export primary types at the crate root for convenience.
pub use axis::AxisSet;
pub use backend::ExecutionBackend;
pub use cache::{CacheStats, CachedGraph, GraphCache};
pub use engine::{EngineOptions, ReductionEngine};
pub use error::{ReduceError, Result};
pub use graph::Graph;
pub use plan::ReductionPlan;
pub use request::{ReduceOp, ReductionRequest, TensorDesc};
pub use signature::Signature;
pub use stream::{Capabilities, ComputeStream, CpuStream};
