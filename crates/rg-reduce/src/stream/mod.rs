//! The compute stream collaborator: accepts a compiled graph plus buffer
//! bindings and populates the output buffers.

pub mod cpu;

use std::fmt::Debug;

use rg_tensor::{CpuStorage, Shape};

use crate::error::Result;
use crate::graph::Graph;

pub use cpu::CpuStream;

/// Optional primitives a stream may lack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// Native `Sort`/`ArgSort` support.
    pub sort: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Capabilities { sort: true }
    }
}

/// A read-only buffer bound to a named graph input, viewed with the
/// apparent shape the graph was built for.
#[derive(Debug, Clone, Copy)]
pub struct InputBinding<'a> {
    pub name: &'a str,
    pub storage: &'a CpuStorage,
    pub shape: &'a Shape,
}

/// A destination buffer bound to a named graph output.
#[derive(Debug)]
pub struct OutputBinding<'a> {
    pub name: &'a str,
    pub storage: &'a mut CpuStorage,
    pub shape: &'a Shape,
}

/// Trait for pluggable execution targets.
///
/// `submit` returns once every output binding has been populated; callers
/// rely on no other synchronization. There is no cancellation: a submitted
/// graph runs to completion.
pub trait ComputeStream: Send + Sync + Debug {
    /// Returns the name of this stream (e.g., "cpu").
    fn name(&self) -> &str;

    fn capabilities(&self) -> Capabilities {
        Capabilities::default()
    }

    /// Run `graph` with the given bindings.
    fn submit(
        &self,
        graph: &Graph,
        inputs: &[InputBinding<'_>],
        outputs: &mut [OutputBinding<'_>],
    ) -> Result<()>;
}
