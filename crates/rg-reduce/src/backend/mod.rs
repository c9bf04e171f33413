//! Execution backend selection.
//!
//! Sort-based median needs a native sort on the compute stream. The engine
//! probes the stream once; a stream without sort reroutes median requests to
//! the host fallback for the lifetime of the engine.

pub(crate) mod fallback;

use std::fmt;

use tracing::warn;

use crate::error::{ReduceError, Result};
use crate::stream::ComputeStream;

/// Where sort-based median runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExecutionBackend {
    /// Every graph, median included, is submitted to the compute stream.
    Native,
    /// Median is computed on the host and copied into the destinations.
    HostFallback,
}

impl fmt::Display for ExecutionBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionBackend::Native => write!(f, "native"),
            ExecutionBackend::HostFallback => write!(f, "host-fallback"),
        }
    }
}

/// Check that `stream` can run the sort primitives.
pub fn probe(stream: &dyn ComputeStream) -> Result<()> {
    if stream.capabilities().sort {
        Ok(())
    } else {
        Err(ReduceError::UnsupportedPlatform(format!(
            "stream '{}' has no native sort",
            stream.name()
        )))
    }
}

/// Probe `stream` and pick a backend. An unsupported platform is advisory:
/// it is logged and answered with [`ExecutionBackend::HostFallback`].
pub fn select(stream: &dyn ComputeStream) -> ExecutionBackend {
    match probe(stream) {
        Ok(()) => ExecutionBackend::Native,
        Err(err) => {
            warn!(
                stream = stream.name(),
                reason = %err,
                "sort-based median rerouted to the host fallback"
            );
            ExecutionBackend::HostFallback
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::CpuStream;

    #[test]
    fn test_sort_capability_check() {
        assert!(probe(&CpuStream::new()).is_ok());
        assert!(matches!(
            probe(&CpuStream::without_sort()),
            Err(ReduceError::UnsupportedPlatform(_))
        ));
    }

    #[test]
    fn test_select() {
        assert_eq!(select(&CpuStream::new()), ExecutionBackend::Native);
        assert_eq!(select(&CpuStream::without_sort()), ExecutionBackend::HostFallback);
    }
}
