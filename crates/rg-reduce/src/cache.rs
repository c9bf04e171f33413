//! Signature-keyed graph cache.
//!
//! Each signature owns a slot. The first caller to reach an empty slot takes
//! the slot's build lock and runs the builder; concurrent callers for the same
//! signature wait on that lock and then observe the built graph. Once built,
//! a slot is read through its `OnceLock` without any further locking.
//! Entries live for the lifetime of the cache; nothing is evicted.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use parking_lot::{Mutex, RwLock};
use tracing::{debug, trace};

use crate::error::Result;
use crate::graph::Graph;
use crate::signature::Signature;

/// A compiled graph together with the signature it was built for.
#[derive(Debug)]
pub struct CachedGraph {
    signature: Signature,
    graph: Graph,
}

impl CachedGraph {
    pub fn new(signature: Signature, graph: Graph) -> Self {
        CachedGraph { signature, graph }
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }
}

#[derive(Debug, Default)]
struct Slot {
    built: OnceLock<Arc<CachedGraph>>,
    build_lock: Mutex<()>,
}

/// Counters describing cache activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    /// Graphs currently stored.
    pub entries: usize,
    /// Builder invocations that produced a graph.
    pub builds: usize,
    /// Lookups served by an already-built graph.
    pub hits: usize,
}

#[derive(Debug, Default)]
pub struct GraphCache {
    slots: RwLock<HashMap<Signature, Arc<Slot>>>,
    builds: AtomicUsize,
    hits: AtomicUsize,
}

impl GraphCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the graph cached for `signature`, building it with `build` if
    /// this is the first request for that signature.
    ///
    /// `build` runs at most once per signature across all threads, unless it
    /// fails, in which case the slot stays empty and the next caller retries.
    pub fn get_or_build<F>(&self, signature: &Signature, build: F) -> Result<Arc<CachedGraph>>
    where
        F: FnOnce() -> Result<Graph>,
    {
        let slot = self.slot(signature);
        if let Some(graph) = slot.built.get() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            trace!(signature = %signature, "graph cache hit");
            return Ok(Arc::clone(graph));
        }

        let _guard = slot.build_lock.lock();
        // Another caller may have finished the build while we waited.
        if let Some(graph) = slot.built.get() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(Arc::clone(graph));
        }

        debug!(signature = %signature, "graph cache miss, building");
        let graph = Arc::new(CachedGraph::new(signature.clone(), build()?));
        self.builds.fetch_add(1, Ordering::Relaxed);
        Ok(Arc::clone(slot.built.get_or_init(|| graph)))
    }

    /// Look up a built graph without building.
    pub fn get(&self, signature: &Signature) -> Option<Arc<CachedGraph>> {
        self.slots
            .read()
            .get(signature)
            .and_then(|slot| slot.built.get().cloned())
    }

    fn slot(&self, signature: &Signature) -> Arc<Slot> {
        if let Some(slot) = self.slots.read().get(signature) {
            return Arc::clone(slot);
        }
        let mut slots = self.slots.write();
        Arc::clone(slots.entry(signature.clone()).or_default())
    }

    /// Number of built graphs.
    pub fn len(&self) -> usize {
        self.slots
            .read()
            .values()
            .filter(|slot| slot.built.get().is_some())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.len(),
            builds: self.builds.load(Ordering::Relaxed),
            hits: self.hits.load(Ordering::Relaxed),
        }
    }
}
