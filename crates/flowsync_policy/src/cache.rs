//! Process-wide policy cache with explicit invalidation.

use crate::flow::Flow;
use crate::matrix::PolicyMatrix;
use crate::pool::Pool;
use crate::types::{FlowId, PoolId};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// A loaded copy of the policy matrix.
#[derive(Debug, Default)]
struct Snapshot {
    flows: Vec<Flow>,
    pools: Vec<Pool>,
    schema_versions: RwLock<BTreeMap<(String, String), Option<String>>>,
}

/// Caches flows and pools loaded from a [`PolicyMatrix`].
///
/// The cache is filled lazily on first access and kept until
/// [`FlowCache::invalidate`] is called, typically from a configuration save
/// hook. Evaluators receive the cache by reference; nothing in flowsync
/// reaches for it as ambient state.
///
/// `FlowCache` itself implements [`PolicyMatrix`], so it can be handed to
/// anything that expects the uncached source.
pub struct FlowCache {
    source: Arc<dyn PolicyMatrix>,
    snapshot: RwLock<Option<Arc<Snapshot>>>,
    generation: AtomicU64,
}

impl FlowCache {
    /// Creates an empty cache over a policy source.
    pub fn new(source: Arc<dyn PolicyMatrix>) -> Self {
        Self {
            source,
            snapshot: RwLock::new(None),
            generation: AtomicU64::new(0),
        }
    }

    /// Drops the cached snapshot; the next lookup reloads from the source.
    pub fn invalidate(&self) {
        *self.snapshot.write() = None;
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::info!(generation, "policy cache invalidated");
    }

    /// Returns how many times the cache has been invalidated.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Returns true if a snapshot is currently loaded.
    pub fn is_loaded(&self) -> bool {
        self.snapshot.read().is_some()
    }

    fn snapshot(&self) -> Arc<Snapshot> {
        if let Some(snapshot) = self.snapshot.read().as_ref() {
            return Arc::clone(snapshot);
        }

        let mut slot = self.snapshot.write();
        // Another thread may have filled the slot while we waited.
        if let Some(snapshot) = slot.as_ref() {
            return Arc::clone(snapshot);
        }
        let snapshot = Arc::new(Snapshot {
            flows: self.source.flows(),
            pools: self.source.pools(),
            schema_versions: RwLock::new(BTreeMap::new()),
        });
        tracing::debug!(flows = snapshot.flows.len(), "policy cache loaded");
        *slot = Some(Arc::clone(&snapshot));
        snapshot
    }
}

impl PolicyMatrix for FlowCache {
    fn flow(&self, id: &FlowId) -> Option<Flow> {
        self.snapshot().flows.iter().find(|f| &f.id == id).cloned()
    }

    fn flows(&self) -> Vec<Flow> {
        self.snapshot().flows.clone()
    }

    fn pool(&self, id: &PoolId) -> Option<Pool> {
        self.snapshot().pools.iter().find(|p| &p.id == id).cloned()
    }

    fn pools(&self) -> Vec<Pool> {
        self.snapshot().pools.clone()
    }

    fn schema_version(&self, entity_type: &str, bundle: &str) -> Option<String> {
        let snapshot = self.snapshot();
        let key = (entity_type.to_owned(), bundle.to_owned());
        if let Some(version) = snapshot.schema_versions.read().get(&key) {
            return version.clone();
        }
        let version = self.source.schema_version(entity_type, bundle);
        snapshot.schema_versions.write().insert(key, version.clone());
        version
    }
}
