//! Entity handlers and the context they run in.

use crate::engine::SyncCore;
use crate::error::HandlerResult;
use crate::intent::Intent;
use crate::merge::merge_reference_list;
use flowsync_policy::{EntityTypeConfig, Flow};
use flowsync_status::{EntityKey, StatusStore};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Serializes entities of one shape into and out of intents.
///
/// Returning `Ok(false)` declines the entity; it is recorded as a soft
/// failure. Returning an error is recorded as a hard failure and propagated
/// to the caller.
pub trait EntityHandler: Send + Sync {
    /// Fills the intent's properties and dependencies for a push.
    fn push(&self, ctx: &SyncContext<'_>, intent: &mut Intent) -> HandlerResult<bool>;

    /// Applies the intent's properties to the local entity.
    fn pull(&self, ctx: &SyncContext<'_>, intent: &mut Intent) -> HandlerResult<bool>;
}

/// What a handler can see while it runs.
pub struct SyncContext<'a> {
    core: &'a SyncCore,
    flow: &'a Flow,
    config: &'a EntityTypeConfig,
}

impl<'a> SyncContext<'a> {
    pub(crate) fn new(core: &'a SyncCore, flow: &'a Flow, config: &'a EntityTypeConfig) -> Self {
        Self { core, flow, config }
    }

    /// The flow the attempt runs under.
    pub fn flow(&self) -> &Flow {
        self.flow
    }

    /// The bundle configuration of the attempt.
    pub fn entity_type_config(&self) -> &EntityTypeConfig {
        self.config
    }

    /// Read access to the status store.
    pub fn status(&self) -> &StatusStore {
        self.core.status()
    }

    /// Merges a pulled reference list into the local one.
    ///
    /// The merge history is staged on the intent and persisted only if the
    /// pull succeeds.
    pub fn merge_reference_list(
        &self,
        intent: &mut Intent,
        field: &str,
        remote: &[String],
        local: &[String],
    ) -> Vec<String> {
        let previous = self.status().merge_snapshot(&intent.status_key(), field);
        let target_type = self
            .config
            .field(field)
            .and_then(|f| f.target_entity_type.clone())
            .unwrap_or_else(|| intent.entity().entity_type.clone());

        let result = merge_reference_list(
            remote,
            local,
            previous.as_ref(),
            self.config.allows_merge(field),
            |id| self.core.is_remote_sourced(&EntityKey::new(target_type.clone(), id)),
        );
        intent.stage_snapshot(field, result.snapshot);
        result.merged
    }
}

impl fmt::Debug for SyncContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncContext")
            .field("flow", &self.flow.id)
            .field("entity_type", &self.config.entity_type)
            .field("bundle", &self.config.bundle)
            .finish()
    }
}

/// Entity handlers keyed by handler id.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: RwLock<HashMap<String, Arc<dyn EntityHandler>>>,
}

impl HandlerRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler, replacing any handler with the same id.
    pub fn register(&self, id: impl Into<String>, handler: Arc<dyn EntityHandler>) {
        self.handlers.write().insert(id.into(), handler);
    }

    /// Returns a handler.
    pub fn get(&self, id: &str) -> Option<Arc<dyn EntityHandler>> {
        self.handlers.read().get(id).cloned()
    }

    /// Returns the registered ids, sorted.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.handlers.read().keys().cloned().collect();
        ids.sort();
        ids
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("handlers", &self.ids())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Decline;

    impl EntityHandler for Decline {
        fn push(&self, _ctx: &SyncContext<'_>, _intent: &mut Intent) -> HandlerResult<bool> {
            Ok(false)
        }
        fn pull(&self, _ctx: &SyncContext<'_>, _intent: &mut Intent) -> HandlerResult<bool> {
            Ok(false)
        }
    }

    #[test]
    fn register_replaces_and_lists() {
        let registry = HandlerRegistry::new();
        registry.register("b", Arc::new(Decline));
        registry.register("a", Arc::new(Decline));
        registry.register("a", Arc::new(Decline));
        assert_eq!(registry.ids(), vec!["a".to_owned(), "b".to_owned()]);
        assert!(registry.get("a").is_some());
        assert!(registry.get("missing").is_none());
    }
}
