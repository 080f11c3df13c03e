//! Test fixtures and sync helpers.
//!
//! Provides policies, status stores and a scriptable entity handler for
//! exercising the sync core end to end.

use flowsync_engine::{
    EngineConfig, EntityHandler, EntityRef, HandlerError, HandlerResult, Intent, SyncContext,
    SyncCore,
};
use flowsync_policy::{
    Action, EntityTypeConfig, FieldSettings, Flow, FlowId, InMemoryPolicy, Pool, PoolId,
    PoolUsage, Reason, SyncMode,
};
use flowsync_status::{Direction, StatusStore, StoreConfig};
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

/// Pool used by the fixture policies.
pub const POOL: &str = "content";

/// Handler id used by the fixture policies.
pub const HANDLER: &str = "default";

/// Returns a `node.article` entity.
pub fn article(id: &str) -> EntityRef {
    EntityRef::new("node", "article", id)
}

/// Returns a `media.image` entity.
pub fn media(id: &str) -> EntityRef {
    EntityRef::new("media", "image", id)
}

/// Builds a property map.
pub fn props(pairs: &[(&str, Value)]) -> Map<String, Value> {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_owned(), v.clone()))
        .collect()
}

/// Builds a property map holding one reference list.
pub fn list_props(field: &str, ids: &[&str]) -> Map<String, Value> {
    props(&[(field, Value::from(ids.to_vec()))])
}

/// Converts string slices into owned ids.
pub fn ids(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| (*s).to_owned()).collect()
}

/// A bundle that exports and imports with `mode` through [`POOL`].
pub fn bundle(entity_type: &str, bundle: &str, mode: SyncMode) -> EntityTypeConfig {
    EntityTypeConfig::new(entity_type, bundle, HANDLER)
        .with_export(mode)
        .with_export_pool(POOL, PoolUsage::Force)
        .with_import(mode)
        .with_import_pool(POOL, PoolUsage::Force)
        .with_deletion(true, true, true)
}

/// One flow `articles` syncing articles and images with `mode`.
pub fn simple_policy(mode: SyncMode) -> InMemoryPolicy {
    InMemoryPolicy::new().with_pool(Pool::new(POOL)).with_flow(
        Flow::new("articles")
            .with_entity_type(bundle("node", "article", mode))
            .with_entity_type(bundle("media", "image", mode)),
    )
}

/// Like [`simple_policy`] with a mergeable `tags` reference field on
/// articles.
pub fn merge_policy() -> InMemoryPolicy {
    let tags = FieldSettings {
        handler: "reference".to_owned(),
        allow_merge: true,
        target_entity_type: Some("taxonomy_term".to_owned()),
    };
    InMemoryPolicy::new().with_pool(Pool::new(POOL)).with_flow(
        Flow::new("articles")
            .with_entity_type(bundle("node", "article", SyncMode::Automatic).with_field("tags", tags)),
    )
}

/// A status store that cleans up after itself.
pub struct TestStore {
    /// The store.
    pub store: Arc<StatusStore>,
    path: Option<PathBuf>,
    /// Kept alive to prevent cleanup.
    _temp_dir: Option<TempDir>,
}

impl TestStore {
    /// Creates an in-memory store.
    pub fn memory() -> Self {
        Self {
            store: Arc::new(StatusStore::in_memory()),
            path: None,
            _temp_dir: None,
        }
    }

    /// Creates a store journaled to a temporary file.
    pub fn file() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("status.journal");
        let store = StatusStore::open_file(&path, StoreConfig::default())
            .expect("Failed to open status journal");
        Self {
            store: Arc::new(store),
            path: Some(path),
            _temp_dir: Some(temp_dir),
        }
    }

    /// Returns the journal path if file-based.
    pub fn path(&self) -> Option<&PathBuf> {
        self.path.as_ref()
    }
}

impl std::ops::Deref for TestStore {
    type Target = StatusStore;

    fn deref(&self) -> &Self::Target {
        &self.store
    }
}

/// One call into a [`RecordingHandler`].
#[derive(Debug, Clone, PartialEq)]
pub struct HandlerCall {
    /// Push or pull.
    pub direction: Direction,
    /// The entity.
    pub entity: EntityRef,
    /// The flow.
    pub flow: FlowId,
    /// The pool.
    pub pool: PoolId,
    /// The reason.
    pub reason: Reason,
    /// The action.
    pub action: Action,
    /// Whether the intent asked for an unpublished create.
    pub unpublished: bool,
}

/// A scriptable entity handler.
///
/// Accepts everything by default. Entities can be set to decline or fail,
/// to carry dependencies, and pulls merge configured reference fields into
/// an in-memory "local site".
#[derive(Default)]
pub struct RecordingHandler {
    calls: Mutex<Vec<HandlerCall>>,
    denied: Mutex<HashSet<String>>,
    failing: Mutex<HashMap<String, HandlerError>>,
    dependencies: Mutex<HashMap<String, Vec<(EntityRef, bool)>>>,
    merge_fields: Mutex<Vec<String>>,
    lists: Mutex<HashMap<(String, String), Vec<String>>>,
}

impl RecordingHandler {
    /// Creates a handler that accepts everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declines the entity with this id.
    pub fn deny(&self, id: &str) {
        self.denied.lock().insert(id.to_owned());
    }

    /// Fails the entity with this id.
    pub fn fail(&self, id: &str, kind: &str, message: &str) {
        self.failing
            .lock()
            .insert(id.to_owned(), HandlerError::new(kind, message));
    }

    /// Stops failing or declining the entity with this id.
    pub fn heal(&self, id: &str) {
        self.denied.lock().remove(id);
        self.failing.lock().remove(id);
    }

    /// Makes `parent` carry `dependency` on every push and pull.
    pub fn add_dependency(&self, parent: &str, dependency: EntityRef, embedded: bool) {
        self.dependencies
            .lock()
            .entry(parent.to_owned())
            .or_default()
            .push((dependency, embedded));
    }

    /// Merges this field on pull instead of ignoring it.
    pub fn merge_field(&self, field: &str) {
        self.merge_fields.lock().push(field.to_owned());
    }

    /// Sets the local value of a reference field.
    pub fn set_list(&self, id: &str, field: &str, values: Vec<String>) {
        self.lists
            .lock()
            .insert((id.to_owned(), field.to_owned()), values);
    }

    /// Returns the local value of a reference field.
    pub fn list(&self, id: &str, field: &str) -> Vec<String> {
        self.lists
            .lock()
            .get(&(id.to_owned(), field.to_owned()))
            .cloned()
            .unwrap_or_default()
    }

    /// Returns every recorded call.
    pub fn calls(&self) -> Vec<HandlerCall> {
        self.calls.lock().clone()
    }

    /// Returns the ids of entities handled in `direction`, in call order.
    pub fn handled(&self, direction: Direction) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.direction == direction)
            .map(|c| c.entity.id.clone())
            .collect()
    }

    /// Forgets recorded calls.
    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    fn record(&self, direction: Direction, intent: &Intent) -> HandlerResult<bool> {
        self.calls.lock().push(HandlerCall {
            direction,
            entity: intent.entity().clone(),
            flow: intent.flow().clone(),
            pool: intent.pool().clone(),
            reason: intent.reason(),
            action: intent.action(),
            unpublished: intent.is_unpublished(),
        });
        let id = &intent.entity().id;
        if let Some(err) = self.failing.lock().get(id) {
            return Err(err.clone());
        }
        Ok(!self.denied.lock().contains(id))
    }

    fn attach_dependencies(&self, intent: &mut Intent) {
        let dependencies = self
            .dependencies
            .lock()
            .get(&intent.entity().id)
            .cloned()
            .unwrap_or_default();
        for (entity, embedded) in dependencies {
            intent.add_dependency(entity, embedded);
        }
    }
}

impl EntityHandler for RecordingHandler {
    fn push(&self, _ctx: &SyncContext<'_>, intent: &mut Intent) -> HandlerResult<bool> {
        if !self.record(Direction::Push, intent)? {
            return Ok(false);
        }
        self.attach_dependencies(intent);
        Ok(true)
    }

    fn pull(&self, ctx: &SyncContext<'_>, intent: &mut Intent) -> HandlerResult<bool> {
        if !self.record(Direction::Pull, intent)? {
            return Ok(false);
        }

        let fields = self.merge_fields.lock().clone();
        let id = intent.entity().id.clone();
        for field in fields {
            let Some(Value::Array(values)) = intent.property(&field) else {
                continue;
            };
            let remote: Vec<String> = values
                .iter()
                .filter_map(|v| v.as_str().map(str::to_owned))
                .collect();
            let local = self.list(&id, &field);
            let merged = ctx.merge_reference_list(intent, &field, &remote, &local);
            self.set_list(&id, &field, merged);
        }

        self.attach_dependencies(intent);
        Ok(true)
    }
}

/// A sync core wired to a [`RecordingHandler`] and a test store.
pub struct SyncFixture {
    /// The core.
    pub core: SyncCore,
    /// The handler registered as [`HANDLER`].
    pub handler: Arc<RecordingHandler>,
    /// The status store.
    pub store: TestStore,
}

impl SyncFixture {
    /// Creates a fixture over an in-memory store.
    pub fn new(policy: InMemoryPolicy) -> Self {
        Self::with_config(policy, EngineConfig::default())
    }

    /// Creates a fixture with an engine configuration.
    pub fn with_config(policy: InMemoryPolicy, config: EngineConfig) -> Self {
        Self::with_store(policy, config, TestStore::memory())
    }

    /// Creates a fixture over an existing store.
    pub fn with_store(policy: InMemoryPolicy, config: EngineConfig, store: TestStore) -> Self {
        let handler = Arc::new(RecordingHandler::new());
        let core = SyncCore::new(Arc::new(policy), Arc::clone(&store.store))
            .with_config(config)
            .with_handler(HANDLER, Arc::clone(&handler) as Arc<dyn EntityHandler>);
        Self {
            core,
            handler,
            store,
        }
    }

    /// The status store.
    pub fn status(&self) -> &StatusStore {
        &self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_store_has_a_path() {
        let store = TestStore::file();
        assert!(store.path().is_some());
        assert!(store.is_empty());
        assert!(TestStore::memory().path().is_none());
    }

    #[test]
    fn handler_scripts_outcomes() {
        let fixture = SyncFixture::new(simple_policy(SyncMode::Automatic));
        fixture.handler.deny("a2");
        fixture.handler.fail("a3", "Transport", "down");

        fixture
            .core
            .push(&article("a1"), Reason::Automatic, Action::Create, Map::new())
            .unwrap();
        fixture
            .core
            .push(&article("a2"), Reason::Automatic, Action::Create, Map::new())
            .unwrap();
        assert!(fixture
            .core
            .push(&article("a3"), Reason::Automatic, Action::Create, Map::new())
            .is_err());

        assert_eq!(fixture.handler.handled(Direction::Push), ids(&["a1", "a2", "a3"]));
    }
}
