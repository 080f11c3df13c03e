//! Per-attempt synchronization requests.

use crate::error::{SyncError, SyncResult};
use flowsync_policy::{Action, FlowId, PoolId, Reason};
use flowsync_status::{EntityKey, MergeSnapshot, StatusKey};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;

/// A local entity as seen by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    /// Entity type, e.g. `node`.
    pub entity_type: String,
    /// Bundle, e.g. `article`.
    pub bundle: String,
    /// Stable identity shared across sites.
    pub id: String,
}

impl EntityRef {
    /// Creates an entity reference.
    pub fn new(
        entity_type: impl Into<String>,
        bundle: impl Into<String>,
        id: impl Into<String>,
    ) -> Self {
        Self {
            entity_type: entity_type.into(),
            bundle: bundle.into(),
            id: id.into(),
        }
    }

    /// Returns the status-store identity of the entity.
    pub fn key(&self) -> EntityKey {
        EntityKey::new(self.entity_type.clone(), self.id.clone())
    }

    /// Returns the status key of the entity under a flow and pool.
    pub fn status_key(&self, flow: &FlowId, pool: &PoolId) -> StatusKey {
        StatusKey::for_entity(&self.key(), flow, pool)
    }

    /// Rejects empty identifiers.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` naming the first empty part.
    pub fn validate(&self) -> SyncResult<()> {
        if self.entity_type.is_empty() {
            return Err(SyncError::invalid_argument("empty entity type"));
        }
        if self.bundle.is_empty() {
            return Err(SyncError::invalid_argument("empty bundle"));
        }
        if self.id.is_empty() {
            return Err(SyncError::invalid_argument("empty entity id"));
        }
        Ok(())
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}:{}", self.entity_type, self.bundle, self.id)
    }
}

/// An entity that travels with the one being synchronized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dependency {
    /// The referenced entity.
    pub entity: EntityRef,
    /// Serialized inside the parent rather than on its own.
    pub embedded: bool,
    /// Properties of the dependency, for pulls.
    #[serde(default)]
    pub properties: Map<String, Value>,
}

/// One push or pull attempt of one entity through one flow and pool.
///
/// Handlers read and write the attempt's properties. Nothing an intent
/// carries reaches the status store until the attempt succeeds.
#[derive(Debug, Clone)]
pub struct Intent {
    reason: Reason,
    action: Action,
    entity: EntityRef,
    flow: FlowId,
    pool: PoolId,
    depth: usize,
    properties: Map<String, Value>,
    dependencies: Vec<Dependency>,
    staged_snapshots: BTreeMap<String, MergeSnapshot>,
    unpublished: bool,
}

impl Intent {
    /// Creates an intent with no properties.
    pub fn new(
        entity: EntityRef,
        flow: FlowId,
        pool: PoolId,
        reason: Reason,
        action: Action,
    ) -> Self {
        Self {
            reason,
            action,
            entity,
            flow,
            pool,
            depth: 0,
            properties: Map::new(),
            dependencies: Vec::new(),
            staged_snapshots: BTreeMap::new(),
            unpublished: false,
        }
    }

    /// Sets the initial properties.
    #[must_use]
    pub fn with_properties(mut self, properties: Map<String, Value>) -> Self {
        self.properties = properties;
        self
    }

    #[must_use]
    pub(crate) fn with_depth(mut self, depth: usize) -> Self {
        self.depth = depth;
        self
    }

    /// Why the attempt happens.
    pub fn reason(&self) -> Reason {
        self.reason
    }

    /// What the attempt does.
    pub fn action(&self) -> Action {
        self.action
    }

    /// The entity.
    pub fn entity(&self) -> &EntityRef {
        &self.entity
    }

    /// The flow the attempt runs under.
    pub fn flow(&self) -> &FlowId {
        &self.flow
    }

    /// The pool the attempt targets.
    pub fn pool(&self) -> &PoolId {
        &self.pool
    }

    /// Nesting level; zero for the entity the caller asked for.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// The status key this attempt writes to.
    pub fn status_key(&self) -> StatusKey {
        self.entity.status_key(&self.flow, &self.pool)
    }

    /// Returns a property.
    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }

    /// Sets a property.
    pub fn set_property(&mut self, name: impl Into<String>, value: Value) {
        self.properties.insert(name.into(), value);
    }

    /// Removes a property.
    pub fn remove_property(&mut self, name: &str) -> Option<Value> {
        self.properties.remove(name)
    }

    /// Returns every property.
    pub fn properties(&self) -> &Map<String, Value> {
        &self.properties
    }

    /// Adds an entity that must travel with this one.
    pub fn add_dependency(&mut self, entity: EntityRef, embedded: bool) {
        self.add_dependency_with(entity, embedded, Map::new());
    }

    /// Adds a dependency together with its properties.
    pub fn add_dependency_with(
        &mut self,
        entity: EntityRef,
        embedded: bool,
        properties: Map<String, Value>,
    ) {
        if self.dependencies.iter().any(|d| d.entity == entity) {
            return;
        }
        self.dependencies.push(Dependency {
            entity,
            embedded,
            properties,
        });
    }

    /// Returns the collected dependencies.
    pub fn dependencies(&self) -> &[Dependency] {
        &self.dependencies
    }

    /// Marks a created entity as unpublished.
    pub fn mark_unpublished(&mut self) {
        self.unpublished = true;
    }

    /// Returns true if the entity must be created unpublished.
    pub fn is_unpublished(&self) -> bool {
        self.unpublished
    }

    pub(crate) fn stage_snapshot(&mut self, field: &str, snapshot: MergeSnapshot) {
        self.staged_snapshots.insert(field.to_owned(), snapshot);
    }

    pub(crate) fn take_snapshots(&mut self) -> BTreeMap<String, MergeSnapshot> {
        std::mem::take(&mut self.staged_snapshots)
    }

    pub(crate) fn take_dependencies(&mut self) -> Vec<Dependency> {
        std::mem::take(&mut self.dependencies)
    }

    /// Hex SHA-256 of the serialized properties.
    ///
    /// Property maps are key-ordered, so equal properties hash equally.
    pub fn payload_hash(&self) -> String {
        let mut hasher = Sha256::new();
        // A `Map` of `Value`s always serializes.
        let bytes = serde_json::to_vec(&self.properties).unwrap_or_default();
        hasher.update(&bytes);
        hasher
            .finalize()
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect()
    }
}
