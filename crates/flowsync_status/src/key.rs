//! Identity of status records.

use crate::error::{StatusError, StatusResult};
use flowsync_policy::{FlowId, PoolId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The flow a status record belongs to.
///
/// `Unattributed` sorts before every real flow so that the records of one
/// entity form a contiguous range in the store.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowRef {
    /// Pull failures that could not be attributed to any flow.
    Unattributed,
    /// A configured flow.
    Flow(FlowId),
}

impl FlowRef {
    /// Returns the flow id, if attributed.
    #[must_use]
    pub fn flow_id(&self) -> Option<&FlowId> {
        match self {
            FlowRef::Unattributed => None,
            FlowRef::Flow(id) => Some(id),
        }
    }

    /// Returns true for the unattributed sentinel.
    #[must_use]
    pub fn is_unattributed(&self) -> bool {
        matches!(self, FlowRef::Unattributed)
    }
}

impl From<FlowId> for FlowRef {
    fn from(id: FlowId) -> Self {
        FlowRef::Flow(id)
    }
}

impl From<&FlowId> for FlowRef {
    fn from(id: &FlowId) -> Self {
        FlowRef::Flow(id.clone())
    }
}

impl fmt::Display for FlowRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlowRef::Unattributed => f.write_str("<no-flow>"),
            FlowRef::Flow(id) => write!(f, "{id}"),
        }
    }
}

/// Identity of a local entity.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityKey {
    /// Entity type, e.g. `node`.
    pub entity_type: String,
    /// Stable entity identity (usually a UUID).
    pub entity_id: String,
}

impl EntityKey {
    /// Creates a new entity key.
    #[must_use]
    pub fn new(entity_type: impl Into<String>, entity_id: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            entity_id: entity_id.into(),
        }
    }

    /// Rejects empty identifiers.
    ///
    /// # Errors
    ///
    /// Returns `InvalidKey` if the type or id is empty.
    pub fn validate(&self) -> StatusResult<()> {
        if self.entity_type.is_empty() {
            return Err(StatusError::InvalidKey("empty entity type".into()));
        }
        if self.entity_id.is_empty() {
            return Err(StatusError::InvalidKey("empty entity id".into()));
        }
        Ok(())
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.entity_type, self.entity_id)
    }
}

/// Identity of one status record: (entity type, entity id, flow, pool).
///
/// Field order defines the sort order, which groups records by entity.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StatusKey {
    /// Entity type.
    pub entity_type: String,
    /// Entity identity.
    pub entity_id: String,
    /// Owning flow, or the unattributed sentinel.
    pub flow: FlowRef,
    /// Pool.
    pub pool: PoolId,
}

impl StatusKey {
    /// Creates a key for a configured flow.
    #[must_use]
    pub fn new(
        entity_type: impl Into<String>,
        entity_id: impl Into<String>,
        flow: impl Into<FlowId>,
        pool: impl Into<PoolId>,
    ) -> Self {
        Self {
            entity_type: entity_type.into(),
            entity_id: entity_id.into(),
            flow: FlowRef::Flow(flow.into()),
            pool: pool.into(),
        }
    }

    /// Creates a key for a pull failure without a matching flow.
    #[must_use]
    pub fn unattributed(entity: &EntityKey, pool: impl Into<PoolId>) -> Self {
        Self {
            entity_type: entity.entity_type.clone(),
            entity_id: entity.entity_id.clone(),
            flow: FlowRef::Unattributed,
            pool: pool.into(),
        }
    }

    /// Creates a key for an entity under a flow and pool.
    #[must_use]
    pub fn for_entity(entity: &EntityKey, flow: &FlowId, pool: &PoolId) -> Self {
        Self {
            entity_type: entity.entity_type.clone(),
            entity_id: entity.entity_id.clone(),
            flow: FlowRef::Flow(flow.clone()),
            pool: pool.clone(),
        }
    }

    /// Returns the entity part of the key.
    #[must_use]
    pub fn entity(&self) -> EntityKey {
        EntityKey::new(self.entity_type.clone(), self.entity_id.clone())
    }

    /// Returns true if the key belongs to the entity.
    #[must_use]
    pub fn is_for(&self, entity: &EntityKey) -> bool {
        self.entity_type == entity.entity_type && self.entity_id == entity.entity_id
    }

    /// Rejects empty identifiers.
    ///
    /// # Errors
    ///
    /// Returns `InvalidKey` if any part is empty.
    pub fn validate(&self) -> StatusResult<()> {
        self.entity().validate()?;
        if let FlowRef::Flow(id) = &self.flow {
            if id.as_str().is_empty() {
                return Err(StatusError::InvalidKey("empty flow id".into()));
            }
        }
        if self.pool.as_str().is_empty() {
            return Err(StatusError::InvalidKey("empty pool id".into()));
        }
        Ok(())
    }

    /// Smallest possible key of an entity, used as a range start.
    pub(crate) fn entity_start(entity: &EntityKey) -> Self {
        Self {
            entity_type: entity.entity_type.clone(),
            entity_id: entity.entity_id.clone(),
            flow: FlowRef::Unattributed,
            pool: PoolId::new(""),
        }
    }
}

impl fmt::Display for StatusKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}@{}/{}",
            self.entity_type, self.entity_id, self.flow, self.pool
        )
    }
}
