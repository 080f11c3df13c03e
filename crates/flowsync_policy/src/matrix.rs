//! The policy matrix lookup contract and an in-memory implementation.

use crate::error::{PolicyError, PolicyResult};
use crate::flow::Flow;
use crate::pool::Pool;
use crate::schema::schema_version;
use crate::types::{FlowId, PoolId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Read-only access to flows and pools.
///
/// Implementations must return flows in configuration order; the pull
/// evaluator's tie-break depends on it.
pub trait PolicyMatrix: Send + Sync {
    /// Returns a flow by machine name.
    fn flow(&self, id: &FlowId) -> Option<Flow>;

    /// Returns every flow in configuration order.
    fn flows(&self) -> Vec<Flow>;

    /// Returns a pool by machine name.
    fn pool(&self, id: &PoolId) -> Option<Pool>;

    /// Returns every pool.
    fn pools(&self) -> Vec<Pool>;

    /// Recomputes the schema version of a bundle from its current field set.
    ///
    /// Returns `None` if the bundle is unknown to this site.
    fn schema_version(&self, entity_type: &str, bundle: &str) -> Option<String>;

    /// Returns the flows that use a pool in either direction.
    fn flows_using_pool(&self, pool: &PoolId) -> Vec<Flow> {
        self.flows()
            .into_iter()
            .filter(|f| f.uses_pool(pool))
            .collect()
    }
}

/// Serialized form of a policy matrix.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyDocument {
    /// Pool definitions.
    #[serde(default)]
    pub pools: Vec<Pool>,
    /// Flow definitions in configuration order.
    #[serde(default)]
    pub flows: Vec<Flow>,
    /// Current field names per `entity_type.bundle`.
    ///
    /// When absent for a bundle, the schema version is derived from the
    /// fields configured in the first flow that covers it.
    #[serde(default)]
    pub bundles: BTreeMap<String, Vec<String>>,
}

/// An in-memory policy matrix.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPolicy {
    flows: Vec<Flow>,
    pools: Vec<Pool>,
    bundles: BTreeMap<(String, String), Vec<String>>,
}

impl InMemoryPolicy {
    /// Creates an empty matrix.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a pool.
    #[must_use]
    pub fn with_pool(mut self, pool: Pool) -> Self {
        self.pools.retain(|p| p.id != pool.id);
        self.pools.push(pool);
        self
    }

    /// Appends a flow, or replaces one with the same id in place.
    #[must_use]
    pub fn with_flow(mut self, flow: Flow) -> Self {
        match self.flows.iter_mut().find(|f| f.id == flow.id) {
            Some(existing) => *existing = flow,
            None => self.flows.push(flow),
        }
        self
    }

    /// Declares the current field set of a bundle.
    #[must_use]
    pub fn with_bundle_fields<I, S>(mut self, entity_type: &str, bundle: &str, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.bundles.insert(
            (entity_type.to_owned(), bundle.to_owned()),
            fields.into_iter().map(Into::into).collect(),
        );
        self
    }

    /// Builds a validated matrix from a document.
    ///
    /// # Errors
    ///
    /// Returns an error if ids are empty or duplicated, or if a flow
    /// references a pool that is not defined.
    pub fn from_document(doc: PolicyDocument) -> PolicyResult<Self> {
        let mut policy = Self::new();

        for pool in doc.pools {
            if pool.id.as_str().is_empty() {
                return Err(PolicyError::InvalidIdentifier("empty pool id".into()));
            }
            if policy.pools.iter().any(|p| p.id == pool.id) {
                return Err(PolicyError::DuplicatePool {
                    id: pool.id.to_string(),
                });
            }
            policy.pools.push(pool);
        }

        for flow in doc.flows {
            if flow.id.as_str().is_empty() {
                return Err(PolicyError::InvalidIdentifier("empty flow id".into()));
            }
            if policy.flows.iter().any(|f| f.id == flow.id) {
                return Err(PolicyError::DuplicateFlow {
                    id: flow.id.to_string(),
                });
            }
            policy.validate_flow(&flow)?;
            policy.flows.push(flow);
        }

        for (key, fields) in doc.bundles {
            let (entity_type, bundle) = key.split_once('.').ok_or_else(|| {
                PolicyError::InvalidIdentifier(format!("bundle key must be type.bundle: {key}"))
            })?;
            policy
                .bundles
                .insert((entity_type.to_owned(), bundle.to_owned()), fields);
        }

        tracing::debug!(
            flows = policy.flows.len(),
            pools = policy.pools.len(),
            "loaded policy matrix"
        );

        Ok(policy)
    }

    /// Parses and validates a JSON policy document.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed or fails validation.
    pub fn from_json(json: &str) -> PolicyResult<Self> {
        let doc: PolicyDocument = serde_json::from_str(json)?;
        Self::from_document(doc)
    }

    /// Reads a JSON policy document from disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is invalid.
    pub fn from_path(path: &Path) -> PolicyResult<Self> {
        let data = std::fs::read_to_string(path)?;
        Self::from_json(&data)
    }

    /// Converts the matrix back into its serialized form.
    #[must_use]
    pub fn to_document(&self) -> PolicyDocument {
        PolicyDocument {
            pools: self.pools.clone(),
            flows: self.flows.clone(),
            bundles: self
                .bundles
                .iter()
                .map(|((t, b), fields)| (format!("{t}.{b}"), fields.clone()))
                .collect(),
        }
    }

    fn validate_flow(&self, flow: &Flow) -> PolicyResult<()> {
        for (i, config) in flow.entity_types.iter().enumerate() {
            let duplicate = flow.entity_types[..i]
                .iter()
                .any(|c| c.entity_type == config.entity_type && c.bundle == config.bundle);
            if duplicate {
                return Err(PolicyError::DuplicateEntityType {
                    flow: flow.id.to_string(),
                    entity_type: config.entity_type.clone(),
                    bundle: config.bundle.clone(),
                });
            }
            for pool in config.export_pools.keys().chain(config.import_pools.keys()) {
                if !self.pools.iter().any(|p| &p.id == pool) {
                    return Err(PolicyError::UnknownPool {
                        flow: flow.id.to_string(),
                        pool: pool.to_string(),
                    });
                }
            }
        }
        Ok(())
    }
}

impl PolicyMatrix for InMemoryPolicy {
    fn flow(&self, id: &FlowId) -> Option<Flow> {
        self.flows.iter().find(|f| &f.id == id).cloned()
    }

    fn flows(&self) -> Vec<Flow> {
        self.flows.clone()
    }

    fn pool(&self, id: &PoolId) -> Option<Pool> {
        self.pools.iter().find(|p| &p.id == id).cloned()
    }

    fn pools(&self) -> Vec<Pool> {
        self.pools.clone()
    }

    fn schema_version(&self, entity_type: &str, bundle: &str) -> Option<String> {
        if let Some(fields) = self
            .bundles
            .get(&(entity_type.to_owned(), bundle.to_owned()))
        {
            return Some(schema_version(entity_type, bundle, fields));
        }
        self.flows
            .iter()
            .find_map(|f| f.entity_type_config(entity_type, bundle))
            .map(|c| c.current_schema_version())
    }
}
