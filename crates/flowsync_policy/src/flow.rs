//! Flow and per-bundle configuration.

use crate::schema::schema_version;
use crate::types::{FlowId, ImportUpdateBehavior, PoolId, PoolUsage, SyncMode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Handler id that marks a bundle as explicitly not synchronized.
pub const HANDLER_IGNORE: &str = "ignore";

/// Settings for a single field of a bundle.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldSettings {
    /// Field handler id.
    pub handler: String,
    /// Whether pulled reference lists are merged instead of overwritten.
    pub allow_merge: bool,
    /// Entity type the field references, for reference fields.
    pub target_entity_type: Option<String>,
}

/// Push/pull policy of one flow for one entity type and bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityTypeConfig {
    /// Entity type, e.g. `node`.
    pub entity_type: String,
    /// Bundle, e.g. `article`.
    pub bundle: String,
    /// Entity handler id. [`HANDLER_IGNORE`] disables the bundle.
    pub handler: String,
    /// When the bundle is pushed.
    #[serde(default)]
    pub export_mode: SyncMode,
    /// Pool usage for pushes.
    #[serde(default)]
    pub export_pools: BTreeMap<PoolId, PoolUsage>,
    /// When the bundle is pulled.
    #[serde(default)]
    pub import_mode: SyncMode,
    /// Pool usage for pulls.
    #[serde(default)]
    pub import_pools: BTreeMap<PoolId, PoolUsage>,
    /// Whether local deletions are pushed.
    #[serde(default)]
    pub export_deletion: bool,
    /// Whether remote deletions are pulled.
    #[serde(default)]
    pub import_deletion: bool,
    /// Whether editors may delete pulled entities locally.
    #[serde(default = "default_true")]
    pub allow_local_deletion_of_import: bool,
    /// What a pull does to an entity that already exists.
    #[serde(default)]
    pub import_update_behavior: ImportUpdateBehavior,
    /// Hash of the bundle's field set when the flow was saved.
    #[serde(default)]
    pub schema_version: String,
    /// Per-field settings keyed by field name.
    #[serde(default)]
    pub fields: BTreeMap<String, FieldSettings>,
}

fn default_true() -> bool {
    true
}

impl EntityTypeConfig {
    /// Creates a config with every direction disabled.
    #[must_use]
    pub fn new(
        entity_type: impl Into<String>,
        bundle: impl Into<String>,
        handler: impl Into<String>,
    ) -> Self {
        Self {
            entity_type: entity_type.into(),
            bundle: bundle.into(),
            handler: handler.into(),
            export_mode: SyncMode::Disabled,
            export_pools: BTreeMap::new(),
            import_mode: SyncMode::Disabled,
            import_pools: BTreeMap::new(),
            export_deletion: false,
            import_deletion: false,
            allow_local_deletion_of_import: true,
            import_update_behavior: ImportUpdateBehavior::default(),
            schema_version: String::new(),
            fields: BTreeMap::new(),
        }
    }

    /// Sets the export mode.
    #[must_use]
    pub fn with_export(mut self, mode: SyncMode) -> Self {
        self.export_mode = mode;
        self
    }

    /// Sets the usage of a pool for pushes.
    #[must_use]
    pub fn with_export_pool(mut self, pool: impl Into<PoolId>, usage: PoolUsage) -> Self {
        self.export_pools.insert(pool.into(), usage);
        self
    }

    /// Sets the import mode.
    #[must_use]
    pub fn with_import(mut self, mode: SyncMode) -> Self {
        self.import_mode = mode;
        self
    }

    /// Sets the usage of a pool for pulls.
    #[must_use]
    pub fn with_import_pool(mut self, pool: impl Into<PoolId>, usage: PoolUsage) -> Self {
        self.import_pools.insert(pool.into(), usage);
        self
    }

    /// Sets the deletion flags.
    #[must_use]
    pub fn with_deletion(mut self, export: bool, import: bool, allow_local: bool) -> Self {
        self.export_deletion = export;
        self.import_deletion = import;
        self.allow_local_deletion_of_import = allow_local;
        self
    }

    /// Sets the import update behavior.
    #[must_use]
    pub fn with_update_behavior(mut self, behavior: ImportUpdateBehavior) -> Self {
        self.import_update_behavior = behavior;
        self
    }

    /// Adds a field and refreshes the stored schema version.
    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, settings: FieldSettings) -> Self {
        self.fields.insert(name.into(), settings);
        self.schema_version = self.current_schema_version();
        self
    }

    /// Overrides the stored schema version.
    #[must_use]
    pub fn with_schema_version(mut self, version: impl Into<String>) -> Self {
        self.schema_version = version.into();
        self
    }

    /// Returns true if the bundle uses the ignore handler.
    #[must_use]
    pub fn is_ignored(&self) -> bool {
        self.handler == HANDLER_IGNORE
    }

    /// Returns the push usage of a pool; unset pools are forbidden.
    #[must_use]
    pub fn export_usage(&self, pool: &PoolId) -> PoolUsage {
        self.export_pools.get(pool).copied().unwrap_or_default()
    }

    /// Returns the pull usage of a pool; unset pools are forbidden.
    #[must_use]
    pub fn import_usage(&self, pool: &PoolId) -> PoolUsage {
        self.import_pools.get(pool).copied().unwrap_or_default()
    }

    /// Returns the settings of a field.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldSettings> {
        self.fields.get(name)
    }

    /// Returns true if the field's reference list is merged on pull.
    #[must_use]
    pub fn allows_merge(&self, field: &str) -> bool {
        self.fields.get(field).is_some_and(|f| f.allow_merge)
    }

    /// Recomputes the schema version from the configured fields.
    #[must_use]
    pub fn current_schema_version(&self) -> String {
        schema_version(&self.entity_type, &self.bundle, self.fields.keys())
    }
}

/// A named synchronization policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flow {
    /// Machine name.
    pub id: FlowId,
    /// Human readable name.
    #[serde(default)]
    pub label: String,
    /// Per-bundle configuration in configuration order.
    #[serde(default)]
    pub entity_types: Vec<EntityTypeConfig>,
}

impl Flow {
    /// Creates an empty flow.
    #[must_use]
    pub fn new(id: impl Into<FlowId>) -> Self {
        let id = id.into();
        Self {
            label: id.to_string(),
            id,
            entity_types: Vec::new(),
        }
    }

    /// Adds or replaces the configuration for a bundle.
    #[must_use]
    pub fn with_entity_type(mut self, config: EntityTypeConfig) -> Self {
        self.entity_types
            .retain(|c| !(c.entity_type == config.entity_type && c.bundle == config.bundle));
        self.entity_types.push(config);
        self
    }

    /// Returns the configuration for a bundle.
    #[must_use]
    pub fn entity_type_config(&self, entity_type: &str, bundle: &str) -> Option<&EntityTypeConfig> {
        self.entity_types
            .iter()
            .find(|c| c.entity_type == entity_type && c.bundle == bundle)
    }

    /// Returns every pool this flow references in either direction.
    #[must_use]
    pub fn pools(&self) -> Vec<PoolId> {
        let mut pools: Vec<PoolId> = self
            .entity_types
            .iter()
            .flat_map(|c| c.export_pools.keys().chain(c.import_pools.keys()))
            .cloned()
            .collect();
        pools.sort();
        pools.dedup();
        pools
    }

    /// Returns true if any bundle uses the pool in either direction.
    #[must_use]
    pub fn uses_pool(&self, pool: &PoolId) -> bool {
        self.entity_types.iter().any(|c| {
            c.export_usage(pool) != PoolUsage::Forbid || c.import_usage(pool) != PoolUsage::Forbid
        })
    }

    /// Returns the bundles that use the pool in either direction.
    #[must_use]
    pub fn entity_types_for_pool(&self, pool: &PoolId) -> Vec<&EntityTypeConfig> {
        self.entity_types
            .iter()
            .filter(|c| {
                c.export_usage(pool) != PoolUsage::Forbid
                    || c.import_usage(pool) != PoolUsage::Forbid
            })
            .collect()
    }
}
