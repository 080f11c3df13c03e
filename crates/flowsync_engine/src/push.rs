//! Push eligibility.

use crate::intent::EntityRef;
use flowsync_policy::{Action, Flow, PoolId, PoolUsage, Reason, ReasonSet, SyncMode};
use flowsync_status::{FlowRef, StatusStore};
use std::collections::BTreeSet;

/// Returns true if `flow` pushes bundles of this type for any of `reasons`.
///
/// With a pool, the pool must not be forbidden for the bundle.
pub fn can_push_entity_type(
    flow: &Flow,
    entity_type: &str,
    bundle: &str,
    reasons: ReasonSet,
    action: Action,
    pool: Option<&PoolId>,
) -> bool {
    let Some(config) = flow.entity_type_config(entity_type, bundle) else {
        return false;
    };
    if config.is_ignored() || config.export_mode == SyncMode::Disabled {
        return false;
    }
    if action == Action::Delete && !config.export_deletion {
        return false;
    }
    if let Some(pool) = pool {
        if config.export_usage(pool) == PoolUsage::Forbid {
            return false;
        }
    }
    reasons.admits(config.export_mode)
}

/// Push decisions that depend on an entity's status history.
#[derive(Debug, Clone, Copy)]
pub struct PushEvaluator<'a> {
    status: &'a StatusStore,
}

impl<'a> PushEvaluator<'a> {
    /// Creates an evaluator over a status store.
    pub fn new(status: &'a StatusStore) -> Self {
        Self { status }
    }

    /// Returns true if the entity may be pushed through `flow`.
    ///
    /// Without an explicit pool, an entity that was synchronized through this
    /// flow before is pinned to the pools it already has records for. If none
    /// of those pools qualifies any more the entity is evaluated as if it were
    /// new.
    pub fn can_push_entity(
        &self,
        flow: &Flow,
        entity: &EntityRef,
        reasons: ReasonSet,
        action: Action,
        pool: Option<&PoolId>,
    ) -> bool {
        let fresh = |pool: Option<&PoolId>| {
            can_push_entity_type(flow, &entity.entity_type, &entity.bundle, reasons, action, pool)
        };

        if pool.is_some() {
            return fresh(pool);
        }

        let used = self.used_pools(flow, entity);
        if used.is_empty() {
            return fresh(None);
        }
        if used.iter().any(|p| fresh(Some(p))) {
            return true;
        }

        tracing::debug!(
            entity = %entity,
            flow = %flow.id,
            "no previously used pool qualifies, evaluating as new entity"
        );
        fresh(None)
    }

    /// Returns the pools the entity is pushed to through `flow`.
    ///
    /// `force` pools are included when `include_forced` is set; `allow` pools
    /// only after an opt-in recorded on the entity's status.
    pub fn pools_to_push_to(
        &self,
        flow: &Flow,
        entity: &EntityRef,
        reason: Reason,
        action: Action,
        include_forced: bool,
    ) -> Vec<PoolId> {
        if !self.can_push_entity(flow, entity, ReasonSet::from(reason), action, None) {
            return Vec::new();
        }
        let Some(config) = flow.entity_type_config(&entity.entity_type, &entity.bundle) else {
            return Vec::new();
        };

        config
            .export_pools
            .iter()
            .filter(|(pool, usage)| match usage {
                PoolUsage::Forbid => false,
                PoolUsage::Force => include_forced,
                PoolUsage::Allow => self
                    .status
                    .is_push_enabled(&entity.status_key(&flow.id, pool), false),
            })
            .map(|(pool, _)| pool.clone())
            .collect()
    }

    fn used_pools(&self, flow: &Flow, entity: &EntityRef) -> BTreeSet<PoolId> {
        let flow_ref = FlowRef::from(&flow.id);
        self.status
            .for_entity(&entity.key())
            .into_iter()
            .filter(|s| s.key.flow == flow_ref)
            .map(|s| s.key.pool)
            .collect()
    }
}
