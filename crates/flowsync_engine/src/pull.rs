//! Pull eligibility and flow selection.

use flowsync_policy::{Action, Flow, PoolId, PoolUsage, Reason, SyncMode};

/// Returns true if `flow` pulls bundles of this type for `reason`.
///
/// Disabled imports and deletions the flow does not import never pass.
/// Beyond an exact mode match:
/// - `forced` and `any` pulls pass under any enabled import mode
/// - `automatic` flows also take dependency pulls, unless `strict`
/// - `manual` flows take automatic updates and deletions, but not creates
pub fn can_pull_entity(
    flow: &Flow,
    entity_type: &str,
    bundle: &str,
    reason: Reason,
    action: Action,
    strict: bool,
) -> bool {
    let Some(config) = flow.entity_type_config(entity_type, bundle) else {
        return false;
    };
    if config.is_ignored() {
        return false;
    }
    if config.import_mode == SyncMode::Disabled {
        return false;
    }
    if action == Action::Delete && !config.import_deletion {
        return false;
    }
    if matches!(reason, Reason::Forced | Reason::Any)
        || config.import_mode.as_reason() == Some(reason)
    {
        return true;
    }
    if !strict && config.import_mode == SyncMode::Automatic && reason == Reason::AsDependency {
        return true;
    }
    config.import_mode == SyncMode::Manual
        && reason == Reason::Automatic
        && matches!(action, Action::Update | Action::Delete)
}

/// Picks the flow that pulls an entity from `pool`.
///
/// Flows are tried in configuration order. The first flow that matches
/// strictly wins. Without `strict`, the first flow that matches only
/// leniently is kept as a fallback for when no flow matches strictly.
pub fn flow_for_pool_and_entity_type<'a>(
    flows: &'a [Flow],
    pool: &PoolId,
    entity_type: &str,
    bundle: &str,
    reason: Reason,
    action: Action,
    strict: bool,
) -> Option<&'a Flow> {
    let mut fallback = None;

    for flow in flows {
        let pulls_from_pool = flow
            .entity_type_config(entity_type, bundle)
            .is_some_and(|c| c.import_usage(pool) != PoolUsage::Forbid);
        if !pulls_from_pool {
            continue;
        }
        if can_pull_entity(flow, entity_type, bundle, reason, action, true) {
            return Some(flow);
        }
        if !strict
            && fallback.is_none()
            && can_pull_entity(flow, entity_type, bundle, reason, action, false)
        {
            fallback = Some(flow);
        }
    }

    fallback
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowsync_policy::{EntityTypeConfig, HANDLER_IGNORE};

    fn flow(id: &str, mode: SyncMode) -> Flow {
        Flow::new(id).with_entity_type(
            EntityTypeConfig::new("node", "article", "default")
                .with_import(mode)
                .with_import_pool("content", PoolUsage::Force),
        )
    }

    #[test]
    fn forced_bypasses_mode() {
        let f = flow("f", SyncMode::AsDependency);
        assert!(can_pull_entity(&f, "node", "article", Reason::Forced, Action::Create, true));
        assert!(!can_pull_entity(&f, "node", "article", Reason::Manual, Action::Create, false));

        let disabled = flow("d", SyncMode::Disabled);
        assert!(!can_pull_entity(&disabled, "node", "article", Reason::Forced, Action::Create, false));

        let ignored = Flow::new("g").with_entity_type(EntityTypeConfig::new("node", "article", HANDLER_IGNORE));
        assert!(!can_pull_entity(&ignored, "node", "article", Reason::Forced, Action::Create, false));
    }

    #[test]
    fn automatic_covers_dependencies_unless_strict() {
        let f = flow("f", SyncMode::Automatic);
        assert!(can_pull_entity(&f, "node", "article", Reason::AsDependency, Action::Create, false));
        assert!(!can_pull_entity(&f, "node", "article", Reason::AsDependency, Action::Create, true));
    }

    #[test]
    fn manual_takes_automatic_updates_but_not_creates() {
        let mut config = flow("f", SyncMode::Manual).entity_types[0].clone();
        config.import_deletion = true;
        let f = Flow::new("f").with_entity_type(config);

        assert!(!can_pull_entity(&f, "node", "article", Reason::Automatic, Action::Create, false));
        assert!(can_pull_entity(&f, "node", "article", Reason::Automatic, Action::Update, false));
        assert!(can_pull_entity(&f, "node", "article", Reason::Automatic, Action::Delete, true));
        assert!(can_pull_entity(&f, "node", "article", Reason::Manual, Action::Create, true));
    }

    #[test]
    fn delete_requires_import_deletion() {
        let f = flow("f", SyncMode::Automatic);
        assert!(!can_pull_entity(&f, "node", "article", Reason::Automatic, Action::Delete, false));
        assert!(!can_pull_entity(&f, "node", "article", Reason::Forced, Action::Delete, false));
        assert!(!can_pull_entity(&f, "node", "article", Reason::Any, Action::Delete, false));
    }

    #[test]
    fn flows_not_pulling_from_pool_are_skipped() {
        let flows = vec![flow("f", SyncMode::Automatic)];
        assert!(flow_for_pool_and_entity_type(
            &flows,
            &PoolId::new("other"),
            "node",
            "article",
            Reason::Automatic,
            Action::Create,
            false
        )
        .is_none());
    }

    #[test]
    fn strict_lookup_ignores_lenient_matches() {
        let flows = vec![flow("auto", SyncMode::Automatic)];
        let pool = PoolId::new("content");
        let lenient = flow_for_pool_and_entity_type(
            &flows, &pool, "node", "article", Reason::AsDependency, Action::Create, false,
        );
        assert_eq!(lenient.map(|f| f.id.as_str()), Some("auto"));
        let strict = flow_for_pool_and_entity_type(
            &flows, &pool, "node", "article", Reason::AsDependency, Action::Create, true,
        );
        assert!(strict.is_none());
    }
}
