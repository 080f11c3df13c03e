//! Pull flow selection, import behaviours and status bookkeeping.

use flowsync_engine::{PullOutcome, PullRequest};
use flowsync_policy::{
    Action, EntityTypeConfig, FieldSettings, Flow, FlowId, ImportUpdateBehavior, InMemoryPolicy,
    PolicyMatrix, Pool, PoolId, PoolUsage, Reason, SyncMode,
};
use flowsync_status::{
    Direction, FailureQuery, FailureReason, FlagScope, FlowRef, ParentLink, StatusFlag, StatusKey,
};
use flowsync_testkit::prelude::*;

fn key(entity_type: &str, id: &str) -> StatusKey {
    StatusKey::new(entity_type, id, "articles", POOL)
}

fn rejected(reason: FailureReason) -> PullOutcome {
    PullOutcome::Rejected { reason }
}

fn pulled(flow: &str) -> PullOutcome {
    PullOutcome::Pulled {
        flow: FlowId::new(flow),
    }
}

/// Flow `b` imports images automatically and comes first; flow `a` imports
/// `a_bundle` only as a dependency.
fn tie_break_policy(a_bundle: &str) -> InMemoryPolicy {
    let importing = |bundle: &str, mode: SyncMode| {
        EntityTypeConfig::new("media", bundle, HANDLER)
            .with_import(mode)
            .with_import_pool(POOL, PoolUsage::Force)
    };
    InMemoryPolicy::new()
        .with_pool(Pool::new(POOL))
        .with_flow(Flow::new("b").with_entity_type(importing("image", SyncMode::Automatic)))
        .with_flow(Flow::new("a").with_entity_type(importing(a_bundle, SyncMode::AsDependency)))
}

fn behavior_policy(behavior: ImportUpdateBehavior) -> InMemoryPolicy {
    InMemoryPolicy::new().with_pool(Pool::new(POOL)).with_flow(
        Flow::new("articles").with_entity_type(
            bundle("node", "article", SyncMode::Automatic).with_update_behavior(behavior),
        ),
    )
}

fn title_field() -> FieldSettings {
    FieldSettings {
        handler: "text".to_owned(),
        allow_merge: false,
        target_entity_type: None,
    }
}

fn pull(fixture: &SyncFixture, id: &str, action: Action) -> PullOutcome {
    let request = PullRequest::new(POOL, article(id), Reason::Automatic, action);
    fixture.core.pull(&request).unwrap().remove(0).outcome
}

#[test]
fn dependency_flow_wins_over_automatic_fallback() {
    let fixture = SyncFixture::new(tie_break_policy("image"));
    let flow = fixture
        .core
        .evaluate_pull(
            &PoolId::new(POOL),
            "media",
            "image",
            Reason::AsDependency,
            Action::Create,
            false,
        )
        .unwrap()
        .unwrap();
    assert_eq!(flow.id, FlowId::new("a"));
}

#[test]
fn automatic_flow_is_the_fallback() {
    let fixture = SyncFixture::new(tie_break_policy("document"));
    let pool = PoolId::new(POOL);
    let flow = fixture
        .core
        .evaluate_pull(&pool, "media", "image", Reason::AsDependency, Action::Create, false)
        .unwrap()
        .unwrap();
    assert_eq!(flow.id, FlowId::new("b"));

    let strict = fixture
        .core
        .evaluate_pull(&pool, "media", "image", Reason::AsDependency, Action::Create, true)
        .unwrap();
    assert!(strict.is_none());
}

#[test]
fn unattributed_failures_are_purged_by_a_real_pull() {
    let fixture = SyncFixture::new(simple_policy(SyncMode::Automatic));
    let entity = article("a1");

    let manual = PullRequest::new(POOL, entity.clone(), Reason::Manual, Action::Create);
    let reports = fixture.core.pull(&manual).unwrap();
    assert_eq!(reports[0].outcome, rejected(FailureReason::NoFlow));

    let elsewhere = PullRequest::new("nowhere", entity.clone(), Reason::Automatic, Action::Create);
    let reports = fixture.core.pull(&elsewhere).unwrap();
    assert_eq!(reports[0].outcome, rejected(FailureReason::UnknownPool));

    let no_flow = StatusKey::unattributed(&entity.key(), POOL);
    let unknown_pool = StatusKey::unattributed(&entity.key(), "nowhere");
    assert_eq!(
        fixture.status().why_did_pull_fail(&no_flow).unwrap().reason,
        FailureReason::NoFlow
    );
    assert!(fixture.status().did_pull_fail(&unknown_pool));
    let unattributed = fixture
        .status()
        .failures(&FailureQuery::new().flow(FlowRef::Unattributed));
    assert_eq!(unattributed.len(), 2);

    assert_eq!(pull(&fixture, "a1", Action::Create), pulled("articles"));
    assert!(fixture.status().get(&no_flow).is_none());
    assert!(fixture.status().get(&unknown_pool).is_none());
    assert!(fixture.status().last_pull(&key("node", "a1")).is_some());
}

#[test]
fn empty_pool_is_invalid() {
    let fixture = SyncFixture::new(simple_policy(SyncMode::Automatic));
    let request = PullRequest::new("", article("a1"), Reason::Automatic, Action::Create);
    assert!(fixture.core.pull(&request).is_err());
    assert!(fixture.status().is_empty());
}

#[test]
fn schema_drift_blocks_updates_but_not_deletes() {
    let policy = InMemoryPolicy::new()
        .with_pool(Pool::new(POOL))
        .with_flow(Flow::new("articles").with_entity_type(
            bundle("node", "article", SyncMode::Automatic).with_field("title", title_field()),
        ))
        .with_bundle_fields("node", "article", ["title", "body"]);
    let fixture = SyncFixture::new(policy);

    assert_eq!(
        pull(&fixture, "a1", Action::Update),
        rejected(FailureReason::DifferentSchemaVersion)
    );
    let details = fixture.status().why_did_pull_fail(&key("node", "a1")).unwrap();
    assert_eq!(details.reason, FailureReason::DifferentSchemaVersion);
    assert_eq!(details.action, Action::Update);
    assert!(fixture.handler.calls().is_empty());

    assert_eq!(pull(&fixture, "a1", Action::Delete), pulled("articles"));
    let status = fixture.status().get(&key("node", "a1")).unwrap();
    assert!(status.flag(StatusFlag::Deleted));
    assert!(!status.did_pull_fail());
}

#[test]
fn remote_schema_version_must_match() {
    let policy = InMemoryPolicy::new().with_pool(Pool::new(POOL)).with_flow(
        Flow::new("articles").with_entity_type(
            bundle("node", "article", SyncMode::Automatic).with_field("title", title_field()),
        ),
    );
    let fixture = SyncFixture::new(policy);
    let current = fixture
        .core
        .policy()
        .schema_version("node", "article")
        .unwrap();

    let stale = PullRequest::new(POOL, article("a1"), Reason::Automatic, Action::Update)
        .with_schema_version("stale");
    let reports = fixture.core.pull(&stale).unwrap();
    assert_eq!(
        reports[0].outcome,
        rejected(FailureReason::DifferentSchemaVersion)
    );

    let fresh = PullRequest::new(POOL, article("a1"), Reason::Automatic, Action::Update)
        .with_schema_version(current.clone());
    let reports = fixture.core.pull(&fresh).unwrap();
    assert_eq!(reports[0].outcome, pulled("articles"));
    assert_eq!(
        fixture.status().get(&key("node", "a1")).unwrap().schema_version,
        current
    );
}

#[test]
fn ignore_applies_creates_only() {
    let fixture = SyncFixture::new(behavior_policy(ImportUpdateBehavior::Ignore));
    assert_eq!(pull(&fixture, "a1", Action::Create), pulled("articles"));
    assert_eq!(
        pull(&fixture, "a1", Action::Update),
        rejected(FailureReason::UpdateIgnored)
    );
    assert_eq!(fixture.handler.handled(Direction::Pull).len(), 1);
}

#[test]
fn local_override_blocks_updates() {
    let fixture = SyncFixture::new(behavior_policy(ImportUpdateBehavior::ForceUnlessOverridden));
    assert_eq!(pull(&fixture, "a1", Action::Create), pulled("articles"));

    let k = key("node", "a1");
    fixture
        .status()
        .set_overridden_locally(&k, true, FlagScope::Entity)
        .unwrap();
    assert_eq!(
        pull(&fixture, "a1", Action::Update),
        rejected(FailureReason::OverriddenLocally)
    );
    assert!(fixture.status().get(&k).unwrap().flag(StatusFlag::PullFailedSoft));

    fixture
        .status()
        .set_overridden_locally(&k, false, FlagScope::Entity)
        .unwrap();
    assert_eq!(pull(&fixture, "a1", Action::Update), pulled("articles"));
    assert!(!fixture.status().did_pull_fail(&k));
}

#[test]
fn override_on_another_flow_counts() {
    let fixture = SyncFixture::new(behavior_policy(ImportUpdateBehavior::ForceUnlessOverridden));
    pull(&fixture, "a1", Action::Create);
    fixture
        .status()
        .set_overridden_locally(
            &StatusKey::new("node", "a1", "other", POOL),
            true,
            FlagScope::Individual,
        )
        .unwrap();
    assert_eq!(
        pull(&fixture, "a1", Action::Update),
        rejected(FailureReason::OverriddenLocally)
    );
}

#[test]
fn unpublished_marks_creates() {
    let fixture = SyncFixture::new(behavior_policy(ImportUpdateBehavior::Unpublished));
    pull(&fixture, "a1", Action::Create);
    pull(&fixture, "a1", Action::Update);
    let calls = fixture.handler.calls();
    assert!(calls[0].unpublished);
    assert!(!calls[1].unpublished);
}

#[test]
fn forbid_editing_locks_pulled_entities() {
    let fixture = SyncFixture::new(behavior_policy(ImportUpdateBehavior::ForceAndForbidEditing));
    let entity = article("a1");
    assert!(fixture.core.is_local_edit_allowed(&entity));

    pull(&fixture, "a1", Action::Create);
    assert!(!fixture.core.is_local_edit_allowed(&entity));

    fixture
        .status()
        .set_source_entity(&key("node", "a1"), true, FlagScope::Entity)
        .unwrap();
    assert!(fixture.core.is_local_edit_allowed(&entity));
}

#[test]
fn local_deletion_guard() {
    let policy = InMemoryPolicy::new().with_pool(Pool::new(POOL)).with_flow(
        Flow::new("articles").with_entity_type(
            bundle("node", "article", SyncMode::Automatic).with_deletion(true, true, false),
        ),
    );
    let fixture = SyncFixture::new(policy);
    let entity = article("a1");
    assert!(fixture.core.can_delete_locally(&entity));

    pull(&fixture, "a1", Action::Create);
    assert!(!fixture.core.can_delete_locally(&entity));
    assert!(fixture.core.can_delete_locally(&article("a2")));
}

#[test]
fn handler_error_on_pull_is_hard() {
    let fixture = SyncFixture::new(simple_policy(SyncMode::Automatic));
    fixture.handler.fail("a1", "InvalidField", "body too long");

    let request = PullRequest::new(POOL, article("a1"), Reason::Automatic, Action::Create);
    let err = fixture.core.pull(&request).unwrap_err();
    assert!(!err.is_soft());

    let k = key("node", "a1");
    let status = fixture.status().get(&k).unwrap();
    assert!(status.flag(StatusFlag::PullFailed));
    assert!(!status.flag(StatusFlag::PullFailedSoft));
    assert!(status.last_pull.is_none());
    assert_eq!(
        fixture.status().why_did_pull_fail(&k).unwrap().error_kind.as_deref(),
        Some("InvalidField")
    );
}

#[test]
fn dependencies_are_pulled_embedded() {
    let policy = InMemoryPolicy::new().with_pool(Pool::new(POOL)).with_flow(
        Flow::new("articles")
            .with_entity_type(bundle("node", "article", SyncMode::Automatic))
            .with_entity_type(bundle("media", "image", SyncMode::AsDependency)),
    );
    let fixture = SyncFixture::new(policy);
    fixture.handler.add_dependency("a1", media("m1"), true);

    let request = PullRequest::new(POOL, article("a1"), Reason::Automatic, Action::Create);
    let reports = fixture.core.pull(&request).unwrap();
    assert_eq!(reports.len(), 2);
    assert_eq!(reports[1].entity, media("m1"));
    assert_eq!(reports[1].outcome, pulled("articles"));

    let calls = fixture.handler.calls();
    assert_eq!(calls[1].reason, Reason::AsDependency);

    let k = key("media", "m1");
    assert!(fixture.status().is_embedded(&k, Direction::Pull));
    assert_eq!(
        fixture.status().parent(&k),
        Some(ParentLink {
            entity_type: "node".to_owned(),
            entity_id: "a1".to_owned(),
        })
    );
}

#[test]
fn delete_pull_requires_import_deletion() {
    let policy = InMemoryPolicy::new().with_pool(Pool::new(POOL)).with_flow(
        Flow::new("articles").with_entity_type(
            bundle("node", "article", SyncMode::Automatic).with_deletion(true, false, true),
        ),
    );
    let fixture = SyncFixture::new(policy);
    assert_eq!(
        pull(&fixture, "a1", Action::Delete),
        rejected(FailureReason::NoFlow)
    );
}

#[test]
fn forced_pull_respects_import_deletion() {
    let policy = InMemoryPolicy::new().with_pool(Pool::new(POOL)).with_flow(
        Flow::new("articles").with_entity_type(
            bundle("node", "article", SyncMode::Manual).with_deletion(true, false, true),
        ),
    );
    let fixture = SyncFixture::new(policy);

    for reason in [Reason::Forced, Reason::Any] {
        let request = PullRequest::new(POOL, article("a1"), reason, Action::Delete);
        let outcome = fixture.core.pull(&request).unwrap().remove(0).outcome;
        assert_eq!(outcome, rejected(FailureReason::NoFlow));
    }
    assert!(fixture.handler.handled(Direction::Pull).is_empty());

    // The same flow still takes a forced create.
    let request = PullRequest::new(POOL, article("a1"), Reason::Forced, Action::Create);
    let outcome = fixture.core.pull(&request).unwrap().remove(0).outcome;
    assert_eq!(outcome, pulled("articles"));
}

#[test]
fn forced_pull_skips_disabled_imports() {
    let policy = InMemoryPolicy::new().with_pool(Pool::new(POOL)).with_flow(
        Flow::new("articles").with_entity_type(
            bundle("node", "article", SyncMode::Automatic).with_import(SyncMode::Disabled),
        ),
    );
    let fixture = SyncFixture::new(policy);

    let request = PullRequest::new(POOL, article("a1"), Reason::Forced, Action::Create);
    let outcome = fixture.core.pull(&request).unwrap().remove(0).outcome;
    assert_eq!(outcome, rejected(FailureReason::NoFlow));
    assert!(fixture
        .core
        .evaluate_pull(&PoolId::new(POOL), "node", "article", Reason::Forced, Action::Create, false)
        .unwrap()
        .is_none());
    assert!(fixture.handler.handled(Direction::Pull).is_empty());
}
