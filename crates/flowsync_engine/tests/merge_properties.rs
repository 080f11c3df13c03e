//! Reference list merging through pulls.

use flowsync_engine::PullRequest;
use flowsync_policy::{Action, FlowId, PoolId, Reason};
use flowsync_status::StatusKey;
use flowsync_testkit::prelude::*;
use proptest::prelude::*;

fn pull_tags(fixture: &SyncFixture, action: Action, remote: &[&str]) {
    let request = PullRequest::new(POOL, article("a1"), Reason::Automatic, action)
        .with_properties(list_props("tags", remote));
    fixture.core.pull(&request).unwrap();
}

fn tags_fixture() -> SyncFixture {
    let fixture = SyncFixture::new(merge_policy());
    fixture.handler.merge_field("tags");
    fixture
}

#[test]
fn identical_lists_are_stable() {
    let fixture = SyncFixture::new(merge_policy());
    let flow = FlowId::new("articles");
    let pool = PoolId::new(POOL);
    let list = ids(&["1", "2", "3"]);

    for _ in 0..3 {
        let merged = fixture
            .core
            .merge_reference_list(&flow, &pool, &article("a1"), "tags", &list, &list)
            .unwrap();
        assert_eq!(merged, list);
    }
}

#[test]
fn local_addition_survives_unchanged_remote() {
    let fixture = tags_fixture();
    pull_tags(&fixture, Action::Create, &["1", "2", "3"]);
    assert_eq!(fixture.handler.list("a1", "tags"), ids(&["1", "2", "3"]));

    fixture
        .handler
        .set_list("a1", "tags", ids(&["1", "2", "3", "4"]));
    pull_tags(&fixture, Action::Update, &["1", "2", "3"]);
    assert_eq!(fixture.handler.list("a1", "tags"), ids(&["1", "2", "3", "4"]));
}

#[test]
fn local_removal_is_not_undone() {
    let fixture = tags_fixture();
    pull_tags(&fixture, Action::Create, &["1", "2", "3"]);

    fixture.handler.set_list("a1", "tags", ids(&["1", "3"]));
    pull_tags(&fixture, Action::Update, &["1", "2", "3"]);
    assert_eq!(fixture.handler.list("a1", "tags"), ids(&["1", "3"]));

    // A genuinely new remote item still arrives, after its anchor.
    pull_tags(&fixture, Action::Update, &["1", "2", "2a", "3"]);
    assert_eq!(fixture.handler.list("a1", "tags"), ids(&["1", "2a", "3"]));
}

#[test]
fn pulled_references_follow_remote_removal() {
    let fixture = tags_fixture();
    pull_tags(&fixture, Action::Create, &["1", "2", "3"]);

    // Term 2 was itself pulled from the remote, so the remote owns it.
    fixture
        .status()
        .set_last_pull(
            &StatusKey::new("taxonomy_term", "2", "terms", POOL),
            Some(chrono::Utc::now()),
        )
        .unwrap();
    pull_tags(&fixture, Action::Update, &["1", "3"]);
    assert_eq!(fixture.handler.list("a1", "tags"), ids(&["1", "3"]));
}

#[test]
fn merge_history_is_stored_with_the_pull() {
    let fixture = tags_fixture();
    pull_tags(&fixture, Action::Create, &["1", "2"]);
    fixture.handler.set_list("a1", "tags", ids(&["2", "1", "x"]));
    pull_tags(&fixture, Action::Update, &["1", "2", "3"]);

    let key = StatusKey::new("node", "a1", "articles", POOL);
    let snapshot = fixture.status().merge_snapshot(&key, "tags").unwrap();
    assert_eq!(snapshot.last_overwrite_values, ids(&["1", "2", "3"]));
    assert_eq!(snapshot.last_imported_values, ids(&["2", "3", "1", "x"]));
    assert_eq!(fixture.handler.list("a1", "tags"), snapshot.last_imported_values);
}

#[test]
fn declined_pull_keeps_previous_history() {
    let fixture = tags_fixture();
    pull_tags(&fixture, Action::Create, &["1", "2"]);
    fixture.handler.deny("a1");
    pull_tags(&fixture, Action::Update, &["9"]);

    let key = StatusKey::new("node", "a1", "articles", POOL);
    let snapshot = fixture.status().merge_snapshot(&key, "tags").unwrap();
    assert_eq!(snapshot.last_overwrite_values, ids(&["1", "2"]));
}

proptest! {
    #[test]
    fn repeated_pulls_of_the_same_remote_converge(remote in reference_list_strategy(8)) {
        let fixture = tags_fixture();
        let remote: Vec<&str> = remote.iter().map(String::as_str).collect();
        pull_tags(&fixture, Action::Create, &remote);
        let first = fixture.handler.list("a1", "tags");
        pull_tags(&fixture, Action::Update, &remote);
        pull_tags(&fixture, Action::Update, &remote);
        prop_assert_eq!(fixture.handler.list("a1", "tags"), first);
    }
}
