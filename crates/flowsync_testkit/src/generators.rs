//! Property-based test generators using proptest.

use flowsync_engine::EntityRef;
use flowsync_policy::{Action, Reason, SyncMode};
use flowsync_status::{StatusFlag, StatusFlags};
use proptest::prelude::*;

/// Strategy for a single status flag.
pub fn status_flag_strategy() -> impl Strategy<Value = StatusFlag> {
    prop::sample::select(StatusFlag::ALL.to_vec())
}

/// Strategy for flag sets using only defined bits.
pub fn status_flags_strategy() -> impl Strategy<Value = StatusFlags> {
    prop::collection::vec(status_flag_strategy(), 0..8)
        .prop_map(|flags| flags.into_iter().collect())
}

/// Strategy for reference ids drawn from a small alphabet, so lists
/// overlap often.
pub fn reference_id_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-h][0-2]?").expect("Invalid regex")
}

/// Strategy for reference lists without duplicates.
pub fn reference_list_strategy(max_len: usize) -> impl Strategy<Value = Vec<String>> {
    prop::collection::btree_set(reference_id_strategy(), 0..=max_len)
        .prop_flat_map(|set| Just(set.into_iter().collect::<Vec<_>>()).prop_shuffle())
}

/// Strategy for valid `node.article` entities.
pub fn article_strategy() -> impl Strategy<Value = EntityRef> {
    prop::string::string_regex("[a-z0-9]{1,12}")
        .expect("Invalid regex")
        .prop_map(|id| EntityRef::new("node", "article", id))
}

/// Strategy for push and pull reasons.
pub fn reason_strategy() -> impl Strategy<Value = Reason> {
    prop_oneof![
        Just(Reason::Automatic),
        Just(Reason::Manual),
        Just(Reason::AsDependency),
        Just(Reason::Forced),
        Just(Reason::Any),
    ]
}

/// Strategy for actions.
pub fn action_strategy() -> impl Strategy<Value = Action> {
    prop_oneof![Just(Action::Create), Just(Action::Update), Just(Action::Delete)]
}

/// Strategy for sync modes.
pub fn sync_mode_strategy() -> impl Strategy<Value = SyncMode> {
    prop_oneof![
        Just(SyncMode::Disabled),
        Just(SyncMode::Automatic),
        Just(SyncMode::Manual),
        Just(SyncMode::AsDependency),
    ]
}
