//! Ordered reference list merging.
//!
//! Reconciles a pulled list of reference ids with the local list when both
//! sides may have changed since the last pull. The previous pull's result and
//! raw remote list are kept in a [`MergeSnapshot`] and act as the common
//! ancestor:
//!
//! 1. Without a snapshot, or if the field does not allow merging, the remote
//!    list replaces the local one.
//! 2. Otherwise local ids are kept in local order if the remote still has
//!    them or if they are not remote-sourced.
//! 3. Remote ids that are new (absent from the previous remote list) are
//!    inserted right after the nearest preceding remote id already kept, or
//!    at the front.
//!
//! Remote ids that the previous remote list already had but the local list
//! lacks were removed locally and stay removed.

use flowsync_status::MergeSnapshot;
use std::collections::HashSet;

/// Outcome of one merge pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeResult {
    /// The new field value.
    pub merged: Vec<String>,
    /// History to persist for the next pass.
    pub snapshot: MergeSnapshot,
}

/// Merges `remote` into `local`.
///
/// `is_remote_sourced` tells whether a referenced entity came from another
/// site; local-only references survive even when the remote lacks them.
pub fn merge_reference_list<F>(
    remote: &[String],
    local: &[String],
    previous: Option<&MergeSnapshot>,
    allow_merge: bool,
    is_remote_sourced: F,
) -> MergeResult
where
    F: Fn(&str) -> bool,
{
    let merged = match previous {
        Some(previous) if allow_merge => three_way(remote, local, previous, is_remote_sourced),
        _ => remote.to_vec(),
    };

    MergeResult {
        snapshot: MergeSnapshot {
            last_imported_values: merged.clone(),
            last_overwrite_values: remote.to_vec(),
        },
        merged,
    }
}

fn three_way<F>(
    remote: &[String],
    local: &[String],
    previous: &MergeSnapshot,
    is_remote_sourced: F,
) -> Vec<String>
where
    F: Fn(&str) -> bool,
{
    let remote_set: HashSet<&str> = remote.iter().map(String::as_str).collect();
    let seen_remote: HashSet<&str> = previous
        .last_overwrite_values
        .iter()
        .map(String::as_str)
        .collect();

    let mut merged: Vec<String> = Vec::with_capacity(local.len().max(remote.len()));
    let mut kept: HashSet<&str> = HashSet::new();

    for id in local {
        if kept.contains(id.as_str()) {
            continue;
        }
        if remote_set.contains(id.as_str()) || !is_remote_sourced(id.as_str()) {
            kept.insert(id.as_str());
            merged.push(id.clone());
        }
    }

    for (i, id) in remote.iter().enumerate() {
        if kept.contains(id.as_str()) || seen_remote.contains(id.as_str()) {
            continue;
        }
        let position = remote[..i]
            .iter()
            .rev()
            .find_map(|anchor| merged.iter().position(|m| m == anchor))
            .map_or(0, |p| p + 1);
        merged.insert(position, id.clone());
        kept.insert(id.as_str());
    }

    merged
}
