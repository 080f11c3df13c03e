//! The status store.

use crate::config::StoreConfig;
use crate::data::{FailureDetails, MergeSnapshot, ParentLink};
use crate::error::StatusResult;
use crate::flags::StatusFlag;
use crate::journal::{decode_frames, encode_entry, FileJournal, JournalBackend, JournalEntry, MemoryJournal};
use crate::key::{EntityKey, FlowRef, StatusKey};
use crate::query::{Direction, FailureEntry, FailureQuery};
use crate::record::EntityStatus;
use crate::Timestamp;
use flowsync_policy::PoolId;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::path::Path;

/// Whether an entity-level flag is read or written on one record or on
/// every record of the entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlagScope {
    /// Only the addressed record.
    Individual,
    /// Every record of the same entity, across all flows and pools.
    Entity,
}

/// Aggregated state of all records of one entity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EntitySummary {
    /// Number of status records.
    pub records: usize,
    /// Any record marks the entity as source.
    pub is_source_entity: bool,
    /// Any record marks the entity as overridden locally.
    pub overridden_locally: bool,
    /// Any record marks the entity as deleted.
    pub deleted: bool,
    /// Latest push over all records.
    pub last_push: Option<Timestamp>,
    /// Latest pull over all records.
    pub last_pull: Option<Timestamp>,
    /// Records whose last push failed.
    pub push_failures: usize,
    /// Records whose last pull failed.
    pub pull_failures: usize,
}

impl EntitySummary {
    fn from_records<'a>(records: impl Iterator<Item = &'a EntityStatus>) -> Self {
        let mut summary = Self::default();
        for status in records {
            summary.records += 1;
            summary.is_source_entity |= status.flag(StatusFlag::IsSourceEntity);
            summary.overridden_locally |= status.flag(StatusFlag::EditOverride);
            summary.deleted |= status.flag(StatusFlag::Deleted);
            summary.last_push = summary.last_push.max(status.last_push);
            summary.last_pull = summary.last_pull.max(status.last_pull);
            summary.push_failures += usize::from(status.did_push_fail());
            summary.pull_failures += usize::from(status.did_pull_fail());
        }
        summary
    }
}

type Records = BTreeMap<StatusKey, EntityStatus>;

/// Durable store of status records.
///
/// # Concurrency
///
/// Writes hold the record lock for the whole read-modify-write, so mutations
/// of one record never interleave. Cascading writes hold it across every
/// record of the entity and return only after all of them are journaled.
///
/// # Durability
///
/// Each mutation is appended to the journal before it becomes visible. If
/// the append fails the in-memory state is left untouched.
pub struct StatusStore {
    config: StoreConfig,
    records: RwLock<Records>,
    journal: Mutex<Box<dyn JournalBackend>>,
    summaries: RwLock<HashMap<EntityKey, EntitySummary>>,
}

impl fmt::Debug for StatusStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatusStore")
            .field("config", &self.config)
            .field("records", &self.records.read().len())
            .finish_non_exhaustive()
    }
}

impl StatusStore {
    /// Creates an empty store backed by memory.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            config: StoreConfig::default().sync_on_write(false),
            records: RwLock::new(BTreeMap::new()),
            journal: Mutex::new(Box::new(MemoryJournal::new())),
            summaries: RwLock::new(HashMap::new()),
        }
    }

    /// Opens a store over a journal, replaying its contents.
    ///
    /// A torn final frame is cut off.
    ///
    /// # Errors
    ///
    /// Returns `Corrupted` if a frame before the tail is damaged, or an I/O
    /// error.
    pub fn open(config: StoreConfig, mut journal: Box<dyn JournalBackend>) -> StatusResult<Self> {
        let bytes = journal.read_all()?;
        let replay = decode_frames(&bytes)?;

        if replay.valid_len < bytes.len() as u64 {
            tracing::warn!(
                valid = replay.valid_len,
                size = bytes.len(),
                "truncating torn status journal tail"
            );
            journal.truncate(replay.valid_len)?;
        }

        let mut records = BTreeMap::new();
        for entry in replay.entries {
            match entry {
                JournalEntry::Put(status) => {
                    records.insert(status.key.clone(), status);
                }
                JournalEntry::Delete(key) => {
                    records.remove(&key);
                }
            }
        }

        tracing::debug!(records = records.len(), "opened status store");

        Ok(Self {
            config,
            records: RwLock::new(records),
            journal: Mutex::new(journal),
            summaries: RwLock::new(HashMap::new()),
        })
    }

    /// Opens a store over a locked journal file.
    ///
    /// # Errors
    ///
    /// Returns `Locked` if another process has the journal open.
    pub fn open_file(path: &Path, config: StoreConfig) -> StatusResult<Self> {
        let journal = FileJournal::open(path)?;
        Self::open(config, Box::new(journal))
    }

    /// Returns the store configuration.
    #[must_use]
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Returns the number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Returns true if the store holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    // ------------------------------------------------------------------
    // Generic access
    // ------------------------------------------------------------------

    /// Returns a record.
    #[must_use]
    pub fn get(&self, key: &StatusKey) -> Option<EntityStatus> {
        self.records.read().get(key).cloned()
    }

    /// Returns every record.
    #[must_use]
    pub fn all(&self) -> Vec<EntityStatus> {
        self.records.read().values().cloned().collect()
    }

    /// Returns every record of an entity.
    #[must_use]
    pub fn for_entity(&self, entity: &EntityKey) -> Vec<EntityStatus> {
        let records = self.records.read();
        entity_range(&records, entity).cloned().collect()
    }

    /// Returns every record of a flow.
    #[must_use]
    pub fn for_flow(&self, flow: &FlowRef) -> Vec<EntityStatus> {
        self.records
            .read()
            .values()
            .filter(|s| &s.key.flow == flow)
            .cloned()
            .collect()
    }

    /// Returns every record of a pool.
    #[must_use]
    pub fn for_pool(&self, pool: &PoolId) -> Vec<EntityStatus> {
        self.records
            .read()
            .values()
            .filter(|s| &s.key.pool == pool)
            .cloned()
            .collect()
    }

    /// Reads, mutates and writes back one record, creating it if missing.
    ///
    /// Nothing is written if the mutation leaves the record unchanged.
    ///
    /// # Errors
    ///
    /// Returns `InvalidKey` for empty identifiers or a journal error.
    pub fn update<R>(
        &self,
        key: &StatusKey,
        f: impl FnOnce(&mut EntityStatus) -> R,
    ) -> StatusResult<R> {
        key.validate()?;
        let mut records = self.records.write();
        let (status, out) = mutate(&records, key, f);
        if let Some(status) = status {
            self.commit(&mut records, vec![JournalEntry::Put(status)])?;
        }
        Ok(out)
    }

    /// Applies `f` to every existing record of an entity as one journal
    /// append. Returns the number of records that changed.
    ///
    /// # Errors
    ///
    /// Returns `InvalidKey` for empty identifiers or a journal error.
    pub fn update_entity(
        &self,
        entity: &EntityKey,
        mut f: impl FnMut(&mut EntityStatus),
    ) -> StatusResult<usize> {
        entity.validate()?;
        let mut records = self.records.write();
        let entries: Vec<JournalEntry> = entity_range(&records, entity)
            .filter_map(|before| {
                let mut after = before.clone();
                f(&mut after);
                (after != *before).then_some(JournalEntry::Put(after))
            })
            .collect();
        let changed = entries.len();
        self.commit(&mut records, entries)?;
        Ok(changed)
    }

    /// Deletes a record. Returns false if it did not exist.
    ///
    /// # Errors
    ///
    /// Returns a journal error.
    pub fn remove(&self, key: &StatusKey) -> StatusResult<bool> {
        let mut records = self.records.write();
        if !records.contains_key(key) {
            return Ok(false);
        }
        self.commit(&mut records, vec![JournalEntry::Delete(key.clone())])?;
        Ok(true)
    }

    // ------------------------------------------------------------------
    // Timestamps
    // ------------------------------------------------------------------

    /// Returns the last push time of a record.
    #[must_use]
    pub fn last_push(&self, key: &StatusKey) -> Option<Timestamp> {
        self.records.read().get(key).and_then(|s| s.last_push)
    }

    /// Returns the last pull time of a record.
    #[must_use]
    pub fn last_pull(&self, key: &StatusKey) -> Option<Timestamp> {
        self.records.read().get(key).and_then(|s| s.last_pull)
    }

    /// Records a successful push, or resets the push time with `None`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidKey` or a journal error.
    pub fn set_last_push(&self, key: &StatusKey, at: Option<Timestamp>) -> StatusResult<()> {
        self.update(key, |s| s.set_last_push(at))
    }

    /// Records a successful pull, or resets the pull time with `None`.
    ///
    /// A successful pull under a configured flow also deletes the entity's
    /// unattributed records in the same journal append.
    ///
    /// # Errors
    ///
    /// Returns `InvalidKey` or a journal error.
    pub fn set_last_pull(&self, key: &StatusKey, at: Option<Timestamp>) -> StatusResult<()> {
        self.apply_pull(key, at, |_| ())
    }

    /// Applies `f` to the record and sets its pull time in one journal
    /// append, together with purging the entity's unattributed records.
    ///
    /// # Errors
    ///
    /// Returns `InvalidKey` for empty identifiers or a journal error.
    pub fn record_pull<R>(
        &self,
        key: &StatusKey,
        at: Timestamp,
        f: impl FnOnce(&mut EntityStatus) -> R,
    ) -> StatusResult<R> {
        self.apply_pull(key, Some(at), f)
    }

    fn apply_pull<R>(
        &self,
        key: &StatusKey,
        at: Option<Timestamp>,
        f: impl FnOnce(&mut EntityStatus) -> R,
    ) -> StatusResult<R> {
        key.validate()?;
        let mut records = self.records.write();
        let (status, out) = mutate(&records, key, |s| {
            let out = f(s);
            s.set_last_pull(at);
            out
        });
        let mut entries: Vec<JournalEntry> = status.into_iter().map(JournalEntry::Put).collect();

        if at.is_some() && !key.flow.is_unattributed() {
            let obsolete: Vec<StatusKey> = entity_range(&records, &key.entity())
                .filter(|s| s.key.flow.is_unattributed())
                .map(|s| s.key.clone())
                .collect();
            if !obsolete.is_empty() {
                tracing::debug!(
                    entity = %key.entity(),
                    purged = obsolete.len(),
                    "purging unattributed pull records"
                );
            }
            entries.extend(obsolete.into_iter().map(JournalEntry::Delete));
        }

        self.commit(&mut records, entries)?;
        Ok(out)
    }

    // ------------------------------------------------------------------
    // Entity-level flags
    // ------------------------------------------------------------------

    /// Marks the entity as overridden locally.
    ///
    /// With [`FlagScope::Entity`] every record of the entity receives the
    /// value, and the addressed record is created if missing.
    ///
    /// # Errors
    ///
    /// Returns `InvalidKey` or a journal error.
    pub fn set_overridden_locally(
        &self,
        key: &StatusKey,
        value: bool,
        scope: FlagScope,
    ) -> StatusResult<()> {
        self.set_entity_flag(key, StatusFlag::EditOverride, value, scope)
    }

    /// Returns whether the entity is overridden locally.
    ///
    /// With [`FlagScope::Entity`] any record of the entity counts.
    #[must_use]
    pub fn is_overridden_locally(&self, key: &StatusKey, scope: FlagScope) -> bool {
        match scope {
            FlagScope::Individual => self.has_flag(key, StatusFlag::EditOverride),
            FlagScope::Entity => self.summary(&key.entity()).overridden_locally,
        }
    }

    /// Marks the entity as authored on this site.
    ///
    /// # Errors
    ///
    /// Returns `InvalidKey` or a journal error.
    pub fn set_source_entity(
        &self,
        key: &StatusKey,
        value: bool,
        scope: FlagScope,
    ) -> StatusResult<()> {
        self.set_entity_flag(key, StatusFlag::IsSourceEntity, value, scope)
    }

    /// Returns whether the entity was authored on this site.
    #[must_use]
    pub fn is_source_entity(&self, key: &StatusKey, scope: FlagScope) -> bool {
        match scope {
            FlagScope::Individual => self.has_flag(key, StatusFlag::IsSourceEntity),
            FlagScope::Entity => self.summary(&key.entity()).is_source_entity,
        }
    }

    fn set_entity_flag(
        &self,
        key: &StatusKey,
        flag: StatusFlag,
        value: bool,
        scope: FlagScope,
    ) -> StatusResult<()> {
        key.validate()?;
        let mut records = self.records.write();
        let (status, ()) = mutate(&records, key, |s| s.set_flag(flag, value));
        let mut entries: Vec<JournalEntry> = status.into_iter().map(JournalEntry::Put).collect();

        if scope == FlagScope::Entity {
            entries.extend(
                entity_range(&records, &key.entity())
                    .filter(|s| s.key != *key && s.flag(flag) != value)
                    .map(|s| {
                        let mut s = s.clone();
                        s.set_flag(flag, value);
                        JournalEntry::Put(s)
                    }),
            );
        }

        self.commit(&mut records, entries)
    }

    fn has_flag(&self, key: &StatusKey, flag: StatusFlag) -> bool {
        self.records.read().get(key).is_some_and(|s| s.flag(flag))
    }

    // ------------------------------------------------------------------
    // Failures
    // ------------------------------------------------------------------

    /// Sets or clears the push failure state.
    ///
    /// # Errors
    ///
    /// Returns `InvalidKey` or a journal error.
    pub fn set_push_failed(
        &self,
        key: &StatusKey,
        failed: bool,
        soft: bool,
        details: Option<FailureDetails>,
    ) -> StatusResult<()> {
        self.update(key, |s| s.set_push_failed(failed, soft, details))
    }

    /// Sets or clears the pull failure state.
    ///
    /// # Errors
    ///
    /// Returns `InvalidKey` or a journal error.
    pub fn set_pull_failed(
        &self,
        key: &StatusKey,
        failed: bool,
        soft: bool,
        details: Option<FailureDetails>,
    ) -> StatusResult<()> {
        self.update(key, |s| s.set_pull_failed(failed, soft, details))
    }

    /// Returns true if the last push of the record failed.
    #[must_use]
    pub fn did_push_fail(&self, key: &StatusKey) -> bool {
        self.records.read().get(key).is_some_and(EntityStatus::did_push_fail)
    }

    /// Returns true if the last pull of the record failed.
    #[must_use]
    pub fn did_pull_fail(&self, key: &StatusKey) -> bool {
        self.records.read().get(key).is_some_and(EntityStatus::did_pull_fail)
    }

    /// Returns the stored details of the last failed push.
    #[must_use]
    pub fn why_did_push_fail(&self, key: &StatusKey) -> Option<FailureDetails> {
        self.records
            .read()
            .get(key)
            .and_then(|s| s.data.push_failure.clone())
    }

    /// Returns the stored details of the last failed pull.
    #[must_use]
    pub fn why_did_pull_fail(&self, key: &StatusKey) -> Option<FailureDetails> {
        self.records
            .read()
            .get(key)
            .and_then(|s| s.data.pull_failure.clone())
    }

    /// Returns every failure matching the query, in key order.
    #[must_use]
    pub fn failures(&self, query: &FailureQuery) -> Vec<FailureEntry> {
        self.records
            .read()
            .values()
            .flat_map(|s| query.entries(s))
            .collect()
    }

    /// Counts matching failures by reason code.
    #[must_use]
    pub fn failure_counts(&self, query: &FailureQuery) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for entry in self.failures(query) {
            *counts.entry(entry.reason_code().to_owned()).or_insert(0) += 1;
        }
        counts
    }

    // ------------------------------------------------------------------
    // Push enablement, deletion and embedding
    // ------------------------------------------------------------------

    /// Opts the record into pushing to an `allow` pool.
    ///
    /// `dependency` records that the opt-in came from a parent entity;
    /// otherwise it counts as an editor choice.
    ///
    /// # Errors
    ///
    /// Returns `InvalidKey` or a journal error.
    pub fn set_push_enabled(
        &self,
        key: &StatusKey,
        enabled: bool,
        dependency: bool,
    ) -> StatusResult<()> {
        self.update(key, |s| {
            if dependency {
                s.set_flag(StatusFlag::DependencyPushEnabled, enabled);
            } else {
                s.set_flag(StatusFlag::PushEnabled, enabled);
                s.set_flag(StatusFlag::UserEnabledPush, enabled);
            }
        })
    }

    /// Returns true if the record was opted into pushing.
    ///
    /// `explicit_only` ignores opt-ins inherited from a parent.
    #[must_use]
    pub fn is_push_enabled(&self, key: &StatusKey, explicit_only: bool) -> bool {
        self.records
            .read()
            .get(key)
            .is_some_and(|s| s.is_push_enabled(explicit_only))
    }

    /// Marks the record as deleted.
    ///
    /// # Errors
    ///
    /// Returns `InvalidKey` or a journal error.
    pub fn set_deleted(&self, key: &StatusKey, deleted: bool) -> StatusResult<()> {
        self.update(key, |s| s.set_flag(StatusFlag::Deleted, deleted))
    }

    /// Returns true if the record is marked deleted.
    #[must_use]
    pub fn is_deleted(&self, key: &StatusKey) -> bool {
        self.has_flag(key, StatusFlag::Deleted)
    }

    /// Records that the entity travelled embedded in `parent`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidKey` or a journal error.
    pub fn set_embedded(
        &self,
        key: &StatusKey,
        direction: Direction,
        parent: Option<ParentLink>,
    ) -> StatusResult<()> {
        let flag = match direction {
            Direction::Push => StatusFlag::PushedEmbedded,
            Direction::Pull => StatusFlag::PulledEmbedded,
        };
        self.update(key, |s| {
            s.set_flag(flag, parent.is_some());
            s.data.parent = parent;
        })
    }

    /// Returns true if the entity was pushed or pulled embedded.
    #[must_use]
    pub fn is_embedded(&self, key: &StatusKey, direction: Direction) -> bool {
        let flag = match direction {
            Direction::Push => StatusFlag::PushedEmbedded,
            Direction::Pull => StatusFlag::PulledEmbedded,
        };
        self.has_flag(key, flag)
    }

    /// Returns the parent the entity last travelled with.
    #[must_use]
    pub fn parent(&self, key: &StatusKey) -> Option<ParentLink> {
        self.records.read().get(key).and_then(|s| s.data.parent.clone())
    }

    // ------------------------------------------------------------------
    // Data
    // ------------------------------------------------------------------

    /// Returns the hash of the last pushed payload.
    #[must_use]
    pub fn push_hash(&self, key: &StatusKey) -> Option<String> {
        self.records.read().get(key).and_then(|s| s.data.push_hash.clone())
    }

    /// Stores the hash of the last pushed payload.
    ///
    /// # Errors
    ///
    /// Returns `InvalidKey` or a journal error.
    pub fn set_push_hash(&self, key: &StatusKey, hash: Option<String>) -> StatusResult<()> {
        self.update(key, |s| s.data.push_hash = hash)
    }

    /// Returns the merge snapshot of a field.
    #[must_use]
    pub fn merge_snapshot(&self, key: &StatusKey, field: &str) -> Option<MergeSnapshot> {
        self.records
            .read()
            .get(key)
            .and_then(|s| s.data.merge.get(field).cloned())
    }

    /// Stores the merge snapshot of a field.
    ///
    /// # Errors
    ///
    /// Returns `InvalidKey` or a journal error.
    pub fn set_merge_snapshot(
        &self,
        key: &StatusKey,
        field: &str,
        snapshot: MergeSnapshot,
    ) -> StatusResult<()> {
        self.update(key, |s| {
            s.data.merge.insert(field.to_owned(), snapshot);
        })
    }

    /// Stores the schema version seen at the last sync.
    ///
    /// # Errors
    ///
    /// Returns `InvalidKey` or a journal error.
    pub fn set_schema_version(&self, key: &StatusKey, version: &str) -> StatusResult<()> {
        self.update(key, |s| version.clone_into(&mut s.schema_version))
    }

    // ------------------------------------------------------------------
    // Entity summaries
    // ------------------------------------------------------------------

    /// Returns aggregated state of an entity, cached until the next write
    /// to it.
    #[must_use]
    pub fn summary(&self, entity: &EntityKey) -> EntitySummary {
        if let Some(summary) = self.summaries.read().get(entity) {
            return summary.clone();
        }
        let records = self.records.read();
        let summary = EntitySummary::from_records(entity_range(&records, entity));
        self.summaries.write().insert(entity.clone(), summary.clone());
        summary
    }

    /// Returns the latest push of an entity over all flows and pools.
    #[must_use]
    pub fn last_push_for_entity(&self, entity: &EntityKey) -> Option<Timestamp> {
        self.summary(entity).last_push
    }

    // ------------------------------------------------------------------
    // Maintenance
    // ------------------------------------------------------------------

    /// Resets push and pull times of every record, or of one pool.
    ///
    /// Each affected record gets both reset flags and loses both times.
    /// Returns the number of affected records.
    ///
    /// # Errors
    ///
    /// Returns a journal error.
    pub fn reset_status_entities(&self, pool: Option<&PoolId>) -> StatusResult<usize> {
        let mut records = self.records.write();
        let entries: Vec<JournalEntry> = records
            .values()
            .filter(|s| pool.map_or(true, |p| &s.key.pool == p))
            .filter_map(|before| {
                let mut after = before.clone();
                after.set_last_push(None);
                after.set_last_pull(None);
                (after != *before).then_some(JournalEntry::Put(after))
            })
            .collect();
        let affected = entries.len();
        self.commit(&mut records, entries)?;
        self.summaries.write().clear();

        tracing::info!(
            pool = pool.map(PoolId::as_str),
            affected,
            "reset status entities"
        );

        if self.config.compact_on_reset && affected > 0 {
            self.compact_locked(&records)?;
        }
        Ok(affected)
    }

    /// Deletes every record of a pool. Returns the number removed.
    ///
    /// # Errors
    ///
    /// Returns a journal error.
    pub fn purge_pool(&self, pool: &PoolId) -> StatusResult<usize> {
        let mut records = self.records.write();
        let entries: Vec<JournalEntry> = records
            .keys()
            .filter(|k| &k.pool == pool)
            .cloned()
            .map(JournalEntry::Delete)
            .collect();
        let removed = entries.len();
        self.commit(&mut records, entries)?;
        tracing::info!(pool = %pool, removed, "purged pool status records");
        Ok(removed)
    }

    /// Rewrites the journal as one frame per live record.
    ///
    /// # Errors
    ///
    /// Returns a journal error.
    pub fn compact(&self) -> StatusResult<()> {
        let records = self.records.read();
        self.compact_locked(&records)
    }

    fn compact_locked(&self, records: &Records) -> StatusResult<()> {
        let mut buf = Vec::new();
        for status in records.values() {
            buf.extend(encode_entry(
                &JournalEntry::Put(status.clone()),
                self.config.max_record_size,
            )?);
        }
        let mut journal = self.journal.lock();
        let before = journal.size()?;
        journal.replace(&buf)?;
        journal.sync()?;
        tracing::debug!(before, after = buf.len(), "compacted status journal");
        Ok(())
    }

    /// Journals `entries` and then applies them.
    fn commit(&self, records: &mut Records, entries: Vec<JournalEntry>) -> StatusResult<()> {
        if entries.is_empty() {
            return Ok(());
        }

        let mut buf = Vec::new();
        for entry in &entries {
            buf.extend(encode_entry(entry, self.config.max_record_size)?);
        }
        {
            let mut journal = self.journal.lock();
            journal.append(&buf)?;
            if self.config.sync_on_write {
                journal.sync()?;
            }
        }

        let mut touched = BTreeSet::new();
        for entry in entries {
            match entry {
                JournalEntry::Put(status) => {
                    touched.insert(status.key.entity());
                    records.insert(status.key.clone(), status);
                }
                JournalEntry::Delete(key) => {
                    touched.insert(key.entity());
                    records.remove(&key);
                }
            }
        }

        let mut summaries = self.summaries.write();
        for entity in &touched {
            summaries.remove(entity);
        }
        Ok(())
    }
}

fn entity_range<'a>(
    records: &'a Records,
    entity: &'a EntityKey,
) -> impl Iterator<Item = &'a EntityStatus> + 'a {
    records
        .range(StatusKey::entity_start(entity)..)
        .map(|(_, s)| s)
        .take_while(move |s| s.key.is_for(entity))
}

/// Applies `f` to a copy of the record. Returns the new record only if it
/// differs from what is stored.
fn mutate<R>(
    records: &Records,
    key: &StatusKey,
    f: impl FnOnce(&mut EntityStatus) -> R,
) -> (Option<EntityStatus>, R) {
    let before = records.get(key);
    let mut status = before
        .cloned()
        .unwrap_or_else(|| EntityStatus::new(key.clone()));
    let out = f(&mut status);
    let changed = match before {
        Some(before) => *before != status,
        None => !status.is_blank(),
    };
    (changed.then_some(status), out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::FailureReason;
    use crate::query::Severity;
    use flowsync_policy::{Action, Reason};

    fn key(flow: &str, pool: &str) -> StatusKey {
        StatusKey::new("node", "n1", flow, pool)
    }

    #[test]
    fn records_are_created_lazily() {
        let store = StatusStore::in_memory();
        assert!(store.get(&key("f", "p")).is_none());

        store.set_push_enabled(&key("f", "p"), false, false).unwrap();
        assert!(store.is_empty());

        store.set_push_enabled(&key("f", "p"), true, false).unwrap();
        assert_eq!(store.len(), 1);
        assert!(store.is_push_enabled(&key("f", "p"), true));

        store
            .update(&key("g", "p"), |s| s.schema_version = "v2".to_owned())
            .unwrap();
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn update_returns_closure_result() {
        let store = StatusStore::in_memory();
        let flags = store
            .update(&key("f", "p"), |s| {
                s.set_flag(StatusFlag::Deleted, true);
                s.flags
            })
            .unwrap();
        assert!(flags.contains(StatusFlag::Deleted));
        assert!(store.is_deleted(&key("f", "p")));
    }

    #[test]
    fn empty_identifiers_are_rejected() {
        let store = StatusStore::in_memory();
        assert!(store.set_deleted(&StatusKey::new("node", "", "f", "p"), true).is_err());
        assert!(store.is_empty());
    }

    #[test]
    fn individual_flag_does_not_cascade() {
        let store = StatusStore::in_memory();
        store.set_last_push(&key("a", "p"), Some(chrono::Utc::now())).unwrap();
        store.set_overridden_locally(&key("b", "p"), true, FlagScope::Individual).unwrap();

        assert!(store.is_overridden_locally(&key("b", "p"), FlagScope::Individual));
        assert!(!store.is_overridden_locally(&key("a", "p"), FlagScope::Individual));
        assert!(store.is_overridden_locally(&key("a", "p"), FlagScope::Entity));
    }

    #[test]
    fn entity_scope_cascades_to_siblings_only() {
        let store = StatusStore::in_memory();
        store.set_last_push(&key("a", "p"), Some(chrono::Utc::now())).unwrap();
        store.set_last_push(&key("b", "q"), Some(chrono::Utc::now())).unwrap();
        store
            .set_last_push(&StatusKey::new("node", "other", "a", "p"), Some(chrono::Utc::now()))
            .unwrap();

        store.set_source_entity(&key("c", "p"), true, FlagScope::Entity).unwrap();

        for k in [key("a", "p"), key("b", "q"), key("c", "p")] {
            assert!(store.is_source_entity(&k, FlagScope::Individual), "{k}");
        }
        assert!(!store.is_source_entity(
            &StatusKey::new("node", "other", "a", "p"),
            FlagScope::Entity
        ));

        store.set_source_entity(&key("a", "p"), false, FlagScope::Entity).unwrap();
        assert!(!store.is_source_entity(&key("b", "q"), FlagScope::Entity));
    }

    #[test]
    fn successful_pull_purges_unattributed_records() {
        let store = StatusStore::in_memory();
        let entity = EntityKey::new("node", "n1");
        let sentinel = StatusKey::unattributed(&entity, "p");
        store
            .set_pull_failed(
                &sentinel,
                true,
                true,
                Some(FailureDetails::soft(FailureReason::NoFlow, Action::Create, Reason::Automatic)),
            )
            .unwrap();
        assert_eq!(store.for_entity(&entity).len(), 1);

        store.set_last_pull(&key("f", "p"), Some(chrono::Utc::now())).unwrap();
        let records = store.for_entity(&entity);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].key, key("f", "p"));
    }

    #[test]
    fn record_pull_writes_changes_and_pull_time_together() {
        let journal = MemoryJournal::new();
        let store = StatusStore::open(StoreConfig::default(), Box::new(journal.clone())).unwrap();
        let entity = EntityKey::new("node", "n1");
        let sentinel = StatusKey::unattributed(&entity, "p");
        store
            .set_pull_failed(
                &sentinel,
                true,
                true,
                Some(FailureDetails::soft(FailureReason::NoFlow, Action::Create, Reason::Automatic)),
            )
            .unwrap();
        store
            .set_pull_failed(&key("f", "p"), true, false, None)
            .unwrap();
        let before = journal.data().len();

        let at = chrono::Utc::now();
        let out = store
            .record_pull(&key("f", "p"), at, |s| {
                s.set_flag(StatusFlag::Deleted, true);
                7
            })
            .unwrap();
        assert_eq!(out, 7);

        let record = store.get(&key("f", "p")).unwrap();
        assert_eq!(record.last_pull, Some(at));
        assert!(record.flag(StatusFlag::Deleted));
        assert!(!record.flag(StatusFlag::PullFailed));
        assert_eq!(store.for_entity(&entity).len(), 1);

        let written = decode_frames(&journal.data()[before..]).unwrap().entries;
        assert_eq!(written.len(), 2);
        match &written[0] {
            JournalEntry::Put(status) => {
                assert_eq!(status.last_pull, Some(at));
                assert!(status.flag(StatusFlag::Deleted));
            }
            other => panic!("expected a put, got {other:?}"),
        }
        assert_eq!(written[1], JournalEntry::Delete(sentinel));
    }

    #[test]
    fn failed_reset_does_not_purge_unattributed_records() {
        let store = StatusStore::in_memory();
        let entity = EntityKey::new("node", "n1");
        store
            .set_pull_failed(&StatusKey::unattributed(&entity, "p"), true, true, None)
            .unwrap();
        store.set_last_pull(&key("f", "p"), None).unwrap();
        assert_eq!(store.for_entity(&entity).len(), 2);
    }

    #[test]
    fn failure_details_are_retrievable() {
        let store = StatusStore::in_memory();
        let details = FailureDetails::hard("Timeout", "remote timed out", Action::Update, Reason::Manual)
            .with_bundle("article");
        store.set_push_failed(&key("f", "p"), true, false, Some(details.clone())).unwrap();

        assert!(store.did_push_fail(&key("f", "p")));
        assert_eq!(store.why_did_push_fail(&key("f", "p")), Some(details));
        assert!(store.why_did_pull_fail(&key("f", "p")).is_none());
    }

    #[test]
    fn failure_report_filters() {
        let store = StatusStore::in_memory();
        store
            .set_push_failed(
                &key("f", "p"),
                true,
                true,
                Some(FailureDetails::soft(FailureReason::HandlerDenied, Action::Create, Reason::Automatic)),
            )
            .unwrap();
        store
            .set_pull_failed(
                &key("g", "p"),
                true,
                false,
                Some(FailureDetails::hard("Io", "disk full", Action::Update, Reason::Automatic)),
            )
            .unwrap();
        store
            .set_pull_failed(
                &key("g", "q"),
                true,
                true,
                Some(FailureDetails::soft(
                    FailureReason::DifferentSchemaVersion,
                    Action::Update,
                    Reason::Automatic,
                )),
            )
            .unwrap();

        assert_eq!(store.failures(&FailureQuery::new()).len(), 3);
        assert_eq!(
            store.failures(&FailureQuery::new().direction(Direction::Pull)).len(),
            2
        );
        let hard = store.failures(&FailureQuery::new().severity(Severity::Hard));
        assert_eq!(hard.len(), 1);
        assert_eq!(hard[0].key, key("g", "p"));
        assert_eq!(store.failures(&FailureQuery::new().text("schema")).len(), 1);
        assert_eq!(store.failures(&FailureQuery::new().pool("q")).len(), 1);

        let counts = store.failure_counts(&FailureQuery::new());
        assert_eq!(counts.get("handler_denied"), Some(&1));
        assert_eq!(counts.get("error"), Some(&1));
        assert_eq!(counts.get("different_schema_version"), Some(&1));
    }

    #[test]
    fn summary_is_invalidated_on_write() {
        let store = StatusStore::in_memory();
        let entity = EntityKey::new("node", "n1");
        assert_eq!(store.summary(&entity).records, 0);

        let at = chrono::Utc::now();
        store.set_last_push(&key("f", "p"), Some(at)).unwrap();
        let summary = store.summary(&entity);
        assert_eq!(summary.records, 1);
        assert_eq!(summary.last_push, Some(at));
        assert_eq!(store.last_push_for_entity(&entity), Some(at));
    }

    #[test]
    fn reset_can_be_scoped_to_pool() {
        let store = StatusStore::in_memory();
        let at = chrono::Utc::now();
        store.set_last_push(&key("f", "p"), Some(at)).unwrap();
        store.set_last_pull(&key("f", "q"), Some(at)).unwrap();

        let affected = store.reset_status_entities(Some(&PoolId::new("p"))).unwrap();
        assert_eq!(affected, 1);
        assert!(store.last_push(&key("f", "p")).is_none());
        assert_eq!(store.last_pull(&key("f", "q")), Some(at));
    }

    #[test]
    fn purge_pool_removes_records() {
        let store = StatusStore::in_memory();
        store.set_deleted(&key("f", "p"), true).unwrap();
        store.set_deleted(&key("f", "q"), true).unwrap();
        assert_eq!(store.purge_pool(&PoolId::new("p")).unwrap(), 1);
        assert_eq!(store.for_pool(&PoolId::new("q")).len(), 1);
        assert!(store.for_pool(&PoolId::new("p")).is_empty());
    }

    #[test]
    fn embedding_records_parent() {
        let store = StatusStore::in_memory();
        let parent = ParentLink {
            entity_type: "node".into(),
            entity_id: "parent".into(),
        };
        store.set_embedded(&key("f", "p"), Direction::Push, Some(parent.clone())).unwrap();
        assert!(store.is_embedded(&key("f", "p"), Direction::Push));
        assert!(!store.is_embedded(&key("f", "p"), Direction::Pull));
        assert_eq!(store.parent(&key("f", "p")), Some(parent));
    }

    #[test]
    fn merge_snapshots_are_per_field() {
        let store = StatusStore::in_memory();
        let snapshot = MergeSnapshot {
            last_imported_values: vec!["1".into()],
            last_overwrite_values: vec!["1".into(), "2".into()],
        };
        store.set_merge_snapshot(&key("f", "p"), "field_items", snapshot.clone()).unwrap();
        assert_eq!(store.merge_snapshot(&key("f", "p"), "field_items"), Some(snapshot));
        assert!(store.merge_snapshot(&key("f", "p"), "field_tags").is_none());
    }
}
