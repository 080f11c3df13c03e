//! The status record.

use crate::data::{FailureDetails, StatusData};
use crate::flags::{StatusFlag, StatusFlags};
use crate::key::StatusKey;
use crate::Timestamp;
use serde::{Deserialize, Serialize};

/// Synchronization history of one entity under one flow and pool.
///
/// Methods on this type only touch the record itself. Cross-record effects
/// such as cascading flags and purging unattributed records live on
/// [`crate::StatusStore`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityStatus {
    /// Record identity.
    pub key: StatusKey,
    /// Flag bitmask.
    pub flags: StatusFlags,
    /// Time of the last successful push.
    pub last_push: Option<Timestamp>,
    /// Time of the last successful pull.
    pub last_pull: Option<Timestamp>,
    /// Schema version of the bundle at the last sync.
    #[serde(default)]
    pub schema_version: String,
    /// Per-purpose metadata.
    #[serde(default)]
    pub data: StatusData,
}

impl EntityStatus {
    /// Creates an empty record.
    #[must_use]
    pub fn new(key: StatusKey) -> Self {
        Self {
            key,
            flags: StatusFlags::empty(),
            last_push: None,
            last_pull: None,
            schema_version: String::new(),
            data: StatusData::default(),
        }
    }

    /// Returns true if the flag is set.
    #[must_use]
    pub fn flag(&self, flag: StatusFlag) -> bool {
        self.flags.contains(flag)
    }

    /// Sets or clears a flag.
    pub fn set_flag(&mut self, flag: StatusFlag, value: bool) {
        self.flags.set(flag, value);
    }

    /// Records a successful push, or resets the push time.
    ///
    /// A timestamp clears the push failure state and the reset marker.
    /// `None` sets the reset marker instead.
    pub fn set_last_push(&mut self, at: Option<Timestamp>) {
        match at {
            Some(ts) => {
                self.last_push = Some(ts);
                self.flags.remove(StatusFlag::PushFailed);
                self.flags.remove(StatusFlag::PushFailedSoft);
                self.flags.remove(StatusFlag::LastPushReset);
                self.data.push_failure = None;
            }
            None => {
                self.flags.insert(StatusFlag::LastPushReset);
                self.last_push = None;
            }
        }
    }

    /// Records a successful pull, or resets the pull time.
    pub fn set_last_pull(&mut self, at: Option<Timestamp>) {
        match at {
            Some(ts) => {
                self.last_pull = Some(ts);
                self.flags.remove(StatusFlag::PullFailed);
                self.flags.remove(StatusFlag::PullFailedSoft);
                self.flags.remove(StatusFlag::LastPullReset);
                self.data.pull_failure = None;
            }
            None => {
                self.flags.insert(StatusFlag::LastPullReset);
                self.last_pull = None;
            }
        }
    }

    /// Sets or clears the push failure state.
    ///
    /// Details are stored only when setting. Clearing removes both the
    /// soft and hard flags and any stored details.
    pub fn set_push_failed(&mut self, failed: bool, soft: bool, details: Option<FailureDetails>) {
        if failed {
            self.flags.set(StatusFlag::PushFailedSoft, soft);
            self.flags.set(StatusFlag::PushFailed, !soft);
            if details.is_some() {
                self.data.push_failure = details;
            }
        } else {
            self.flags.remove(StatusFlag::PushFailed);
            self.flags.remove(StatusFlag::PushFailedSoft);
            self.data.push_failure = None;
        }
    }

    /// Sets or clears the pull failure state.
    pub fn set_pull_failed(&mut self, failed: bool, soft: bool, details: Option<FailureDetails>) {
        if failed {
            self.flags.set(StatusFlag::PullFailedSoft, soft);
            self.flags.set(StatusFlag::PullFailed, !soft);
            if details.is_some() {
                self.data.pull_failure = details;
            }
        } else {
            self.flags.remove(StatusFlag::PullFailed);
            self.flags.remove(StatusFlag::PullFailedSoft);
            self.data.pull_failure = None;
        }
    }

    /// Returns true if the last push failed, softly or hard.
    #[must_use]
    pub fn did_push_fail(&self) -> bool {
        self.flag(StatusFlag::PushFailed) || self.flag(StatusFlag::PushFailedSoft)
    }

    /// Returns true if the last pull failed, softly or hard.
    #[must_use]
    pub fn did_pull_fail(&self) -> bool {
        self.flag(StatusFlag::PullFailed) || self.flag(StatusFlag::PullFailedSoft)
    }

    /// Returns true if pushing to an `allow` pool was opted into.
    #[must_use]
    pub fn is_push_enabled(&self, explicit_only: bool) -> bool {
        if explicit_only {
            return self.flag(StatusFlag::PushEnabled);
        }
        self.flag(StatusFlag::PushEnabled) || self.flag(StatusFlag::DependencyPushEnabled)
    }

    /// Returns true if the record carries no history at all.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.flags.is_empty()
            && self.last_push.is_none()
            && self.last_pull.is_none()
            && self.schema_version.is_empty()
            && self.data.is_empty()
    }
}
