//! Named status flags and their on-disk bitmask.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A named boolean of a status record.
///
/// Bit values are part of the journal format and must never be reassigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u32)]
pub enum StatusFlag {
    /// Reserved for entities cloned from a synchronized entity.
    UnusedCloned = 0x0000_0001,
    /// The entity was deleted through synchronization.
    Deleted = 0x0000_0002,
    /// An editor explicitly enabled pushing to this pool.
    UserEnabledPush = 0x0000_0004,
    /// A pulled entity was overridden locally.
    EditOverride = 0x0000_0008,
    /// This site is the authoritative source of the entity.
    IsSourceEntity = 0x0000_0010,
    /// Pushing to an `allow` pool is enabled.
    PushEnabled = 0x0000_0020,
    /// Pushing to an `allow` pool is enabled because a parent was pushed there.
    DependencyPushEnabled = 0x0000_0040,
    /// The last push time was reset.
    LastPushReset = 0x0000_0080,
    /// The last pull time was reset.
    LastPullReset = 0x0000_0100,
    /// The last push failed unexpectedly.
    PushFailed = 0x0000_0200,
    /// The last pull failed unexpectedly.
    PullFailed = 0x0000_0400,
    /// The entity was pushed embedded in its parent.
    PushedEmbedded = 0x0000_0800,
    /// The entity was pulled embedded in its parent.
    PulledEmbedded = 0x0000_1000,
    /// The last pull was declined by policy.
    PullFailedSoft = 0x0000_2000,
    /// The last push was declined by policy.
    PushFailedSoft = 0x0000_4000,
}

impl StatusFlag {
    /// Every flag in bit order.
    pub const ALL: [StatusFlag; 15] = [
        StatusFlag::UnusedCloned,
        StatusFlag::Deleted,
        StatusFlag::UserEnabledPush,
        StatusFlag::EditOverride,
        StatusFlag::IsSourceEntity,
        StatusFlag::PushEnabled,
        StatusFlag::DependencyPushEnabled,
        StatusFlag::LastPushReset,
        StatusFlag::LastPullReset,
        StatusFlag::PushFailed,
        StatusFlag::PullFailed,
        StatusFlag::PushedEmbedded,
        StatusFlag::PulledEmbedded,
        StatusFlag::PullFailedSoft,
        StatusFlag::PushFailedSoft,
    ];

    /// Returns the bit of this flag.
    #[must_use]
    pub const fn bit(self) -> u32 {
        self as u32
    }

    /// Returns the stable name of this flag.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            StatusFlag::UnusedCloned => "unused_cloned",
            StatusFlag::Deleted => "deleted",
            StatusFlag::UserEnabledPush => "user_enabled_push",
            StatusFlag::EditOverride => "edit_override",
            StatusFlag::IsSourceEntity => "is_source_entity",
            StatusFlag::PushEnabled => "push_enabled",
            StatusFlag::DependencyPushEnabled => "dependency_push_enabled",
            StatusFlag::LastPushReset => "last_push_reset",
            StatusFlag::LastPullReset => "last_pull_reset",
            StatusFlag::PushFailed => "push_failed",
            StatusFlag::PullFailed => "pull_failed",
            StatusFlag::PushedEmbedded => "pushed_embedded",
            StatusFlag::PulledEmbedded => "pulled_embedded",
            StatusFlag::PullFailedSoft => "pull_failed_soft",
            StatusFlag::PushFailedSoft => "push_failed_soft",
        }
    }
}

impl fmt::Display for StatusFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The set of flags of one status record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatusFlags(u32);

impl StatusFlags {
    /// The empty set.
    #[must_use]
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Builds a set from a raw bitmask, dropping unknown bits.
    #[must_use]
    pub fn from_bits_truncate(bits: u32) -> Self {
        let known = StatusFlag::ALL.iter().fold(0, |acc, f| acc | f.bit());
        Self(bits & known)
    }

    /// Returns the raw bitmask.
    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Returns true if the flag is set.
    #[must_use]
    pub const fn contains(self, flag: StatusFlag) -> bool {
        self.0 & flag.bit() != 0
    }

    /// Sets the flag.
    pub fn insert(&mut self, flag: StatusFlag) {
        self.0 |= flag.bit();
    }

    /// Clears the flag.
    pub fn remove(&mut self, flag: StatusFlag) {
        self.0 &= !flag.bit();
    }

    /// Sets or clears the flag.
    pub fn set(&mut self, flag: StatusFlag, value: bool) {
        if value {
            self.insert(flag);
        } else {
            self.remove(flag);
        }
    }

    /// Returns true if no flag is set.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Iterates over the flags that are set.
    pub fn iter(self) -> impl Iterator<Item = StatusFlag> {
        StatusFlag::ALL.into_iter().filter(move |f| self.contains(*f))
    }
}

impl FromIterator<StatusFlag> for StatusFlags {
    fn from_iter<T: IntoIterator<Item = StatusFlag>>(iter: T) -> Self {
        let mut flags = Self::empty();
        for flag in iter {
            flags.insert(flag);
        }
        flags
    }
}

impl fmt::Display for StatusFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.iter().map(StatusFlag::name).collect();
        f.write_str(&names.join("|"))
    }
}
