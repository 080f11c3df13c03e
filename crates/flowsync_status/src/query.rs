//! Failure report filters.

use crate::data::FailureDetails;
use crate::flags::StatusFlag;
use crate::key::{FlowRef, StatusKey};
use crate::record::EntityStatus;
use flowsync_policy::PoolId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Sync direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Outbound.
    Push,
    /// Inbound.
    Pull,
}

impl Direction {
    /// Returns the stable name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Direction::Push => "push",
            Direction::Pull => "pull",
        }
    }

    pub(crate) const fn hard_flag(self) -> StatusFlag {
        match self {
            Direction::Push => StatusFlag::PushFailed,
            Direction::Pull => StatusFlag::PullFailed,
        }
    }

    pub(crate) const fn soft_flag(self) -> StatusFlag {
        match self {
            Direction::Push => StatusFlag::PushFailedSoft,
            Direction::Pull => StatusFlag::PullFailedSoft,
        }
    }

    pub(crate) fn details(self, status: &EntityStatus) -> Option<&FailureDetails> {
        match self {
            Direction::Push => status.data.push_failure.as_ref(),
            Direction::Pull => status.data.pull_failure.as_ref(),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "push" => Ok(Direction::Push),
            "pull" => Ok(Direction::Pull),
            other => Err(format!("unknown direction: {other}")),
        }
    }
}

/// Failure severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Declined by policy.
    Soft,
    /// Unexpected error.
    Hard,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Soft => "soft",
            Severity::Hard => "hard",
        })
    }
}

/// One failure returned by a failure report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureEntry {
    /// Record the failure is stored on.
    pub key: StatusKey,
    /// Direction that failed.
    pub direction: Direction,
    /// Soft or hard.
    pub severity: Severity,
    /// Stored details, if any were captured.
    pub details: Option<FailureDetails>,
}

impl FailureEntry {
    /// Returns the reason code, or `unknown` when no details were stored.
    #[must_use]
    pub fn reason_code(&self) -> &'static str {
        self.details.as_ref().map_or("unknown", |d| d.reason.as_str())
    }
}

/// Filter for [`crate::StatusStore::failures`].
///
/// Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FailureQuery {
    /// Direction to report.
    pub direction: Option<Direction>,
    /// Severity to report.
    pub severity: Option<Severity>,
    /// Flow to report.
    pub flow: Option<FlowRef>,
    /// Pool to report.
    pub pool: Option<PoolId>,
    /// Substring of the stored reason code, error kind or message.
    pub text: Option<String>,
}

impl FailureQuery {
    /// Matches every failure.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restricts to one direction.
    #[must_use]
    pub fn direction(mut self, direction: Direction) -> Self {
        self.direction = Some(direction);
        self
    }

    /// Restricts to one severity.
    #[must_use]
    pub fn severity(mut self, severity: Severity) -> Self {
        self.severity = Some(severity);
        self
    }

    /// Restricts to one flow.
    #[must_use]
    pub fn flow(mut self, flow: impl Into<FlowRef>) -> Self {
        self.flow = Some(flow.into());
        self
    }

    /// Restricts to one pool.
    #[must_use]
    pub fn pool(mut self, pool: impl Into<PoolId>) -> Self {
        self.pool = Some(pool.into());
        self
    }

    /// Restricts to failures mentioning `text`.
    #[must_use]
    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// Returns the failures of `status` that match the query.
    pub(crate) fn entries(&self, status: &EntityStatus) -> Vec<FailureEntry> {
        self.matching_directions(status)
            .into_iter()
            .map(|direction| FailureEntry {
                key: status.key.clone(),
                direction,
                severity: if status.flag(direction.hard_flag()) {
                    Severity::Hard
                } else {
                    Severity::Soft
                },
                details: direction.details(status).cloned(),
            })
            .collect()
    }

    fn matching_directions(&self, status: &EntityStatus) -> Vec<Direction> {
        if self.flow.as_ref().is_some_and(|f| f != &status.key.flow) {
            return Vec::new();
        }
        if self.pool.as_ref().is_some_and(|p| p != &status.key.pool) {
            return Vec::new();
        }

        [Direction::Push, Direction::Pull]
            .into_iter()
            .filter(|d| self.direction.map_or(true, |want| want == *d))
            .filter(|d| {
                let hard = status.flag(d.hard_flag());
                let soft = status.flag(d.soft_flag());
                match self.severity {
                    None => hard || soft,
                    Some(Severity::Hard) => hard,
                    Some(Severity::Soft) => soft,
                }
            })
            .filter(|d| match &self.text {
                None => true,
                Some(text) => d.details(status).is_some_and(|det| det.mentions(text)),
            })
            .collect()
    }
}
