//! Typed per-record metadata.

use crate::Timestamp;
use flowsync_policy::{Action, Reason};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Why a push or pull did not happen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// The pool is not configured on this site.
    UnknownPool,
    /// No flow accepts the entity.
    NoFlow,
    /// The entity handler declined the entity.
    HandlerDenied,
    /// The bundle's field set differs between sites.
    DifferentSchemaVersion,
    /// The flow ignores updates of existing entities.
    UpdateIgnored,
    /// The entity was overridden locally and the flow respects overrides.
    OverriddenLocally,
    /// An unexpected error; see the message.
    Error,
}

impl FailureReason {
    /// Returns the stable reason code.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            FailureReason::UnknownPool => "unknown_pool",
            FailureReason::NoFlow => "no_flow",
            FailureReason::HandlerDenied => "handler_denied",
            FailureReason::DifferentSchemaVersion => "different_schema_version",
            FailureReason::UpdateIgnored => "update_ignored",
            FailureReason::OverriddenLocally => "overridden_locally",
            FailureReason::Error => "error",
        }
    }

    /// Returns true for policy-expected outcomes.
    #[must_use]
    pub const fn is_soft(self) -> bool {
        !matches!(self, FailureReason::Error)
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Details captured when a push or pull fails.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureDetails {
    /// Reason code.
    pub reason: FailureReason,
    /// Error kind for hard failures, e.g. the handler's error type.
    #[serde(default)]
    pub error_kind: Option<String>,
    /// Human readable message.
    #[serde(default)]
    pub message: String,
    /// Attempted action.
    pub action: Action,
    /// Trigger reason of the attempt.
    pub sync_reason: Reason,
    /// Bundle of the entity.
    #[serde(default)]
    pub bundle: String,
    /// When the failure was recorded.
    pub at: Timestamp,
}

impl FailureDetails {
    /// Creates details for a policy rejection.
    #[must_use]
    pub fn soft(reason: FailureReason, action: Action, sync_reason: Reason) -> Self {
        Self {
            reason,
            error_kind: None,
            message: String::new(),
            action,
            sync_reason,
            bundle: String::new(),
            at: chrono::Utc::now(),
        }
    }

    /// Creates details for an unexpected error.
    #[must_use]
    pub fn hard(
        error_kind: impl Into<String>,
        message: impl Into<String>,
        action: Action,
        sync_reason: Reason,
    ) -> Self {
        Self {
            reason: FailureReason::Error,
            error_kind: Some(error_kind.into()),
            message: message.into(),
            action,
            sync_reason,
            bundle: String::new(),
            at: chrono::Utc::now(),
        }
    }

    /// Sets the bundle.
    #[must_use]
    pub fn with_bundle(mut self, bundle: impl Into<String>) -> Self {
        self.bundle = bundle.into();
        self
    }

    /// Sets the message.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Returns true if the reason code or message contains `needle`.
    #[must_use]
    pub fn mentions(&self, needle: &str) -> bool {
        self.reason.as_str().contains(needle)
            || self.message.contains(needle)
            || self.error_kind.as_deref().is_some_and(|k| k.contains(needle))
    }
}

/// Merge history of one reference field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeSnapshot {
    /// The merged list produced by the previous pull.
    pub last_imported_values: Vec<String>,
    /// The raw remote list received by the previous pull.
    pub last_overwrite_values: Vec<String>,
}

/// The entity this one travelled with as a dependency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParentLink {
    /// Parent entity type.
    pub entity_type: String,
    /// Parent entity identity.
    pub entity_id: String,
}

/// Metadata attached to a status record, keyed by purpose.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusData {
    /// Details of the last failed push.
    pub push_failure: Option<FailureDetails>,
    /// Details of the last failed pull.
    pub pull_failure: Option<FailureDetails>,
    /// Merge snapshots per field name.
    pub merge: BTreeMap<String, MergeSnapshot>,
    /// Parent entity for embedded dependencies.
    pub parent: Option<ParentLink>,
    /// Hex SHA-256 of the last pushed payload.
    pub push_hash: Option<String>,
}

impl StatusData {
    /// Returns true if no metadata is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.push_failure.is_none()
            && self.pull_failure.is_none()
            && self.merge.is_empty()
            && self.parent.is_none()
            && self.push_hash.is_none()
    }
}
