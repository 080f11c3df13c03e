//! Error types for the sync engine.

use flowsync_policy::{FlowId, PolicyError};
use flowsync_status::{FailureReason, StatusError};
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
///
/// Policy rejections are not errors; evaluators report them as `false` or
/// `None`, and the top-level push and pull report them as outcomes.
#[derive(Debug, Error)]
pub enum SyncError {
    /// A required identifier is missing.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The status store failed.
    #[error("status store error: {0}")]
    Status(#[from] StatusError),

    /// The policy could not be loaded.
    #[error("policy error: {0}")]
    Policy(#[from] PolicyError),

    /// A flow named by the caller does not exist.
    #[error("unknown flow: {0}")]
    UnknownFlow(FlowId),

    /// A bundle references a handler that is not registered.
    #[error("no entity handler registered as '{0}'")]
    UnknownHandler(String),

    /// An entity handler failed.
    #[error("handler failed ({kind}): {message}")]
    Handler {
        /// Error kind reported by the handler.
        kind: String,
        /// Error message.
        message: String,
    },

    /// The attempt was declined by policy.
    #[error("rejected: {0}")]
    Rejected(FailureReason),
}

impl SyncError {
    /// Creates an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// Returns true for policy-expected outcomes.
    pub fn is_soft(&self) -> bool {
        matches!(self, SyncError::Rejected(reason) if reason.is_soft())
    }
}

/// Error raised by an entity handler.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct HandlerError {
    /// Short error kind, e.g. `Transport` or `InvalidField`.
    pub kind: String,
    /// Human readable message.
    pub message: String,
}

impl HandlerError {
    /// Creates a handler error.
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }
}

impl From<HandlerError> for SyncError {
    fn from(err: HandlerError) -> Self {
        SyncError::Handler {
            kind: err.kind,
            message: err.message,
        }
    }
}

/// Result type returned by entity handlers.
pub type HandlerResult<T> = Result<T, HandlerError>;
