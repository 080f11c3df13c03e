//! Error types for policy loading.

use std::io;
use thiserror::Error;

/// Result type for policy operations.
pub type PolicyResult<T> = Result<T, PolicyError>;

/// Errors that can occur while loading or validating policy.
#[derive(Debug, Error)]
pub enum PolicyError {
    /// I/O error while reading a policy document.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The policy document is not valid JSON or does not match the schema.
    #[error("invalid policy document: {0}")]
    Parse(#[from] serde_json::Error),

    /// Two flows share the same machine name.
    #[error("duplicate flow: {id}")]
    DuplicateFlow {
        /// The duplicated flow id.
        id: String,
    },

    /// Two pools share the same machine name.
    #[error("duplicate pool: {id}")]
    DuplicatePool {
        /// The duplicated pool id.
        id: String,
    },

    /// A flow references a pool that is not defined.
    #[error("flow {flow} references unknown pool {pool}")]
    UnknownPool {
        /// The referencing flow.
        flow: String,
        /// The missing pool.
        pool: String,
    },

    /// A flow configures the same entity type and bundle twice.
    #[error("flow {flow} configures {entity_type}.{bundle} more than once")]
    DuplicateEntityType {
        /// The flow id.
        flow: String,
        /// Entity type.
        entity_type: String,
        /// Bundle.
        bundle: String,
    },

    /// An identifier is empty.
    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),
}
