//! Error types for the status store.

use std::io;
use thiserror::Error;

/// Result type for status store operations.
pub type StatusResult<T> = Result<T, StatusError>;

/// Errors that can occur in status store operations.
#[derive(Debug, Error)]
pub enum StatusError {
    /// An I/O error occurred in the journal.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A record could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(String),

    /// The journal contains a damaged frame before its tail.
    #[error("journal corrupted at offset {offset}: {message}")]
    Corrupted {
        /// Offset of the damaged frame.
        offset: u64,
        /// Description of the damage.
        message: String,
    },

    /// Another process holds the journal lock.
    #[error("status journal locked: another process has exclusive access")]
    Locked,

    /// An encoded record exceeds the configured maximum size.
    #[error("record too large: {size} bytes exceeds maximum of {max} bytes")]
    RecordTooLarge {
        /// Encoded size.
        size: usize,
        /// Configured maximum.
        max: usize,
    },

    /// A required identifier is empty.
    #[error("invalid key: {0}")]
    InvalidKey(String),
}

impl StatusError {
    /// Creates a codec error from any displayable error.
    pub fn codec(err: impl std::fmt::Display) -> Self {
        Self::Codec(err.to_string())
    }

    /// Creates a corruption error.
    pub fn corrupted(offset: u64, message: impl Into<String>) -> Self {
        Self::Corrupted {
            offset,
            message: message.into(),
        }
    }
}
