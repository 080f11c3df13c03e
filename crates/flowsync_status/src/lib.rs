//! # flowsync Status
//!
//! Durable per-(entity, flow, pool) synchronization status for flowsync.
//!
//! This crate provides:
//! - [`StatusFlag`] and [`StatusFlags`], the named booleans of a status record
//! - [`EntityStatus`], one record per [`StatusKey`]
//! - [`StatusData`], typed per-record metadata (failure details, merge
//!   snapshots, parent linkage, push hash)
//! - [`StatusStore`], upsert-style access with single-record locking,
//!   explicit multi-record cascades, bulk reset and failure reporting
//! - Append-only journal persistence over [`MemoryJournal`] or [`FileJournal`]
//!
//! ## Key Invariants
//!
//! - At most one record per (entity type, entity id, flow, pool)
//! - Records are created lazily on first write
//! - Unattributed records exist only for pull failures and are purged once a
//!   pull under a real flow succeeds
//! - Every mutation is journaled before the call returns
//!
//! ## Example
//!
//! ```rust
//! use flowsync_status::{FlagScope, StatusKey, StatusStore};
//!
//! let store = StatusStore::in_memory();
//! let key = StatusKey::new("node", "a1b2", "articles", "content");
//!
//! store.set_source_entity(&key, true, FlagScope::Entity).unwrap();
//! assert!(store.is_source_entity(&key, FlagScope::Individual));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod data;
mod error;
mod flags;
mod journal;
mod key;
mod query;
mod record;
mod store;

pub use config::StoreConfig;
pub use data::{FailureDetails, FailureReason, MergeSnapshot, ParentLink, StatusData};
pub use error::{StatusError, StatusResult};
pub use flags::{StatusFlag, StatusFlags};
pub use journal::{FileJournal, JournalBackend, MemoryJournal};
pub use key::{EntityKey, FlowRef, StatusKey};
pub use query::{Direction, FailureEntry, FailureQuery, Severity};
pub use record::EntityStatus;
pub use store::{EntitySummary, FlagScope, StatusStore};

/// Timestamp type used for push and pull times.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
