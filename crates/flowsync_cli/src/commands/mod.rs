//! CLI command implementations.

pub mod evaluate;
pub mod inspect;
pub mod report;
pub mod reset;

use flowsync_status::{StatusStore, StoreConfig, Timestamp};
use std::path::Path;

/// Opens an existing status journal.
pub(crate) fn open_store(path: &Path) -> Result<StatusStore, Box<dyn std::error::Error>> {
    if !path.exists() {
        return Err(format!("No status journal found at {}", path.display()).into());
    }
    Ok(StatusStore::open_file(path, StoreConfig::default())?)
}

pub(crate) fn format_time(at: Option<Timestamp>) -> String {
    at.map_or_else(|| "never".to_owned(), |t| t.to_rfc3339())
}
