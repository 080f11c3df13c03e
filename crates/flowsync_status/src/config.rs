//! Status store configuration.

/// Configuration for a [`crate::StatusStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Sync the journal to disk after every mutation.
    pub sync_on_write: bool,
    /// Rewrite the journal after a bulk reset.
    pub compact_on_reset: bool,
    /// Maximum encoded size of one record in bytes.
    pub max_record_size: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            sync_on_write: true,
            compact_on_reset: true,
            max_record_size: 1024 * 1024,
        }
    }
}

impl StoreConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether every mutation is synced to disk.
    #[must_use]
    pub fn sync_on_write(mut self, enabled: bool) -> Self {
        self.sync_on_write = enabled;
        self
    }

    /// Sets whether bulk resets compact the journal.
    #[must_use]
    pub fn compact_on_reset(mut self, enabled: bool) -> Self {
        self.compact_on_reset = enabled;
        self
    }

    /// Sets the maximum encoded record size.
    #[must_use]
    pub fn max_record_size(mut self, bytes: usize) -> Self {
        self.max_record_size = bytes;
        self
    }
}
