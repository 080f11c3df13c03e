//! Configuration for the sync engine.

/// Configuration for a [`crate::SyncCore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Push dependencies collected by entity handlers.
    pub follow_dependencies: bool,
    /// Maximum nesting of dependency pushes and pulls.
    pub max_dependency_depth: usize,
    /// Reject creates and updates whose bundle schema drifted.
    pub check_schema_version: bool,
}

impl EngineConfig {
    /// Creates a configuration with default values.
    pub fn new() -> Self {
        Self {
            follow_dependencies: true,
            max_dependency_depth: 8,
            check_schema_version: true,
        }
    }

    /// Sets whether dependencies are followed.
    #[must_use]
    pub fn with_follow_dependencies(mut self, follow: bool) -> Self {
        self.follow_dependencies = follow;
        self
    }

    /// Sets the maximum dependency depth.
    #[must_use]
    pub fn with_max_dependency_depth(mut self, depth: usize) -> Self {
        self.max_dependency_depth = depth;
        self
    }

    /// Sets whether schema versions are compared.
    #[must_use]
    pub fn with_schema_check(mut self, check: bool) -> Self {
        self.check_schema_version = check;
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new()
    }
}
