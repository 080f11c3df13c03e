//! Pool (remote channel) definition.

use crate::types::PoolId;
use serde::{Deserialize, Serialize};

/// A named remote channel.
///
/// Connection details are opaque to the decision core; they are carried
/// through for the transport layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pool {
    /// Machine name.
    pub id: PoolId,
    /// Human readable name.
    #[serde(default)]
    pub label: String,
    /// Base URL of the mediating service.
    #[serde(default)]
    pub backend_url: Option<String>,
    /// Identifier of this site at the mediating service.
    #[serde(default)]
    pub site_id: Option<String>,
}

impl Pool {
    /// Creates a pool with no connection details.
    #[must_use]
    pub fn new(id: impl Into<PoolId>) -> Self {
        let id = id.into();
        Self {
            label: id.to_string(),
            id,
            backend_url: None,
            site_id: None,
        }
    }

    /// Sets the backend URL.
    #[must_use]
    pub fn with_backend_url(mut self, url: impl Into<String>) -> Self {
        self.backend_url = Some(url.into());
        self
    }
}
