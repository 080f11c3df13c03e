//! # flowsync Policy
//!
//! The policy matrix consumed by the flowsync decision core.
//!
//! This crate provides:
//! - Identifier newtypes for flows and pools
//! - Sync modes, pool usage tiers, reasons and actions
//! - [`Flow`] and [`EntityTypeConfig`], the per-bundle push/pull policy
//! - [`PolicyMatrix`], the read-only lookup contract, and
//!   [`InMemoryPolicy`], a JSON-loadable implementation
//! - [`FlowCache`], a process-wide snapshot cache with explicit invalidation
//! - Schema version hashing for detecting field drift between sites
//!
//! ## Invariants
//!
//! - Policy is read-only from the core's point of view
//! - Flows are iterated in configuration order
//! - Every pool referenced by a flow exists in the matrix
//!
//! ## Example
//!
//! ```rust
//! use flowsync_policy::{InMemoryPolicy, PolicyMatrix, FlowId};
//!
//! let json = r#"{
//!     "pools": [{ "id": "content" }],
//!     "flows": [{
//!         "id": "articles",
//!         "entity_types": [{
//!             "entity_type": "node",
//!             "bundle": "article",
//!             "handler": "default",
//!             "export_mode": "automatic",
//!             "export_pools": { "content": "force" }
//!         }]
//!     }]
//! }"#;
//!
//! let policy = InMemoryPolicy::from_json(json).unwrap();
//! let flow = policy.flow(&FlowId::new("articles")).unwrap();
//! assert!(flow.entity_type_config("node", "article").is_some());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cache;
mod error;
mod flow;
mod matrix;
mod pool;
mod schema;
mod types;

pub use cache::FlowCache;
pub use error::{PolicyError, PolicyResult};
pub use flow::{EntityTypeConfig, FieldSettings, Flow, HANDLER_IGNORE};
pub use matrix::{InMemoryPolicy, PolicyDocument, PolicyMatrix};
pub use pool::Pool;
pub use schema::schema_version;
pub use types::{
    Action, FlowId, ImportUpdateBehavior, PoolId, PoolUsage, Reason, ReasonSet, SyncMode,
};
