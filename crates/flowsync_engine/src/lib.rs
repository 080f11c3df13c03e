//! # flowsync Engine
//!
//! Decides whether and where content entities are pushed and pulled, and
//! merges reference lists that both sites may have edited.
//!
//! ## Overview
//!
//! - [`can_push_entity_type`], [`PushEvaluator`]: push eligibility and pool
//!   selection, with pinning to pools an entity already uses
//! - [`can_pull_entity`], [`flow_for_pool_and_entity_type`]: pull
//!   eligibility and flow selection with the strict/lenient tie-break
//! - [`merge_reference_list`]: three-way merge of ordered id lists
//! - [`SyncCore`]: runs pushes and pulls through [`EntityHandler`]s and
//!   keeps the status store current
//!
//! ## Example
//!
//! ```rust
//! use flowsync_engine::{EntityRef, SyncCore};
//! use flowsync_policy::{
//!     Action, EntityTypeConfig, Flow, InMemoryPolicy, Pool, PoolUsage, Reason, SyncMode,
//! };
//! use flowsync_status::StatusStore;
//! use std::sync::Arc;
//!
//! let policy = InMemoryPolicy::new()
//!     .with_pool(Pool::new("content"))
//!     .with_flow(Flow::new("articles").with_entity_type(
//!         EntityTypeConfig::new("node", "article", "default")
//!             .with_export(SyncMode::Automatic)
//!             .with_export_pool("content", PoolUsage::Force),
//!     ));
//! let core = SyncCore::new(Arc::new(policy), Arc::new(StatusStore::in_memory()));
//!
//! let entity = EntityRef::new("node", "article", "a1");
//! let targets = core.evaluate_push(&entity, Reason::Automatic, Action::Create).unwrap();
//! assert_eq!(targets.len(), 1);
//! assert!(core.evaluate_push(&entity, Reason::Manual, Action::Create).unwrap().is_empty());
//! ```

mod config;
mod engine;
mod error;
mod handler;
mod intent;
mod merge;
mod pull;
mod push;

pub use config::EngineConfig;
pub use engine::{
    PullOutcome, PullReport, PullRequest, PushOutcome, PushReport, PushTarget, SyncCore,
};
pub use error::{HandlerError, HandlerResult, SyncError, SyncResult};
pub use handler::{EntityHandler, HandlerRegistry, SyncContext};
pub use intent::{Dependency, EntityRef, Intent};
pub use merge::{merge_reference_list, MergeResult};
pub use pull::{can_pull_entity, flow_for_pool_and_entity_type};
pub use push::{can_push_entity_type, PushEvaluator};
