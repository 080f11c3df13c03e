//! # flowsync Testkit
//!
//! Test utilities for flowsync.
//!
//! This crate provides:
//! - Policy builders and temporary status stores
//! - A scriptable [`RecordingHandler`] for driving `SyncCore`
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust,ignore
//! use flowsync_testkit::prelude::*;
//!
//! #[test]
//! fn pushes_article() {
//!     let fixture = SyncFixture::new(simple_policy(SyncMode::Automatic));
//!     let reports = fixture.core.push(&article("a1"), Reason::Automatic, Action::Create, props(&[])).unwrap();
//!     assert_eq!(reports.len(), 1);
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use fixtures::*;
pub use generators::*;
