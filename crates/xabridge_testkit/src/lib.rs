//! # XA Bridge Testkit
//!
//! Test utilities for the XA bridge crates.
//!
//! This crate provides:
//! - A recording pooled resource and a scriptable native XA resource
//! - A mock transaction manager that drives enlisted resources through
//!   one-phase or two-phase completion
//! - Recovery connection factories and engine factories for lifecycle tests
//! - Property-based test generators using proptest
//! - Tracing setup for tests
//!
//! ## Usage
//!
//! ```rust,ignore
//! use xabridge_testkit::prelude::*;
//!
//! #[test]
//! fn commit_releases_resource() {
//!     let tm = Arc::new(MockTransactionManager::new());
//!     let resource = Arc::new(RecordingResource::new());
//!     // ... associate, commit, inspect resource.events()
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod recovery;
pub mod resources;
pub mod transaction;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::recovery::*;
    pub use crate::resources::*;
    pub use crate::transaction::*;
}

pub use fixtures::*;
pub use generators::*;
pub use recovery::*;
pub use resources::*;
pub use transaction::*;
