//! # XA Bridge Recovery
//!
//! Crash recovery plumbing for XA resources.
//!
//! Pool integrations register a [`RecoveryConnectionFactory`] with the
//! [`RecoveryRegistry`]. When the application is ready, the
//! [`RecoveryManagerService`] creates a [`RecoveryEngine`], hands it one
//! [`RecoveryHelper`] per factory and, in automatic mode, scans for
//! in-doubt branches on a background thread.
//!
//! A helper whose recovery connection cannot be opened yields an
//! [`ErrorConditionXaResource`]; the pass logs it and moves on, and the
//! integration is retried on the next pass.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

mod config;
mod engine;
mod error;
mod helper;
mod registry;
mod service;

pub use config::{RecoveryConfig, RecoveryMode};
pub use engine::{
    InDoubtResolver, PeriodicRecoveryEngine, PresumedAbort, RecordedDecisions, RecoveryEngine,
    RecoveryReport, Resolution,
};
pub use error::{RecoveryError, RecoveryResult};
pub use helper::{
    ErrorConditionXaResource, FactoryRecoveryHelper, RecoveryConnection,
    RecoveryConnectionFactory, RecoveryHelper, RecoveryXaResource,
};
pub use registry::RecoveryRegistry;
pub use service::{EngineFactory, LifecycleEvent, RecoveryManagerService, ServiceState};
