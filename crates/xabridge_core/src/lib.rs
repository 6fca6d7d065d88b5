//! # XA Bridge Core
//!
//! Lets a resource that only supports single-phase ("local") transactions
//! take part in an XA distributed transaction.
//!
//! This crate provides:
//! - The [`TransactionAwareness`] contract a connection pool implements
//! - [`LocalXaResource`], the one-phase bridge state machine, and its
//!   connectable and native pass-through siblings
//! - [`ResourceAssociationManager`], which enlists at most one resource per
//!   transaction and releases it on completion
//! - The transaction manager contracts the bridge consumes
//!
//! ## Limitations
//!
//! A local resource cannot vote in a real prepare phase. When a global
//! transaction mixes a bridged resource with true XA participants, the
//! bridged resource can commit while another participant later fails.
//! Enlist bridged resources last, and do not rely on recovery for them:
//! `forget` and `recover` always fail on the bridge.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

mod association;
mod awareness;
pub mod bridge;
mod config;
pub mod error;
pub mod transaction;
mod types;
mod xa;

pub use association::{AssociationGuard, ResourceAssociationManager};
pub use awareness::{TransactionAwareness, TransactionCheck};
pub use bridge::{ConnectableLocalXaResource, LocalXaResource, XaPassthroughResource};
pub use config::{BridgeConfig, EnlistmentMode};
pub use error::{
    BridgeError, BridgeResult, HeuristicOutcome, ResourceError, ResourceResult,
    TransactionError, TransactionResult, XaError, XaResult,
};
pub use transaction::{
    Synchronization, SynchronizationRegistry, Transaction, TransactionManager,
};
pub use types::{
    AssociationKey, CommitOutcome, PrepareVote, TransactionStatus, XaFlags, Xid,
    MAX_BQUAL_SIZE, MAX_GTRID_SIZE,
};
pub use xa::{same_object, XaResource};
