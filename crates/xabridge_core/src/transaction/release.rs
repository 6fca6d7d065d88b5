//! Interposed synchronization that releases a bridged resource.

use crate::awareness::TransactionAwareness;
use crate::transaction::Synchronization;
use crate::types::TransactionStatus;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Ends the resource once its transaction completes, whatever the outcome.
///
/// Registered exactly once per transaction by the association manager, so
/// the resource is returned to the pool exactly once no matter how often it
/// was checked out or disassociated.
pub struct ResourceReleaseSynchronization {
    resource: Arc<dyn TransactionAwareness>,
    name: String,
    released: AtomicBool,
}

impl ResourceReleaseSynchronization {
    /// Creates a release synchronization for `resource`.
    pub fn new(resource: Arc<dyn TransactionAwareness>, name: impl Into<String>) -> Self {
        Self {
            resource,
            name: name.into(),
            released: AtomicBool::new(false),
        }
    }

    /// Returns true once the resource has been ended or the
    /// synchronization was disarmed.
    #[must_use]
    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }

    /// Makes completion leave the resource alone.
    ///
    /// Used when enlistment fails after registration: the resource never
    /// joined the transaction, so ending it there would release it twice.
    pub fn disarm(&self) {
        if !self.released.swap(true, Ordering::SeqCst) {
            debug!(resource = %self.name, "release synchronization disarmed");
        }
    }
}

impl Synchronization for ResourceReleaseSynchronization {
    fn before_completion(&self) {}

    fn after_completion(&self, status: TransactionStatus) {
        if self.released.swap(true, Ordering::SeqCst) {
            return;
        }
        match self.resource.transaction_end() {
            Ok(()) => debug!(resource = %self.name, ?status, "resource released"),
            Err(e) => warn!(resource = %self.name, ?status, error = %e, "failed to end resource after completion"),
        }
    }
}

impl std::fmt::Debug for ResourceReleaseSynchronization {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceReleaseSynchronization")
            .field("name", &self.name)
            .field("released", &self.is_released())
            .finish_non_exhaustive()
    }
}
