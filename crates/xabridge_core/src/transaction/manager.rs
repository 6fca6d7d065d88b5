//! Contracts consumed from the transaction manager.
//!
//! The bridge never implements a transaction manager; it only drives these
//! traits. Tests supply mocks (see `xabridge_testkit`).

use crate::awareness::TransactionAwareness;
use crate::error::TransactionResult;
use crate::types::{AssociationKey, TransactionStatus};
use crate::xa::XaResource;
use std::sync::Arc;

/// A global transaction.
pub trait Transaction: Send + Sync {
    /// Returns the current status of the transaction.
    fn status(&self) -> TransactionResult<TransactionStatus>;

    /// Enlists an XA resource as a participant.
    ///
    /// Returns `Ok(false)` if the transaction refused the resource.
    fn enlist_resource(&self, resource: Arc<dyn XaResource>) -> TransactionResult<bool>;
}

/// Access to the transaction associated with the calling thread.
pub trait TransactionManager: Send + Sync {
    /// Returns the ambient transaction, if any.
    fn transaction(&self) -> TransactionResult<Option<Arc<dyn Transaction>>>;
}

/// A completion callback registered with a transaction.
pub trait Synchronization: Send + Sync {
    /// Called before the transaction starts completing.
    fn before_completion(&self);

    /// Called once the transaction has completed with `status`.
    fn after_completion(&self, status: TransactionStatus);
}

/// Transaction-scoped storage and callbacks for the ambient transaction.
///
/// Every method operates on the transaction associated with the calling
/// thread; entries never leak across transactions.
pub trait SynchronizationRegistry: Send + Sync {
    /// Registers a synchronization that runs after all ordinary ones.
    fn register_interposed_synchronization(
        &self,
        synchronization: Arc<dyn Synchronization>,
    ) -> TransactionResult<()>;

    /// Stores (or with `None`, clears) the resource under `key`.
    fn put_resource(
        &self,
        key: AssociationKey,
        resource: Option<Arc<dyn TransactionAwareness>>,
    ) -> TransactionResult<()>;

    /// Returns the resource stored under `key`.
    fn get_resource(
        &self,
        key: AssociationKey,
    ) -> TransactionResult<Option<Arc<dyn TransactionAwareness>>>;
}

/// Returns true if `manager` has an ambient transaction that can still
/// accept enlistments.
pub fn transaction_running(manager: &dyn TransactionManager) -> TransactionResult<bool> {
    match manager.transaction()? {
        Some(transaction) => Ok(transaction.status()?.is_running()),
        None => Ok(false),
    }
}
