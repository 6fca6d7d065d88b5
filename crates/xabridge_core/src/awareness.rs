//! The contract a pooled resource exposes to the bridge.

use crate::error::{ResourceResult, TransactionResult};
use crate::xa::XaResource;
use std::sync::Arc;

/// Predicate answering "is the transaction this resource belongs to still
/// running".
///
/// Installed on the resource by the association manager so the pool can ask
/// without reaching into the transaction manager itself.
pub type TransactionCheck = Arc<dyn Fn() -> TransactionResult<bool> + Send + Sync>;

/// A pooled resource that supports single-phase local transactions.
///
/// Implemented by the connection pool. The bridge holds a shared handle for
/// the duration of one transaction branch; the pool owns the resource.
pub trait TransactionAwareness: Send + Sync {
    /// Begins a local transaction on the resource.
    fn transaction_start(&self) -> ResourceResult<()>;

    /// Called before commit (`committing = true`) or rollback.
    fn transaction_before_completion(&self, committing: bool) -> ResourceResult<()>;

    /// Commits the local transaction.
    fn transaction_commit(&self) -> ResourceResult<()>;

    /// Rolls back the local transaction.
    fn transaction_rollback(&self) -> ResourceResult<()>;

    /// Releases the resource from the transaction; it may return to the pool.
    fn transaction_end(&self) -> ResourceResult<()>;

    /// Marks the resource unusable: any surrounding transaction must roll
    /// back and the pool must not hand it out again.
    fn set_flush_only(&self);

    /// Installs the transaction liveness predicate.
    fn transaction_check_callback(&self, check: TransactionCheck);

    /// Returns true while the pool considers the resource enlisted in a
    /// transaction.
    fn is_enlisted(&self) -> bool {
        false
    }

    /// Returns true if the underlying connection is still usable.
    fn is_reachable(&self) -> bool {
        true
    }

    /// Returns the resource's native XA endpoint, if it has one.
    fn xa_resource(&self) -> Option<Arc<dyn XaResource>> {
        None
    }
}
