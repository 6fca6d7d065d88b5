//! The XA resource contract driven by a transaction manager.

use crate::error::XaResult;
use crate::types::{PrepareVote, XaFlags, Xid};

/// A transactional endpoint speaking the two-phase-commit protocol.
///
/// For a given xid the transaction manager calls
/// `start → end → [prepare] → commit | rollback`. Implementations must not
/// trust that ordering and re-validate the xid on every call.
pub trait XaResource: Send + Sync {
    /// Associates work with the branch `xid`.
    fn start(&self, xid: &Xid, flags: XaFlags) -> XaResult<()>;

    /// Dissociates work from the branch `xid`.
    fn end(&self, xid: &Xid, flags: XaFlags) -> XaResult<()>;

    /// Asks the resource to vote on committing `xid`.
    fn prepare(&self, xid: &Xid) -> XaResult<PrepareVote>;

    /// Commits `xid`, in one phase if `one_phase` is set.
    fn commit(&self, xid: &Xid, one_phase: bool) -> XaResult<()>;

    /// Rolls back `xid`.
    fn rollback(&self, xid: &Xid) -> XaResult<()>;

    /// Forgets a heuristically completed branch.
    fn forget(&self, xid: &Xid) -> XaResult<()>;

    /// Lists prepared or heuristically completed branches.
    fn recover(&self, flags: XaFlags) -> XaResult<Vec<Xid>>;

    /// Returns true if `other` is served by the same resource manager.
    fn is_same_rm(&self, other: &dyn XaResource) -> XaResult<bool>;

    /// Returns the branch timeout in seconds (0 means unset).
    fn transaction_timeout(&self) -> XaResult<u32>;

    /// Sets the branch timeout; returns false if the resource ignores it.
    fn set_transaction_timeout(&self, seconds: u32) -> XaResult<bool>;

    /// Name of the resource, used in logs.
    fn resource_name(&self) -> &str {
        "unnamed"
    }
}

/// Returns true if both references point at the same object.
pub fn same_object<T: ?Sized>(this: &T, other: &dyn XaResource) -> bool {
    std::ptr::addr_eq(this as *const T, other as *const dyn XaResource)
}
