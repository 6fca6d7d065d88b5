//! Connectable variant of the one-phase bridge.

use crate::awareness::{TransactionAwareness, TransactionCheck};
use crate::bridge::LocalXaResource;
use crate::config::BridgeConfig;
use crate::error::{XaError, XaResult};
use crate::types::{PrepareVote, XaFlags, Xid};
use crate::xa::{same_object, XaResource};
use std::sync::Arc;
use tracing::warn;

/// A one-phase bridge that hands its connection to the transaction manager.
///
/// Transaction managers that write their commit decision through the
/// resource's own connection use [`connection`](Self::connection) to reach
/// it. Because that decision record depends on the connection being alive,
/// `prepare` refuses to vote when the resource is unreachable.
pub struct ConnectableLocalXaResource {
    inner: LocalXaResource,
}

impl ConnectableLocalXaResource {
    /// Creates a connectable bridge for `resource`.
    pub fn new(resource: Arc<dyn TransactionAwareness>, config: &BridgeConfig) -> Self {
        Self {
            inner: LocalXaResource::new(resource, config),
        }
    }

    /// Sets the liveness predicate reinstalled after a pretend-active
    /// rollback. See [`LocalXaResource::with_transaction_check`].
    #[must_use]
    pub fn with_transaction_check(self, check: TransactionCheck) -> Self {
        Self {
            inner: self.inner.with_transaction_check(check),
        }
    }

    /// Returns the connection behind this bridge.
    #[must_use]
    pub fn connection(&self) -> Arc<dyn TransactionAwareness> {
        Arc::clone(self.inner.resource())
    }

    /// Returns the xid of the active branch, if any.
    #[must_use]
    pub fn current_xid(&self) -> Option<Xid> {
        self.inner.current_xid()
    }
}

impl XaResource for ConnectableLocalXaResource {
    fn start(&self, xid: &Xid, flags: XaFlags) -> XaResult<()> {
        self.inner.start(xid, flags)
    }

    fn end(&self, xid: &Xid, flags: XaFlags) -> XaResult<()> {
        self.inner.end(xid, flags)
    }

    fn prepare(&self, xid: &Xid) -> XaResult<PrepareVote> {
        let vote = self.inner.prepare(xid)?;
        let resource = self.inner.resource();
        if !resource.is_reachable() {
            warn!(
                resource = self.inner.resource_name(),
                xid = %xid,
                "connection unreachable at prepare; marking resource flush-only"
            );
            resource.set_flush_only();
            return Err(XaError::resource_manager(format!(
                "connection of {} is unreachable",
                self.inner.resource_name()
            )));
        }
        Ok(vote)
    }

    fn commit(&self, xid: &Xid, one_phase: bool) -> XaResult<()> {
        self.inner.commit(xid, one_phase)
    }

    fn rollback(&self, xid: &Xid) -> XaResult<()> {
        self.inner.rollback(xid)
    }

    fn forget(&self, xid: &Xid) -> XaResult<()> {
        self.inner.forget(xid)
    }

    fn recover(&self, flags: XaFlags) -> XaResult<Vec<Xid>> {
        self.inner.recover(flags)
    }

    fn is_same_rm(&self, other: &dyn XaResource) -> XaResult<bool> {
        Ok(same_object(self, other))
    }

    fn transaction_timeout(&self) -> XaResult<u32> {
        self.inner.transaction_timeout()
    }

    fn set_transaction_timeout(&self, seconds: u32) -> XaResult<bool> {
        self.inner.set_transaction_timeout(seconds)
    }

    fn resource_name(&self) -> &str {
        self.inner.resource_name()
    }
}
