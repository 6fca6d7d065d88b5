//! Wrapper for resources that speak XA natively.

use crate::awareness::TransactionAwareness;
use crate::error::{XaError, XaResult};
use crate::types::{PrepareVote, XaFlags, Xid};
use crate::xa::XaResource;
use std::sync::Arc;
use tracing::warn;

/// Delegates the XA protocol to the resource's native endpoint.
///
/// The pool still needs to learn when the connection enters a transaction
/// and when it becomes unusable, so `start` runs the begin hook first and
/// every failed delegated call marks the resource flush-only. Native errors
/// are returned unchanged.
pub struct XaPassthroughResource {
    resource: Arc<dyn TransactionAwareness>,
    native: Arc<dyn XaResource>,
    name: String,
}

impl XaPassthroughResource {
    /// Creates a pass-through wrapper around `native`.
    pub fn new(
        resource: Arc<dyn TransactionAwareness>,
        native: Arc<dyn XaResource>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            resource,
            native,
            name: name.into(),
        }
    }

    /// Returns the native endpoint.
    #[must_use]
    pub fn native(&self) -> &Arc<dyn XaResource> {
        &self.native
    }

    fn guard<T>(&self, operation: &str, result: XaResult<T>) -> XaResult<T> {
        if let Err(e) = &result {
            warn!(resource = %self.name, operation, error = %e, "native XA call failed; marking resource flush-only");
            self.resource.set_flush_only();
        }
        result
    }
}

impl XaResource for XaPassthroughResource {
    fn start(&self, xid: &Xid, flags: XaFlags) -> XaResult<()> {
        if let Err(e) = self.resource.transaction_start() {
            warn!(resource = %self.name, xid = %xid, "begin failed; marking resource flush-only");
            self.resource.set_flush_only();
            return Err(XaError::resource_manager_caused_by(
                "error starting transaction on XA connection",
                e,
            ));
        }
        self.guard("start", self.native.start(xid, flags))
    }

    fn end(&self, xid: &Xid, flags: XaFlags) -> XaResult<()> {
        self.guard("end", self.native.end(xid, flags))
    }

    fn prepare(&self, xid: &Xid) -> XaResult<PrepareVote> {
        self.guard("prepare", self.native.prepare(xid))
    }

    fn commit(&self, xid: &Xid, one_phase: bool) -> XaResult<()> {
        self.guard("commit", self.native.commit(xid, one_phase))
    }

    fn rollback(&self, xid: &Xid) -> XaResult<()> {
        self.guard("rollback", self.native.rollback(xid))
    }

    fn forget(&self, xid: &Xid) -> XaResult<()> {
        self.guard("forget", self.native.forget(xid))
    }

    fn recover(&self, flags: XaFlags) -> XaResult<Vec<Xid>> {
        self.guard("recover", self.native.recover(flags))
    }

    fn is_same_rm(&self, other: &dyn XaResource) -> XaResult<bool> {
        self.native.is_same_rm(other)
    }

    fn transaction_timeout(&self) -> XaResult<u32> {
        self.native.transaction_timeout()
    }

    fn set_transaction_timeout(&self, seconds: u32) -> XaResult<bool> {
        self.native.set_transaction_timeout(seconds)
    }

    fn resource_name(&self) -> &str {
        &self.name
    }
}
