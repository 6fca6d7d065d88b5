//! One-phase bridge from a local-transaction resource to the XA protocol.

use crate::awareness::{TransactionAwareness, TransactionCheck};
use crate::config::BridgeConfig;
use crate::error::{TransactionResult, XaError, XaResult};
use crate::types::{PrepareVote, XaFlags, Xid};
use crate::xa::{same_object, XaResource};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, warn};

/// Exposes a single-phase resource as an XA resource.
///
/// The bridge's whole state is the xid of the branch it is serving. A
/// local resource cannot vote in a real prepare phase, so this resource
/// weakens two-phase commit for itself: if another participant fails
/// after this resource committed, the local work stays committed. Use it
/// as the last (or only) resource of a global transaction.
///
/// ## States
///
/// - idle: no current xid
/// - active: `start` succeeded and neither `commit` nor `rollback` has run
///
/// `end` and `prepare` validate the xid but never change state.
pub struct LocalXaResource {
    resource: Arc<dyn TransactionAwareness>,
    name: String,
    pretend_active_on_rollback: bool,
    transaction_check: Option<TransactionCheck>,
    current_xid: Mutex<Option<Xid>>,
}

impl LocalXaResource {
    /// Creates a bridge for `resource`.
    pub fn new(resource: Arc<dyn TransactionAwareness>, config: &BridgeConfig) -> Self {
        Self {
            resource,
            name: config.resource_name.clone(),
            pretend_active_on_rollback: config.pretend_active_on_rollback,
            transaction_check: None,
            current_xid: Mutex::new(None),
        }
    }

    /// Sets the liveness predicate reinstalled after a rollback that
    /// pretended the transaction was still running.
    ///
    /// Without one, the resource is told no transaction is running once the
    /// rollback returns.
    #[must_use]
    pub fn with_transaction_check(mut self, check: TransactionCheck) -> Self {
        self.transaction_check = Some(check);
        self
    }

    /// Returns the xid of the active branch, if any.
    #[must_use]
    pub fn current_xid(&self) -> Option<Xid> {
        self.current_xid.lock().clone()
    }

    /// Returns the wrapped resource.
    #[must_use]
    pub fn resource(&self) -> &Arc<dyn TransactionAwareness> {
        &self.resource
    }

    fn mark_flush_only(&self, reason: &str) {
        warn!(resource = %self.name, reason, "marking resource flush-only");
        self.resource.set_flush_only();
    }

    /// Fails with `UnknownXid` unless `xid` is the active branch.
    fn ensure_current(&self, xid: &Xid, operation: &str) -> XaResult<()> {
        let matches = self.current_xid.lock().as_ref() == Some(xid);
        if matches {
            return Ok(());
        }
        self.mark_flush_only("xid mismatch");
        Err(XaError::unknown_xid(format!(
            "{operation} called with {xid}, which is not the active branch of {}",
            self.name
        )))
    }

    /// Clears the active branch if it is `xid`.
    ///
    /// The xid is cleared before any completion hook runs, so a failing hook
    /// can never leave the bridge believing it still owns the branch.
    fn take_current(&self, xid: &Xid, operation: &str) -> XaResult<()> {
        let mut current = self.current_xid.lock();
        if current.as_ref() == Some(xid) {
            *current = None;
            return Ok(());
        }
        drop(current);
        self.mark_flush_only("xid mismatch");
        Err(XaError::unknown_xid(format!(
            "{operation} called with {xid}, which is not the active branch of {}",
            self.name
        )))
    }

    fn restore_transaction_check(&self) {
        let check: TransactionCheck = match &self.transaction_check {
            Some(check) => Arc::clone(check),
            None => Arc::new(|| -> TransactionResult<bool> { Ok(false) }),
        };
        self.resource.transaction_check_callback(check);
    }
}

impl XaResource for LocalXaResource {
    fn start(&self, xid: &Xid, flags: XaFlags) -> XaResult<()> {
        let active = self.current_xid.lock().clone();

        match active {
            None => {
                if flags != XaFlags::NO_FLAGS {
                    return Err(XaError::invalid_arguments(format!(
                        "starting {xid} on idle resource {} with flags {:#x}",
                        self.name,
                        flags.bits()
                    )));
                }

                if let Err(e) = self.resource.transaction_start() {
                    self.mark_flush_only("begin failed");
                    return Err(XaError::resource_manager_caused_by(
                        "error starting local transaction",
                        e,
                    ));
                }

                let mut current = self.current_xid.lock();
                if let Some(other) = current.as_ref() {
                    let message = format!(
                        "{} started {other} while beginning {xid}",
                        self.name
                    );
                    drop(current);
                    self.mark_flush_only("concurrent start");
                    return Err(XaError::duplicate_xid(message));
                }
                *current = Some(xid.clone());
                drop(current);

                debug!(resource = %self.name, xid = %xid, "local transaction started");
                Ok(())
            }
            Some(active) if flags.is_join_or_resume() && active == *xid => {
                debug!(resource = %self.name, xid = %xid, "branch joined");
                Ok(())
            }
            Some(active) => {
                self.mark_flush_only("protocol violation on start");
                Err(XaError::duplicate_xid(format!(
                    "{} is already serving {active}; cannot start {xid} with flags {:#x}",
                    self.name,
                    flags.bits()
                )))
            }
        }
    }

    fn end(&self, xid: &Xid, _flags: XaFlags) -> XaResult<()> {
        self.ensure_current(xid, "end")
    }

    fn prepare(&self, xid: &Xid) -> XaResult<PrepareVote> {
        self.ensure_current(xid, "prepare")?;
        Ok(PrepareVote::Ok)
    }

    fn commit(&self, xid: &Xid, one_phase: bool) -> XaResult<()> {
        self.take_current(xid, "commit")?;

        let result = self
            .resource
            .transaction_before_completion(true)
            .and_then(|()| self.resource.transaction_commit());

        match result {
            Ok(()) => {
                debug!(resource = %self.name, xid = %xid, one_phase, "local transaction committed");
                Ok(())
            }
            Err(e) => {
                self.mark_flush_only("commit failed");
                if one_phase {
                    Err(XaError::rolled_back_caused_by(
                        "error committing local transaction",
                        e,
                    ))
                } else {
                    Err(XaError::resource_manager_caused_by(
                        "error committing local transaction",
                        e,
                    ))
                }
            }
        }
    }

    fn rollback(&self, xid: &Xid) -> XaResult<()> {
        self.take_current(xid, "rollback")?;

        let pretend_active = self.pretend_active_on_rollback && self.resource.is_enlisted();
        if pretend_active {
            // A timed-out connection only rolls back while it still thinks
            // its transaction is running.
            self.resource
                .transaction_check_callback(Arc::new(|| -> TransactionResult<bool> { Ok(true) }));
        }

        let result = self
            .resource
            .transaction_before_completion(false)
            .and_then(|()| self.resource.transaction_rollback());

        if pretend_active {
            self.restore_transaction_check();
        }

        match result {
            Ok(()) => {
                debug!(resource = %self.name, xid = %xid, "local transaction rolled back");
                Ok(())
            }
            Err(e) => {
                self.mark_flush_only("rollback failed");
                Err(XaError::resource_manager_caused_by(
                    "error rolling back local transaction",
                    e,
                ))
            }
        }
    }

    fn forget(&self, _xid: &Xid) -> XaResult<()> {
        Err(XaError::not_supported("forget"))
    }

    fn recover(&self, _flags: XaFlags) -> XaResult<Vec<Xid>> {
        Err(XaError::not_supported("recover"))
    }

    fn is_same_rm(&self, other: &dyn XaResource) -> XaResult<bool> {
        Ok(same_object(self, other))
    }

    fn transaction_timeout(&self) -> XaResult<u32> {
        Ok(0)
    }

    fn set_transaction_timeout(&self, _seconds: u32) -> XaResult<bool> {
        Ok(false)
    }

    fn resource_name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Debug for LocalXaResource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalXaResource")
            .field("name", &self.name)
            .field("current_xid", &self.current_xid())
            .finish_non_exhaustive()
    }
}
