//! Recording and scriptable resources.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use xabridge_core::{
    same_object, PrepareVote, ResourceError, ResourceResult, TransactionAwareness,
    TransactionCheck, TransactionResult, XaError, XaFlags, XaResource, XaResult, Xid,
};

/// A hook invocation observed by [`RecordingResource`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceEvent {
    /// `transaction_start`
    Start,
    /// `transaction_before_completion(committing)`
    BeforeCompletion(bool),
    /// `transaction_commit`
    Commit,
    /// `transaction_rollback`
    Rollback,
    /// `transaction_end`
    End,
    /// `set_flush_only`
    FlushOnly,
}

/// A hook that can be scripted to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceHook {
    /// `transaction_start`
    Start,
    /// `transaction_before_completion`
    BeforeCompletion,
    /// `transaction_commit`
    Commit,
    /// `transaction_rollback`
    Rollback,
    /// `transaction_end`
    End,
}

/// Pooled resource that records every hook call.
///
/// The resource counts as enlisted between a successful `transaction_start`
/// and the next `transaction_end`. Hooks succeed unless scripted to fail
/// with [`RecordingResource::fail`].
pub struct RecordingResource {
    events: Mutex<Vec<ResourceEvent>>,
    failures: Mutex<HashMap<ResourceHook, ResourceError>>,
    flush_only: AtomicBool,
    enlisted: AtomicBool,
    reachable: AtomicBool,
    check: Mutex<Option<TransactionCheck>>,
    check_at_rollback: Mutex<Option<TransactionResult<bool>>>,
    native: Option<Arc<dyn XaResource>>,
}

impl RecordingResource {
    /// Creates a local-only resource.
    pub fn new() -> Self {
        Self::build(None)
    }

    /// Creates a resource exposing `native` as its XA endpoint.
    pub fn with_native(native: Arc<dyn XaResource>) -> Self {
        Self::build(Some(native))
    }

    fn build(native: Option<Arc<dyn XaResource>>) -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            failures: Mutex::new(HashMap::new()),
            flush_only: AtomicBool::new(false),
            enlisted: AtomicBool::new(false),
            reachable: AtomicBool::new(true),
            check: Mutex::new(None),
            check_at_rollback: Mutex::new(None),
            native,
        }
    }

    /// Makes `hook` fail with `error` until [`RecordingResource::heal`].
    pub fn fail(&self, hook: ResourceHook, error: ResourceError) {
        self.failures.lock().insert(hook, error);
    }

    /// Makes `hook` succeed again.
    pub fn heal(&self, hook: ResourceHook) {
        self.failures.lock().remove(&hook);
    }

    /// Overrides the enlisted flag.
    pub fn set_enlisted(&self, enlisted: bool) {
        self.enlisted.store(enlisted, Ordering::SeqCst);
    }

    /// Sets whether the underlying connection is reachable.
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Returns every recorded event in order.
    pub fn events(&self) -> Vec<ResourceEvent> {
        self.events.lock().clone()
    }

    /// Returns how often `event` was recorded.
    pub fn count(&self, event: ResourceEvent) -> usize {
        self.events.lock().iter().filter(|e| **e == event).count()
    }

    /// Forgets recorded events.
    pub fn clear_events(&self) {
        self.events.lock().clear();
    }

    /// Returns true once the resource was marked flush-only.
    pub fn is_flush_only(&self) -> bool {
        self.flush_only.load(Ordering::SeqCst)
    }

    /// Returns true if a liveness predicate was installed.
    pub fn has_check(&self) -> bool {
        self.check.lock().is_some()
    }

    /// Evaluates the installed liveness predicate.
    pub fn check_transaction(&self) -> Option<TransactionResult<bool>> {
        let check = self.check.lock().clone();
        check.map(|check| check())
    }

    /// Returns what the liveness predicate answered during the last
    /// `transaction_rollback`.
    pub fn check_at_rollback(&self) -> Option<TransactionResult<bool>> {
        self.check_at_rollback.lock().clone()
    }

    fn hook(&self, hook: ResourceHook, event: ResourceEvent) -> ResourceResult<()> {
        self.events.lock().push(event);
        match self.failures.lock().get(&hook) {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}

impl Default for RecordingResource {
    fn default() -> Self {
        Self::new()
    }
}

impl TransactionAwareness for RecordingResource {
    fn transaction_start(&self) -> ResourceResult<()> {
        self.hook(ResourceHook::Start, ResourceEvent::Start)?;
        self.enlisted.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn transaction_before_completion(&self, committing: bool) -> ResourceResult<()> {
        self.hook(
            ResourceHook::BeforeCompletion,
            ResourceEvent::BeforeCompletion(committing),
        )
    }

    fn transaction_commit(&self) -> ResourceResult<()> {
        self.hook(ResourceHook::Commit, ResourceEvent::Commit)
    }

    fn transaction_rollback(&self) -> ResourceResult<()> {
        *self.check_at_rollback.lock() = self.check_transaction();
        self.hook(ResourceHook::Rollback, ResourceEvent::Rollback)
    }

    fn transaction_end(&self) -> ResourceResult<()> {
        self.hook(ResourceHook::End, ResourceEvent::End)?;
        self.enlisted.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn set_flush_only(&self) {
        self.events.lock().push(ResourceEvent::FlushOnly);
        self.flush_only.store(true, Ordering::SeqCst);
    }

    fn transaction_check_callback(&self, check: TransactionCheck) {
        *self.check.lock() = Some(check);
    }

    fn is_enlisted(&self) -> bool {
        self.enlisted.load(Ordering::SeqCst)
    }

    fn is_reachable(&self) -> bool {
        self.reachable.load(Ordering::SeqCst)
    }

    fn xa_resource(&self) -> Option<Arc<dyn XaResource>> {
        self.native.clone()
    }
}

/// An XA operation, for scripting failures and counting calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum XaOperation {
    /// `start`
    Start,
    /// `end`
    End,
    /// `prepare`
    Prepare,
    /// `commit`
    Commit,
    /// `rollback`
    Rollback,
    /// `forget`
    Forget,
    /// `recover`
    Recover,
}

/// One call observed by [`MockXaResource`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XaCall {
    /// The operation.
    pub operation: XaOperation,
    /// The branch, for branch operations.
    pub xid: Option<Xid>,
    /// Flags passed to `start`, `end` or `recover`.
    pub flags: XaFlags,
    /// The `one_phase` argument of `commit`.
    pub one_phase: bool,
}

/// Scriptable native XA resource.
///
/// Keeps a list of prepared branches: `recover(START_RSCAN)` reports them
/// and a successful `commit`, `rollback` or `forget` removes the branch.
/// `recover(END_RSCAN)` alone reports nothing.
pub struct MockXaResource {
    name: String,
    prepared: Mutex<Vec<Xid>>,
    calls: Mutex<Vec<XaCall>>,
    failures: Mutex<HashMap<XaOperation, XaError>>,
    vote: Mutex<PrepareVote>,
}

impl MockXaResource {
    /// Creates a resource named `name` with no prepared branches.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            prepared: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
            failures: Mutex::new(HashMap::new()),
            vote: Mutex::new(PrepareVote::Ok),
        }
    }

    /// Adds `xid` to the prepared branches.
    pub fn add_prepared(&self, xid: Xid) {
        self.prepared.lock().push(xid);
    }

    /// Returns the prepared branches still outstanding.
    pub fn prepared(&self) -> Vec<Xid> {
        self.prepared.lock().clone()
    }

    /// Makes `operation` fail with `error`.
    pub fn fail(&self, operation: XaOperation, error: XaError) {
        self.failures.lock().insert(operation, error);
    }

    /// Makes `operation` succeed again.
    pub fn heal(&self, operation: XaOperation) {
        self.failures.lock().remove(&operation);
    }

    /// Sets the vote returned by `prepare`.
    pub fn set_vote(&self, vote: PrepareVote) {
        *self.vote.lock() = vote;
    }

    /// Returns every call in order.
    pub fn calls(&self) -> Vec<XaCall> {
        self.calls.lock().clone()
    }

    /// Returns how often `operation` was called.
    pub fn count(&self, operation: XaOperation) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|call| call.operation == operation)
            .count()
    }

    /// Returns the branches passed to `operation`, in order.
    pub fn xids_for(&self, operation: XaOperation) -> Vec<Xid> {
        self.calls
            .lock()
            .iter()
            .filter(|call| call.operation == operation)
            .filter_map(|call| call.xid.clone())
            .collect()
    }

    fn record(
        &self,
        operation: XaOperation,
        xid: Option<&Xid>,
        flags: XaFlags,
        one_phase: bool,
    ) -> XaResult<()> {
        self.calls.lock().push(XaCall {
            operation,
            xid: xid.cloned(),
            flags,
            one_phase,
        });
        match self.failures.lock().get(&operation) {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    fn resolve(&self, xid: &Xid) {
        self.prepared.lock().retain(|prepared| prepared != xid);
    }
}

impl XaResource for MockXaResource {
    fn start(&self, xid: &Xid, flags: XaFlags) -> XaResult<()> {
        self.record(XaOperation::Start, Some(xid), flags, false)
    }

    fn end(&self, xid: &Xid, flags: XaFlags) -> XaResult<()> {
        self.record(XaOperation::End, Some(xid), flags, false)
    }

    fn prepare(&self, xid: &Xid) -> XaResult<PrepareVote> {
        self.record(XaOperation::Prepare, Some(xid), XaFlags::NO_FLAGS, false)?;
        Ok(*self.vote.lock())
    }

    fn commit(&self, xid: &Xid, one_phase: bool) -> XaResult<()> {
        self.record(XaOperation::Commit, Some(xid), XaFlags::NO_FLAGS, one_phase)?;
        self.resolve(xid);
        Ok(())
    }

    fn rollback(&self, xid: &Xid) -> XaResult<()> {
        self.record(XaOperation::Rollback, Some(xid), XaFlags::NO_FLAGS, false)?;
        self.resolve(xid);
        Ok(())
    }

    fn forget(&self, xid: &Xid) -> XaResult<()> {
        self.record(XaOperation::Forget, Some(xid), XaFlags::NO_FLAGS, false)?;
        self.resolve(xid);
        Ok(())
    }

    fn recover(&self, flags: XaFlags) -> XaResult<Vec<Xid>> {
        self.record(XaOperation::Recover, None, flags, false)?;
        if flags.contains(XaFlags::START_RSCAN) {
            Ok(self.prepared())
        } else {
            Ok(Vec::new())
        }
    }

    fn is_same_rm(&self, other: &dyn XaResource) -> XaResult<bool> {
        Ok(same_object(self, other))
    }

    fn transaction_timeout(&self) -> XaResult<u32> {
        Ok(30)
    }

    fn set_transaction_timeout(&self, _seconds: u32) -> XaResult<bool> {
        Ok(true)
    }

    fn resource_name(&self) -> &str {
        &self.name
    }
}
