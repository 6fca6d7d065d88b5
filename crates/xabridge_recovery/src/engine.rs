//! Periodic recovery engine.
//!
//! A recovery pass scans every resource twice, separated by a backoff
//! period. Only xids reported in both passes are treated as in-doubt; a
//! branch that shows up once may belong to a transaction that is still
//! completing normally.

use crate::config::RecoveryConfig;
use crate::error::{RecoveryError, RecoveryResult};
use crate::helper::RecoveryHelper;
use crate::registry::identity;
use dashmap::DashMap;
use parking_lot::{Condvar, Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use xabridge_core::{XaError, XaFlags, XaResource, Xid};

/// Drives recovery passes over a set of helpers.
pub trait RecoveryEngine: Send + Sync {
    /// Adds `helper` to the scanned set. Re-adding the same helper is a no-op.
    fn register_helper(&self, helper: Arc<dyn RecoveryHelper>);

    /// Removes `helper`. Returns false if it was not registered.
    fn deregister_helper(&self, helper: &Arc<dyn RecoveryHelper>) -> bool;

    /// Returns the number of registered helpers.
    fn helper_count(&self) -> usize;

    /// Starts periodic scanning.
    fn start(&self) -> RecoveryResult<()>;

    /// Stops periodic scanning and waits for a pass in progress to finish.
    fn stop(&self);

    /// Runs one recovery pass on the calling thread.
    fn scan(&self) -> RecoveryReport;

    /// Returns true while periodic scanning is active.
    fn is_running(&self) -> bool;
}

/// What to do with an in-doubt branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Commit the branch.
    Commit,
    /// Roll the branch back.
    Rollback,
    /// Leave the branch alone, typically because another manager owns it.
    Leave,
}

/// Decides the outcome of in-doubt branches.
pub trait InDoubtResolver: Send + Sync {
    /// Returns the resolution for `xid`.
    fn resolve(&self, xid: &Xid) -> Resolution;
}

/// Rolls back every in-doubt branch.
///
/// With a format id, branches of other formats are left alone.
#[derive(Debug, Clone, Copy, Default)]
pub struct PresumedAbort {
    format_id: Option<i32>,
}

impl PresumedAbort {
    /// Rolls back every in-doubt branch.
    pub const fn new() -> Self {
        Self { format_id: None }
    }

    /// Rolls back only branches with `format_id`.
    pub const fn for_format(format_id: i32) -> Self {
        Self {
            format_id: Some(format_id),
        }
    }
}

impl InDoubtResolver for PresumedAbort {
    fn resolve(&self, xid: &Xid) -> Resolution {
        match self.format_id {
            Some(format_id) if format_id != xid.format_id() => Resolution::Leave,
            _ => Resolution::Rollback,
        }
    }
}

/// Commits branches of global transactions with a recorded commit decision,
/// presumes abort for the rest.
#[derive(Debug, Default)]
pub struct RecordedDecisions {
    committed: RwLock<HashSet<Vec<u8>>>,
}

impl RecordedDecisions {
    /// Creates an empty decision log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that the global transaction of `xid` committed.
    pub fn record_commit(&self, xid: &Xid) {
        self.committed
            .write()
            .insert(xid.global_transaction_id().to_vec());
    }

    /// Drops the decision for the global transaction of `xid`.
    pub fn clear(&self, xid: &Xid) -> bool {
        self.committed.write().remove(xid.global_transaction_id())
    }
}

impl InDoubtResolver for RecordedDecisions {
    fn resolve(&self, xid: &Xid) -> Resolution {
        if self.committed.read().contains(xid.global_transaction_id()) {
            Resolution::Commit
        } else {
            Resolution::Rollback
        }
    }
}

/// Outcome counters of one recovery pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Helpers scanned.
    pub helpers: usize,
    /// Resources scanned, over both passes.
    pub resources: usize,
    /// Branches seen in both passes.
    pub in_doubt: usize,
    /// Branches committed.
    pub committed: usize,
    /// Branches rolled back.
    pub rolled_back: usize,
    /// Heuristic branches forgotten.
    pub forgotten: usize,
    /// Branches left for another manager.
    pub skipped: usize,
    /// Failed scans and resolutions.
    pub failures: usize,
    /// True if the pass was cut short by a stop request.
    pub interrupted: bool,
}

struct EngineInner {
    config: RecoveryConfig,
    resolver: Arc<dyn InDoubtResolver>,
    helpers: DashMap<usize, Arc<dyn RecoveryHelper>>,
    scan_lock: Mutex<()>,
    stopped: Mutex<bool>,
    signal: Condvar,
    last_report: Mutex<Option<RecoveryReport>>,
}

impl EngineInner {
    fn helper_snapshot(&self) -> Vec<(usize, Arc<dyn RecoveryHelper>)> {
        self.helpers
            .iter()
            .map(|entry| (*entry.key(), Arc::clone(entry.value())))
            .collect()
    }

    fn is_stopped(&self) -> bool {
        *self.stopped.lock()
    }

    /// Waits for `period` or a stop request. Returns true if stopped.
    fn sleep_unless_stopped(&self, period: Duration) -> bool {
        let deadline = Instant::now() + period;
        let mut stopped = self.stopped.lock();
        while !*stopped {
            if self.signal.wait_until(&mut stopped, deadline).timed_out() {
                break;
            }
        }
        *stopped
    }

    fn scan(&self) -> RecoveryReport {
        let _pass = self.scan_lock.lock();
        let helpers = self.helper_snapshot();
        let mut report = RecoveryReport {
            helpers: helpers.len(),
            ..RecoveryReport::default()
        };

        if helpers.is_empty() {
            debug!("recovery pass skipped: no helpers registered");
            return report;
        }

        let mut first_pass: HashMap<usize, HashSet<Xid>> = HashMap::new();
        for (key, helper) in &helpers {
            let seen = first_pass.entry(*key).or_default();
            for resource in helper.xa_resources() {
                report.resources += 1;
                match list_branches(resource.as_ref()) {
                    Ok(xids) => seen.extend(xids),
                    Err(e) => {
                        report.failures += 1;
                        warn!(helper = helper.name(), error = %e, "recovery scan failed");
                        end_scan(helper.name(), resource.as_ref());
                    }
                }
            }
        }

        if first_pass.values().all(HashSet::is_empty) {
            debug!(helpers = report.helpers, "recovery pass found no prepared branches");
            return report;
        }

        if self.sleep_unless_stopped(self.config.backoff_period) {
            report.interrupted = true;
            info!("recovery pass interrupted by stop request");
            return report;
        }

        for (key, helper) in &helpers {
            let Some(candidates) = first_pass.get(key) else {
                continue;
            };
            if candidates.is_empty() {
                continue;
            }
            for resource in helper.xa_resources() {
                report.resources += 1;
                self.resolve_resource(helper.name(), resource.as_ref(), candidates, &mut report);
            }
        }

        info!(
            in_doubt = report.in_doubt,
            committed = report.committed,
            rolled_back = report.rolled_back,
            failures = report.failures,
            "recovery pass complete"
        );
        report
    }

    fn resolve_resource(
        &self,
        helper: &str,
        resource: &dyn XaResource,
        candidates: &HashSet<Xid>,
        report: &mut RecoveryReport,
    ) {
        let xids = match resource.recover(XaFlags::START_RSCAN) {
            Ok(xids) => xids,
            Err(e) => {
                report.failures += 1;
                warn!(helper, error = %e, "recovery rescan failed");
                end_scan(helper, resource);
                return;
            }
        };

        for xid in xids.iter().filter(|xid| candidates.contains(*xid)) {
            report.in_doubt += 1;
            let resolution = self.resolver.resolve(xid);
            let result = match resolution {
                Resolution::Leave => {
                    report.skipped += 1;
                    debug!(helper, xid = %xid, "in-doubt branch left alone");
                    continue;
                }
                Resolution::Commit => resource.commit(xid, false),
                Resolution::Rollback => resource.rollback(xid),
            };

            match result {
                Ok(()) if resolution == Resolution::Commit => {
                    report.committed += 1;
                    debug!(helper, xid = %xid, "in-doubt branch committed");
                }
                Ok(()) => {
                    report.rolled_back += 1;
                    debug!(helper, xid = %xid, "in-doubt branch rolled back");
                }
                Err(e) if e.is_heuristic() => {
                    warn!(helper, xid = %xid, error = %e, "heuristic outcome during recovery");
                    match resource.forget(xid) {
                        Ok(()) => report.forgotten += 1,
                        Err(forget) => {
                            report.failures += 1;
                            warn!(helper, xid = %xid, error = %forget, "failed to forget heuristic branch");
                        }
                    }
                }
                Err(e) => {
                    report.failures += 1;
                    warn!(helper, xid = %xid, error = %e, "failed to resolve in-doubt branch");
                }
            }
        }

        end_scan(helper, resource);
    }
}

/// Lists the prepared branches of `resource` as one full scan.
fn list_branches(resource: &dyn XaResource) -> Result<Vec<Xid>, XaError> {
    let mut xids = resource.recover(XaFlags::START_RSCAN)?;
    xids.extend(resource.recover(XaFlags::END_RSCAN)?);
    Ok(xids)
}

fn end_scan(helper: &str, resource: &dyn XaResource) {
    if let Err(e) = resource.recover(XaFlags::END_RSCAN) {
        debug!(helper, error = %e, "failed to end recovery scan");
    }
}

/// Recovery engine that scans on a background thread.
///
/// Cloning yields another handle to the same engine.
#[derive(Clone)]
pub struct PeriodicRecoveryEngine {
    inner: Arc<EngineInner>,
    worker: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl PeriodicRecoveryEngine {
    /// Creates an engine that presumes abort.
    pub fn new(config: RecoveryConfig) -> Self {
        Self::with_resolver(config, Arc::new(PresumedAbort::new()))
    }

    /// Creates an engine that resolves in-doubt branches with `resolver`.
    pub fn with_resolver(config: RecoveryConfig, resolver: Arc<dyn InDoubtResolver>) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                config,
                resolver,
                helpers: DashMap::new(),
                scan_lock: Mutex::new(()),
                stopped: Mutex::new(false),
                signal: Condvar::new(),
                last_report: Mutex::new(None),
            }),
            worker: Arc::new(Mutex::new(None)),
        }
    }

    /// Returns the engine configuration.
    #[must_use]
    pub fn config(&self) -> &RecoveryConfig {
        &self.inner.config
    }

    /// Returns the report of the most recent background pass.
    #[must_use]
    pub fn last_report(&self) -> Option<RecoveryReport> {
        self.inner.last_report.lock().clone()
    }
}

impl RecoveryEngine for PeriodicRecoveryEngine {
    fn register_helper(&self, helper: Arc<dyn RecoveryHelper>) {
        let key = identity(&helper);
        if self.inner.helpers.insert(key, Arc::clone(&helper)).is_none() {
            debug!(helper = helper.name(), "recovery helper registered");
        }
    }

    fn deregister_helper(&self, helper: &Arc<dyn RecoveryHelper>) -> bool {
        let removed = self.inner.helpers.remove(&identity(helper)).is_some();
        if removed {
            debug!(helper = helper.name(), "recovery helper deregistered");
        }
        removed
    }

    fn helper_count(&self) -> usize {
        self.inner.helpers.len()
    }

    fn start(&self) -> RecoveryResult<()> {
        let mut worker = self.worker.lock();
        if worker.is_some() {
            return Ok(());
        }

        *self.inner.stopped.lock() = false;
        let inner = Arc::clone(&self.inner);
        let handle = std::thread::Builder::new()
            .name("xa-recovery".into())
            .spawn(move || {
                while !inner.is_stopped() {
                    let report = inner.scan();
                    *inner.last_report.lock() = Some(report);
                    if inner.sleep_unless_stopped(inner.config.scan_interval) {
                        break;
                    }
                }
                debug!("recovery loop exited");
            })
            .map_err(|e| RecoveryError::engine(format!("failed to spawn recovery thread: {e}")))?;

        *worker = Some(handle);
        info!(interval = ?self.inner.config.scan_interval, "periodic recovery started");
        Ok(())
    }

    fn stop(&self) {
        let Some(handle) = self.worker.lock().take() else {
            return;
        };

        *self.inner.stopped.lock() = true;
        self.inner.signal.notify_all();
        if handle.join().is_err() {
            warn!("recovery thread panicked");
        }
        info!("periodic recovery stopped");
    }

    fn scan(&self) -> RecoveryReport {
        self.inner.scan()
    }

    fn is_running(&self) -> bool {
        self.worker.lock().is_some()
    }
}

impl std::fmt::Debug for PeriodicRecoveryEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeriodicRecoveryEngine")
            .field("config", &self.inner.config)
            .field("helpers", &self.inner.helpers.len())
            .field("running", &self.is_running())
            .finish()
    }
}
