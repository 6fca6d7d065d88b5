//! Mock transaction manager.
//!
//! One ambient transaction is shared by every thread. Completion follows
//! the usual manager behavior: a single participant is committed in one
//! phase, several participants go through prepare and commit.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use xabridge_core::{
    AssociationKey, PrepareVote, Synchronization, SynchronizationRegistry, Transaction,
    TransactionAwareness, TransactionError, TransactionManager, TransactionResult,
    TransactionStatus, XaFlags, XaResource, Xid,
};

use crate::fixtures::test_xid;

/// A global transaction run by [`MockTransactionManager`].
pub struct MockTransaction {
    id: u64,
    status: Mutex<TransactionStatus>,
    participants: Mutex<Vec<(Xid, Arc<dyn XaResource>)>>,
    synchronizations: Mutex<Vec<Arc<dyn Synchronization>>>,
    resources: Mutex<HashMap<AssociationKey, Arc<dyn TransactionAwareness>>>,
    enlist_attempts: AtomicUsize,
    refuse_enlistment: AtomicBool,
}

impl MockTransaction {
    fn new(id: u64) -> Self {
        Self {
            id,
            status: Mutex::new(TransactionStatus::Active),
            participants: Mutex::new(Vec::new()),
            synchronizations: Mutex::new(Vec::new()),
            resources: Mutex::new(HashMap::new()),
            enlist_attempts: AtomicUsize::new(0),
            refuse_enlistment: AtomicBool::new(false),
        }
    }

    /// Returns the transaction id.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Returns the xid of participant `index`.
    pub fn branch_xid(&self, index: usize) -> Xid {
        test_xid(self.id, u8::try_from(index + 1).unwrap_or(u8::MAX))
    }

    /// Returns how many resources were offered for enlistment.
    pub fn enlist_attempts(&self) -> usize {
        self.enlist_attempts.load(Ordering::SeqCst)
    }

    /// Returns the number of enlisted participants.
    pub fn participant_count(&self) -> usize {
        self.participants.lock().len()
    }

    /// Returns the number of registered synchronizations.
    pub fn synchronization_count(&self) -> usize {
        self.synchronizations.lock().len()
    }

    /// Makes `enlist_resource` answer `Ok(false)`.
    pub fn refuse_enlistment(&self, refuse: bool) {
        self.refuse_enlistment.store(refuse, Ordering::SeqCst);
    }

    /// Marks the transaction rollback-only.
    pub fn set_rollback_only(&self) {
        *self.status.lock() = TransactionStatus::MarkedRollback;
    }

    fn set_status(&self, status: TransactionStatus) {
        *self.status.lock() = status;
    }

    fn participants(&self) -> Vec<(Xid, Arc<dyn XaResource>)> {
        self.participants.lock().clone()
    }

    fn synchronizations(&self) -> Vec<Arc<dyn Synchronization>> {
        self.synchronizations.lock().clone()
    }

    fn complete(&self) -> TransactionStatus {
        for synchronization in self.synchronizations() {
            synchronization.before_completion();
        }

        let rollback_only = matches!(
            *self.status.lock(),
            TransactionStatus::MarkedRollback
        );
        let participants = self.participants();
        for (xid, resource) in &participants {
            let flags = if rollback_only {
                XaFlags::FAIL
            } else {
                XaFlags::SUCCESS
            };
            let _ = resource.end(xid, flags);
        }

        let outcome = if rollback_only {
            self.rollback_participants(&participants)
        } else if participants.len() == 1 {
            self.commit_one_phase(&participants[0])
        } else {
            self.commit_two_phase(&participants)
        };

        self.set_status(outcome);
        for synchronization in self.synchronizations() {
            synchronization.after_completion(outcome);
        }
        self.resources.lock().clear();
        outcome
    }

    fn commit_one_phase(&self, (xid, resource): &(Xid, Arc<dyn XaResource>)) -> TransactionStatus {
        self.set_status(TransactionStatus::Committing);
        match resource.commit(xid, true) {
            Ok(()) => TransactionStatus::Committed,
            Err(_) => TransactionStatus::RolledBack,
        }
    }

    fn commit_two_phase(&self, participants: &[(Xid, Arc<dyn XaResource>)]) -> TransactionStatus {
        self.set_status(TransactionStatus::Preparing);
        let mut voted = Vec::new();
        for (xid, resource) in participants {
            match resource.prepare(xid) {
                Ok(PrepareVote::Ok) => voted.push((xid.clone(), Arc::clone(resource))),
                Ok(PrepareVote::ReadOnly) => {}
                Err(_) => {
                    self.rollback_participants(&voted);
                    return TransactionStatus::RolledBack;
                }
            }
        }

        self.set_status(TransactionStatus::Committing);
        for (xid, resource) in &voted {
            let _ = resource.commit(xid, false);
        }
        TransactionStatus::Committed
    }

    fn rollback_participants(&self, participants: &[(Xid, Arc<dyn XaResource>)]) -> TransactionStatus {
        self.set_status(TransactionStatus::RollingBack);
        for (xid, resource) in participants {
            let _ = resource.rollback(xid);
        }
        TransactionStatus::RolledBack
    }
}

impl Transaction for MockTransaction {
    fn status(&self) -> TransactionResult<TransactionStatus> {
        Ok(*self.status.lock())
    }

    fn enlist_resource(&self, resource: Arc<dyn XaResource>) -> TransactionResult<bool> {
        self.enlist_attempts.fetch_add(1, Ordering::SeqCst);
        if self.refuse_enlistment.load(Ordering::SeqCst) {
            return Ok(false);
        }

        let xid = self.branch_xid(self.participant_count());
        resource.start(&xid, XaFlags::NO_FLAGS).map_err(|e| {
            self.set_rollback_only();
            TransactionError::system(format!("failed to start branch {xid}: {e}"))
        })?;
        self.participants.lock().push((xid, resource));
        Ok(true)
    }
}

/// Mock transaction manager and transaction-scoped registry in one.
pub struct MockTransactionManager {
    current: Mutex<Option<Arc<MockTransaction>>>,
    next_id: AtomicU64,
    fail_lookups: AtomicBool,
}

impl MockTransactionManager {
    /// Creates a manager with no ambient transaction.
    pub fn new() -> Self {
        Self {
            current: Mutex::new(None),
            next_id: AtomicU64::new(1),
            fail_lookups: AtomicBool::new(false),
        }
    }

    /// Begins a new ambient transaction.
    pub fn begin(&self) -> Arc<MockTransaction> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let transaction = Arc::new(MockTransaction::new(id));
        *self.current.lock() = Some(Arc::clone(&transaction));
        transaction
    }

    /// Returns the ambient transaction.
    pub fn current(&self) -> Option<Arc<MockTransaction>> {
        self.current.lock().clone()
    }

    /// Completes the ambient transaction and returns its outcome.
    pub fn commit(&self) -> TransactionResult<TransactionStatus> {
        let transaction = self
            .current()
            .ok_or_else(|| TransactionError::illegal_state("no ambient transaction"))?;
        let outcome = transaction.complete();
        *self.current.lock() = None;
        Ok(outcome)
    }

    /// Rolls back the ambient transaction.
    pub fn rollback(&self) -> TransactionResult<TransactionStatus> {
        let transaction = self
            .current()
            .ok_or_else(|| TransactionError::illegal_state("no ambient transaction"))?;
        transaction.set_rollback_only();
        let outcome = transaction.complete();
        *self.current.lock() = None;
        Ok(outcome)
    }

    /// Makes every lookup of the ambient transaction fail.
    pub fn fail_lookups(&self, fail: bool) {
        self.fail_lookups.store(fail, Ordering::SeqCst);
    }

    fn running(&self) -> TransactionResult<Arc<MockTransaction>> {
        self.current()
            .ok_or_else(|| TransactionError::illegal_state("no ambient transaction"))
    }
}

impl Default for MockTransactionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl TransactionManager for MockTransactionManager {
    fn transaction(&self) -> TransactionResult<Option<Arc<dyn Transaction>>> {
        if self.fail_lookups.load(Ordering::SeqCst) {
            return Err(TransactionError::system("transaction manager unavailable"));
        }
        Ok(self
            .current()
            .map(|transaction| transaction as Arc<dyn Transaction>))
    }
}

impl SynchronizationRegistry for MockTransactionManager {
    fn register_interposed_synchronization(
        &self,
        synchronization: Arc<dyn Synchronization>,
    ) -> TransactionResult<()> {
        self.running()?.synchronizations.lock().push(synchronization);
        Ok(())
    }

    fn put_resource(
        &self,
        key: AssociationKey,
        resource: Option<Arc<dyn TransactionAwareness>>,
    ) -> TransactionResult<()> {
        let transaction = self.running()?;
        let mut resources = transaction.resources.lock();
        match resource {
            Some(resource) => {
                resources.insert(key, resource);
            }
            None => {
                resources.remove(&key);
            }
        }
        Ok(())
    }

    fn get_resource(
        &self,
        key: AssociationKey,
    ) -> TransactionResult<Option<Arc<dyn TransactionAwareness>>> {
        Ok(self.running()?.resources.lock().get(&key).cloned())
    }
}
