//! Association manager scenarios against the mock transaction manager.

use std::sync::Arc;
use xabridge_core::{
    BridgeConfig, BridgeError, ResourceAssociationManager, ResourceError, SynchronizationRegistry,
    TransactionAwareness, TransactionManager, TransactionStatus, XaError, XaResource,
};
use xabridge_testkit::prelude::*;

struct Fixture {
    tm: Arc<MockTransactionManager>,
    manager: ResourceAssociationManager,
}

fn fixture(config: BridgeConfig) -> Fixture {
    init_tracing();
    let tm = Arc::new(MockTransactionManager::new());
    let manager = ResourceAssociationManager::new(
        Arc::clone(&tm) as Arc<dyn TransactionManager>,
        Arc::clone(&tm) as Arc<dyn SynchronizationRegistry>,
        config,
    );
    Fixture { tm, manager }
}

fn as_aware(resource: &Arc<RecordingResource>) -> Arc<dyn TransactionAwareness> {
    Arc::clone(resource) as Arc<dyn TransactionAwareness>
}

#[test]
fn associate_then_commit_releases_exactly_once() {
    let Fixture { tm, manager } = fixture(local_config("orders"));
    let resource = Arc::new(RecordingResource::new());

    tm.begin();
    manager.associate(as_aware(&resource)).unwrap();
    assert!(manager.associated_resource().unwrap().is_some());

    assert_eq!(tm.commit().unwrap(), TransactionStatus::Committed);

    assert_eq!(resource.count(ResourceEvent::Start), 1);
    assert_eq!(resource.count(ResourceEvent::Commit), 1);
    assert_eq!(resource.count(ResourceEvent::End), 1);
    assert!(!resource.is_enlisted());

    tm.begin();
    assert!(tm.get_resource(manager.key()).unwrap().is_none());
}

#[test]
fn associate_twice_enlists_once() {
    let Fixture { tm, manager } = fixture(local_config("orders"));
    let resource = Arc::new(RecordingResource::new());

    let transaction = tm.begin();
    manager.associate(as_aware(&resource)).unwrap();
    manager.associate(as_aware(&resource)).unwrap();

    assert_eq!(transaction.enlist_attempts(), 1);
    assert_eq!(transaction.synchronization_count(), 1);
    assert_eq!(resource.count(ResourceEvent::Start), 2);

    tm.commit().unwrap();
    assert_eq!(resource.count(ResourceEvent::End), 1);
}

#[test]
fn associate_outside_transaction_only_installs_check() {
    let Fixture { tm, manager } = fixture(local_config("orders"));
    let resource = Arc::new(RecordingResource::new());

    manager.associate(as_aware(&resource)).unwrap();

    assert!(resource.events().is_empty());
    assert_eq!(resource.check_transaction(), Some(Ok(false)));

    tm.begin();
    assert_eq!(resource.check_transaction(), Some(Ok(true)));
}

#[test]
fn rollback_releases_resource() {
    let Fixture { tm, manager } = fixture(local_config("orders"));
    let resource = Arc::new(RecordingResource::new());

    tm.begin();
    manager.associate(as_aware(&resource)).unwrap();
    assert_eq!(tm.rollback().unwrap(), TransactionStatus::RolledBack);

    assert_eq!(resource.count(ResourceEvent::Rollback), 1);
    assert_eq!(resource.count(ResourceEvent::Commit), 0);
    assert_eq!(resource.count(ResourceEvent::End), 1);
}

#[test]
fn rollback_check_override_ends_with_the_rollback() {
    let Fixture { tm, manager } = fixture(local_config("orders"));
    let resource = Arc::new(RecordingResource::new());

    tm.begin();
    manager.associate(as_aware(&resource)).unwrap();
    resource.set_enlisted(true);
    assert_eq!(tm.rollback().unwrap(), TransactionStatus::RolledBack);

    assert!(tm.current().is_none());
    assert_eq!(resource.check_transaction(), Some(Ok(false)));

    tm.begin();
    assert_eq!(resource.check_transaction(), Some(Ok(true)));
}

#[test]
fn disassociate_is_idempotent_and_does_not_end() {
    let Fixture { tm, manager } = fixture(local_config("orders"));
    let resource = Arc::new(RecordingResource::new());

    tm.begin();
    manager.associate(as_aware(&resource)).unwrap();
    manager.disassociate().unwrap();
    manager.disassociate().unwrap();

    assert!(manager.associated_resource().unwrap().is_none());
    assert_eq!(resource.count(ResourceEvent::End), 0);

    tm.commit().unwrap();
    assert_eq!(resource.count(ResourceEvent::End), 1);

    manager.disassociate().unwrap();
}

#[test]
fn guard_disassociates_on_drop() {
    let Fixture { tm, manager } = fixture(local_config("orders"));
    let resource = Arc::new(RecordingResource::new());

    tm.begin();
    {
        let guard = manager.enlist(as_aware(&resource)).unwrap();
        assert!(Arc::ptr_eq(guard.resource(), &as_aware(&resource)));
        assert!(manager.associated_resource().unwrap().is_some());
    }
    assert!(manager.associated_resource().unwrap().is_none());

    tm.commit().unwrap();
    assert_eq!(resource.count(ResourceEvent::End), 1);
    assert_eq!(resource.count(ResourceEvent::Commit), 1);
}

#[test]
fn lookup_failure_is_a_resource_access_error() {
    let Fixture { tm, manager } = fixture(local_config("orders"));
    let resource = Arc::new(RecordingResource::new());

    tm.begin();
    tm.fail_lookups(true);
    let err = manager.associate(as_aware(&resource)).unwrap_err();

    assert!(matches!(err, BridgeError::ResourceAccess { .. }));
    assert!(resource.events().is_empty());
}

#[test]
fn refused_enlistment_is_reported_and_cleared() {
    let Fixture { tm, manager } = fixture(local_config("orders"));
    let resource = Arc::new(RecordingResource::new());

    let transaction = tm.begin();
    transaction.refuse_enlistment(true);
    let err = manager.associate(as_aware(&resource)).unwrap_err();

    assert!(matches!(err, BridgeError::ResourceAccess { .. }));
    assert!(tm.get_resource(manager.key()).unwrap().is_none());

    tm.commit().unwrap();
    assert_eq!(resource.count(ResourceEvent::End), 0);
}

#[test]
fn retry_after_refused_enlistment_releases_once() {
    let Fixture { tm, manager } = fixture(local_config("orders"));
    let resource = Arc::new(RecordingResource::new());

    let transaction = tm.begin();
    transaction.refuse_enlistment(true);
    assert!(manager.associate(as_aware(&resource)).is_err());

    transaction.refuse_enlistment(false);
    manager.associate(as_aware(&resource)).unwrap();
    assert_eq!(transaction.enlist_attempts(), 2);
    assert_eq!(transaction.participant_count(), 1);

    assert_eq!(tm.commit().unwrap(), TransactionStatus::Committed);
    assert_eq!(resource.count(ResourceEvent::Commit), 1);
    assert_eq!(resource.count(ResourceEvent::End), 1);
}

#[test]
fn begin_failure_during_enlistment_is_reported() {
    let Fixture { tm, manager } = fixture(local_config("orders"));
    let resource = Arc::new(RecordingResource::new());
    resource.fail(ResourceHook::Start, ResourceError::failed("pool exhausted"));

    tm.begin();
    let err = manager.associate(as_aware(&resource)).unwrap_err();

    assert!(matches!(err, BridgeError::ResourceAccess { .. }));
    assert!(resource.is_flush_only());
    assert!(tm.get_resource(manager.key()).unwrap().is_none());

    assert_eq!(tm.commit().unwrap(), TransactionStatus::RolledBack);
    assert_eq!(resource.count(ResourceEvent::End), 0);
}

#[test]
fn begin_failure_on_reuse_is_propagated() {
    let Fixture { tm, manager } = fixture(local_config("orders"));
    let resource = Arc::new(RecordingResource::new());

    tm.begin();
    manager.associate(as_aware(&resource)).unwrap();
    resource.fail(ResourceHook::Start, ResourceError::Timeout);
    let err = manager.associate(as_aware(&resource)).unwrap_err();

    assert!(matches!(err, BridgeError::Resource(ResourceError::Timeout)));
}

#[test]
fn managers_keep_separate_associations() {
    init_tracing();
    let tm = Arc::new(MockTransactionManager::new());
    let orders = ResourceAssociationManager::new(
        Arc::clone(&tm) as Arc<dyn TransactionManager>,
        Arc::clone(&tm) as Arc<dyn SynchronizationRegistry>,
        local_config("orders"),
    );
    let ledger = ResourceAssociationManager::new(
        Arc::clone(&tm) as Arc<dyn TransactionManager>,
        Arc::clone(&tm) as Arc<dyn SynchronizationRegistry>,
        local_config("ledger"),
    );
    assert_ne!(orders.key(), ledger.key());

    let a = Arc::new(RecordingResource::new());
    let b = Arc::new(RecordingResource::new());
    let transaction = tm.begin();
    orders.associate(as_aware(&a)).unwrap();
    ledger.associate(as_aware(&b)).unwrap();
    assert_eq!(transaction.participant_count(), 2);

    assert_eq!(tm.commit().unwrap(), TransactionStatus::Committed);
    for resource in [&a, &b] {
        assert_eq!(resource.count(ResourceEvent::Commit), 1);
        assert_eq!(resource.count(ResourceEvent::End), 1);
    }
}

#[test]
fn native_resource_is_enlisted_through_passthrough() {
    let Fixture { tm, manager } = fixture(local_config("native"));
    let native = Arc::new(MockXaResource::new("native"));
    let resource = Arc::new(RecordingResource::with_native(
        Arc::clone(&native) as Arc<dyn XaResource>
    ));

    let transaction = tm.begin();
    manager.associate(as_aware(&resource)).unwrap();
    tm.commit().unwrap();

    let xid = transaction.branch_xid(0);
    assert_eq!(native.xids_for(XaOperation::Start), vec![xid.clone()]);
    assert_eq!(native.xids_for(XaOperation::Commit), vec![xid]);
    assert!(native.calls().iter().any(|call| call.one_phase));
    assert_eq!(resource.count(ResourceEvent::Start), 1);
    assert_eq!(resource.count(ResourceEvent::End), 1);
}

#[test]
fn connectable_mode_commits_through_bridge() {
    let Fixture { tm, manager } = fixture(connectable_config("ledger"));
    let resource = Arc::new(RecordingResource::new());

    tm.begin();
    manager.associate(as_aware(&resource)).unwrap();
    assert_eq!(tm.commit().unwrap(), TransactionStatus::Committed);

    assert_eq!(resource.count(ResourceEvent::Commit), 1);
}

#[test]
fn failing_native_participant_rolls_back_bridged_one() {
    init_tracing();
    let tm = Arc::new(MockTransactionManager::new());
    let local = ResourceAssociationManager::new(
        Arc::clone(&tm) as Arc<dyn TransactionManager>,
        Arc::clone(&tm) as Arc<dyn SynchronizationRegistry>,
        local_config("local"),
    );
    let xa = ResourceAssociationManager::new(
        Arc::clone(&tm) as Arc<dyn TransactionManager>,
        Arc::clone(&tm) as Arc<dyn SynchronizationRegistry>,
        local_config("xa"),
    );

    let native = Arc::new(MockXaResource::new("xa"));
    native.fail(XaOperation::Prepare, XaError::rolled_back("constraint violation"));
    let bridged = Arc::new(RecordingResource::new());
    let xa_resource = Arc::new(RecordingResource::with_native(
        Arc::clone(&native) as Arc<dyn XaResource>
    ));

    tm.begin();
    local.associate(as_aware(&bridged)).unwrap();
    xa.associate(as_aware(&xa_resource)).unwrap();

    assert_eq!(tm.commit().unwrap(), TransactionStatus::RolledBack);
    assert_eq!(bridged.count(ResourceEvent::Commit), 0);
    assert_eq!(bridged.count(ResourceEvent::Rollback), 1);
    assert_eq!(bridged.count(ResourceEvent::End), 1);
    assert!(xa_resource.is_flush_only());
}
