//! Recovery engine and registry tests.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use xabridge_core::{HeuristicOutcome, ResourceError, XaError, XaFlags, XaResource};
use xabridge_recovery::{
    PeriodicRecoveryEngine, PresumedAbort, RecordedDecisions, RecoveryConfig,
    RecoveryConnectionFactory, RecoveryEngine, RecoveryHelper, RecoveryRegistry,
};
use xabridge_testkit::prelude::*;

fn quick_config() -> RecoveryConfig {
    RecoveryConfig::default()
        .backoff_period(Duration::from_millis(1))
        .scan_interval(Duration::from_millis(10))
}

fn engine() -> Arc<PeriodicRecoveryEngine> {
    init_tracing();
    Arc::new(PeriodicRecoveryEngine::new(quick_config()))
}

fn register(engine: &PeriodicRecoveryEngine, factory: &Arc<MockRecoveryFactory>) {
    let registry = RecoveryRegistry::new();
    registry.add_resource_recovery_factory(Arc::clone(factory) as Arc<dyn RecoveryConnectionFactory>);
    for helper in registry.helpers() {
        engine.register_helper(helper);
    }
}

/// Hands out one scripted resource per call.
struct ScriptedHelper {
    passes: Mutex<VecDeque<Arc<MockXaResource>>>,
}

impl ScriptedHelper {
    fn new(passes: Vec<Arc<MockXaResource>>) -> Self {
        Self {
            passes: Mutex::new(passes.into()),
        }
    }
}

impl RecoveryHelper for ScriptedHelper {
    fn name(&self) -> &str {
        "scripted"
    }

    fn xa_resources(&self) -> Vec<Arc<dyn XaResource>> {
        self.passes
            .lock()
            .pop_front()
            .map(|resource| vec![resource as Arc<dyn XaResource>])
            .unwrap_or_default()
    }
}

#[test]
fn in_doubt_branch_is_rolled_back() {
    let engine = engine();
    let xa = Arc::new(MockXaResource::new("orders"));
    xa.add_prepared(test_xid(1, 1));
    let factory = Arc::new(MockRecoveryFactory::new("orders", Arc::clone(&xa)));
    register(&engine, &factory);

    let report = engine.scan();

    assert_eq!(report.helpers, 1);
    assert_eq!(report.resources, 2);
    assert_eq!(report.in_doubt, 1);
    assert_eq!(report.rolled_back, 1);
    assert_eq!(report.failures, 0);
    assert!(xa.prepared().is_empty());
    assert_eq!(xa.xids_for(XaOperation::Rollback), vec![test_xid(1, 1)]);
    assert_eq!(factory.opened(), 2);
    assert_eq!(factory.closed(), 2);
}

#[test]
fn only_branches_seen_twice_are_resolved() {
    let engine = engine();
    let first = Arc::new(MockXaResource::new("first"));
    first.add_prepared(test_xid(1, 1));
    first.add_prepared(test_xid(2, 1));
    let second = Arc::new(MockXaResource::new("second"));
    second.add_prepared(test_xid(2, 1));
    second.add_prepared(test_xid(3, 1));

    engine.register_helper(Arc::new(ScriptedHelper::new(vec![
        Arc::clone(&first),
        Arc::clone(&second),
    ])));

    let report = engine.scan();

    assert_eq!(report.in_doubt, 1);
    assert_eq!(report.rolled_back, 1);
    assert_eq!(second.xids_for(XaOperation::Rollback), vec![test_xid(2, 1)]);
    assert_eq!(second.prepared(), vec![test_xid(3, 1)]);
    assert_eq!(first.count(XaOperation::Rollback), 0);
}

#[test]
fn recorded_commit_decision_is_honored() {
    init_tracing();
    let decisions = Arc::new(RecordedDecisions::new());
    decisions.record_commit(&test_xid(5, 1));
    let engine = PeriodicRecoveryEngine::with_resolver(quick_config(), decisions);

    let xa = Arc::new(MockXaResource::new("orders"));
    xa.add_prepared(test_xid(5, 1));
    xa.add_prepared(test_xid(6, 1));
    let factory = Arc::new(MockRecoveryFactory::new("orders", Arc::clone(&xa)));
    register(&engine, &factory);

    let report = engine.scan();

    assert_eq!(report.committed, 1);
    assert_eq!(report.rolled_back, 1);
    let commits: Vec<_> = xa
        .calls()
        .into_iter()
        .filter(|call| call.operation == XaOperation::Commit)
        .collect();
    assert_eq!(commits.len(), 1);
    assert_eq!(commits[0].xid, Some(test_xid(5, 1)));
    assert!(!commits[0].one_phase);
}

#[test]
fn heuristic_outcome_is_forgotten() {
    let engine = engine();
    let xa = Arc::new(MockXaResource::new("orders"));
    xa.add_prepared(test_xid(1, 1));
    xa.fail(
        XaOperation::Rollback,
        XaError::Heuristic {
            outcome: HeuristicOutcome::Committed,
        },
    );
    let factory = Arc::new(MockRecoveryFactory::new("orders", Arc::clone(&xa)));
    register(&engine, &factory);

    let report = engine.scan();

    assert_eq!(report.forgotten, 1);
    assert_eq!(report.rolled_back, 0);
    assert_eq!(xa.xids_for(XaOperation::Forget), vec![test_xid(1, 1)]);
    assert!(xa.prepared().is_empty());
}

#[test]
fn failed_resolution_is_counted_and_retried() {
    let engine = engine();
    let xa = Arc::new(MockXaResource::new("orders"));
    xa.add_prepared(test_xid(1, 1));
    xa.fail(XaOperation::Rollback, XaError::unavailable("connection reset"));
    let factory = Arc::new(MockRecoveryFactory::new("orders", Arc::clone(&xa)));
    register(&engine, &factory);

    let report = engine.scan();
    assert_eq!(report.failures, 1);
    assert_eq!(xa.prepared(), vec![test_xid(1, 1)]);

    xa.heal(XaOperation::Rollback);
    let report = engine.scan();
    assert_eq!(report.rolled_back, 1);
    assert!(xa.prepared().is_empty());
}

#[test]
fn foreign_format_is_left_alone() {
    init_tracing();
    let engine = PeriodicRecoveryEngine::with_resolver(
        quick_config(),
        Arc::new(PresumedAbort::for_format(TEST_FORMAT_ID + 1)),
    );
    let xa = Arc::new(MockXaResource::new("orders"));
    xa.add_prepared(test_xid(1, 1));
    let factory = Arc::new(MockRecoveryFactory::new("orders", Arc::clone(&xa)));
    register(&engine, &factory);

    let report = engine.scan();

    assert_eq!(report.in_doubt, 1);
    assert_eq!(report.skipped, 1);
    assert_eq!(xa.prepared(), vec![test_xid(1, 1)]);
}

#[test]
fn error_condition_does_not_abort_pass() {
    let engine = engine();
    let broken = Arc::new(MockRecoveryFactory::failing(
        "broken",
        ResourceError::connection_unavailable("database down"),
    ));
    let xa = Arc::new(MockXaResource::new("healthy"));
    xa.add_prepared(test_xid(1, 1));
    let healthy = Arc::new(MockRecoveryFactory::new("healthy", Arc::clone(&xa)));
    register(&engine, &broken);
    register(&engine, &healthy);

    let report = engine.scan();

    assert_eq!(report.helpers, 2);
    assert_eq!(report.failures, 1);
    assert_eq!(report.rolled_back, 1);
    assert!(xa.prepared().is_empty());
}

#[test]
fn broken_factory_is_retried_next_pass() {
    let engine = engine();
    let xa = Arc::new(MockXaResource::new("flaky"));
    xa.add_prepared(test_xid(1, 1));
    let factory = Arc::new(MockRecoveryFactory::new("flaky", Arc::clone(&xa)));
    factory.set_failure(Some(ResourceError::Timeout));
    register(&engine, &factory);

    let report = engine.scan();
    assert_eq!(report.failures, 1);
    assert_eq!(factory.opened(), 0);

    factory.set_failure(None);
    let report = engine.scan();
    assert_eq!(report.failures, 0);
    assert_eq!(report.rolled_back, 1);
}

#[test]
fn endpoint_failure_closes_connection() {
    let engine = engine();
    let xa = Arc::new(MockXaResource::new("orders"));
    let factory = Arc::new(MockRecoveryFactory::new("orders", Arc::clone(&xa)));
    factory.set_xa_failure(Some(ResourceError::failed("handshake failed")));
    register(&engine, &factory);

    let report = engine.scan();

    assert_eq!(report.failures, 1);
    assert_eq!(factory.opened(), 1);
    assert_eq!(factory.closed(), 1);
    assert_eq!(xa.count(XaOperation::Recover), 0);
}

#[test]
fn scan_failure_isolated_per_resource() {
    let engine = engine();
    let failing = Arc::new(MockXaResource::new("failing"));
    failing.fail(XaOperation::Recover, XaError::unavailable("down"));
    let healthy = Arc::new(MockXaResource::new("healthy"));
    healthy.add_prepared(test_xid(2, 1));

    register(&engine, &Arc::new(MockRecoveryFactory::new("failing", failing)));
    register(&engine, &Arc::new(MockRecoveryFactory::new("healthy", Arc::clone(&healthy))));

    let report = engine.scan();

    assert_eq!(report.failures, 1);
    assert_eq!(report.rolled_back, 1);
    assert!(healthy.prepared().is_empty());
}

#[test]
fn background_loop_resolves_branches() {
    let engine = engine();
    let xa = Arc::new(MockXaResource::new("orders"));
    xa.add_prepared(test_xid(1, 1));
    register(&engine, &Arc::new(MockRecoveryFactory::new("orders", Arc::clone(&xa))));

    engine.start().unwrap();
    let deadline = Instant::now() + Duration::from_secs(5);
    while !xa.prepared().is_empty() && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(2));
    }
    engine.stop();

    assert!(xa.prepared().is_empty());
    assert!(!engine.is_running());
}

#[test]
fn stop_interrupts_backoff() {
    init_tracing();
    let engine = PeriodicRecoveryEngine::new(
        RecoveryConfig::default().backoff_period(Duration::from_secs(3600)),
    );
    let xa = Arc::new(MockXaResource::new("orders"));
    xa.add_prepared(test_xid(1, 1));
    register(&engine, &Arc::new(MockRecoveryFactory::new("orders", Arc::clone(&xa))));

    engine.start().unwrap();
    let deadline = Instant::now() + Duration::from_secs(5);
    while xa.count(XaOperation::Recover) < 2 && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(1));
    }

    let stopping = Instant::now();
    engine.stop();
    assert!(stopping.elapsed() < Duration::from_secs(60));
    assert_eq!(xa.prepared(), vec![test_xid(1, 1)]);
}

#[test]
fn registry_forwards_to_attached_engine() {
    let engine = engine();
    let registry = RecoveryRegistry::new();
    let before: Arc<dyn RecoveryConnectionFactory> = Arc::new(MockRecoveryFactory::new(
        "before",
        Arc::new(MockXaResource::new("before")),
    ));
    let after: Arc<dyn RecoveryConnectionFactory> = Arc::new(MockRecoveryFactory::new(
        "after",
        Arc::new(MockXaResource::new("after")),
    ));

    registry.add_resource_recovery_factory(Arc::clone(&before));
    registry.attach(Arc::clone(&engine) as Arc<dyn RecoveryEngine>);
    assert_eq!(engine.helper_count(), 1);

    registry.add_resource_recovery_factory(Arc::clone(&after));
    assert_eq!(engine.helper_count(), 2);

    registry.remove_resource_recovery_factory(&before);
    assert_eq!(engine.helper_count(), 1);

    assert!(registry.detach().is_some());
    assert_eq!(engine.helper_count(), 0);

    registry.add_resource_recovery_factory(before);
    assert_eq!(engine.helper_count(), 0);
    assert_eq!(registry.len(), 2);
}

#[test]
fn concurrent_registration_stays_consistent() {
    let engine = engine();
    let registry = Arc::new(RecoveryRegistry::new());
    registry.attach(Arc::clone(&engine) as Arc<dyn RecoveryEngine>);

    let factories: Vec<Arc<dyn RecoveryConnectionFactory>> = (0..64)
        .map(|i| {
            Arc::new(MockRecoveryFactory::new(
                format!("pool-{i}"),
                Arc::new(MockXaResource::new(format!("pool-{i}"))),
            )) as Arc<dyn RecoveryConnectionFactory>
        })
        .collect();

    std::thread::scope(|scope| {
        for chunk in factories.chunks(8) {
            let registry = Arc::clone(&registry);
            scope.spawn(move || {
                for factory in chunk {
                    assert!(registry.add_resource_recovery_factory(Arc::clone(factory)));
                    assert!(!registry.add_resource_recovery_factory(Arc::clone(factory)));
                }
                for factory in chunk.iter().step_by(2) {
                    assert!(registry.remove_resource_recovery_factory(factory));
                }
            });
        }
        let engine = Arc::clone(&engine);
        scope.spawn(move || {
            for _ in 0..8 {
                engine.scan();
            }
        });
    });

    assert_eq!(registry.len(), 32);
    assert_eq!(engine.helper_count(), 32);
    for (i, factory) in factories.iter().enumerate() {
        assert_eq!(registry.contains(factory), i % 2 == 1);
    }
}

#[test]
fn removal_racing_detach_leaves_no_stale_helper() {
    let engine = engine();
    let registry = Arc::new(RecoveryRegistry::new());

    let factories: Vec<Arc<dyn RecoveryConnectionFactory>> = (0..32)
        .map(|i| {
            Arc::new(MockRecoveryFactory::new(
                format!("pool-{i}"),
                Arc::new(MockXaResource::new(format!("pool-{i}"))),
            )) as Arc<dyn RecoveryConnectionFactory>
        })
        .collect();

    for round in 0..20 {
        for factory in &factories {
            registry.add_resource_recovery_factory(Arc::clone(factory));
        }
        registry.attach(Arc::clone(&engine) as Arc<dyn RecoveryEngine>);

        std::thread::scope(|scope| {
            for chunk in factories.chunks(4) {
                let registry = Arc::clone(&registry);
                scope.spawn(move || {
                    for factory in chunk {
                        registry.remove_resource_recovery_factory(factory);
                    }
                });
            }
            let registry = Arc::clone(&registry);
            scope.spawn(move || {
                registry.detach();
            });
        });

        assert!(registry.is_empty());
        assert_eq!(engine.helper_count(), 0, "stale helper after round {round}");

        registry.attach(Arc::clone(&engine) as Arc<dyn RecoveryEngine>);
        assert_eq!(engine.helper_count(), 0);
        registry.detach();
    }
}

#[test]
fn end_scan_flag_closes_recovery_connection_once() {
    let xa = Arc::new(MockXaResource::new("orders"));
    let factory = Arc::new(MockRecoveryFactory::new("orders", xa));
    let registry = RecoveryRegistry::new();
    let as_factory = Arc::clone(&factory) as Arc<dyn RecoveryConnectionFactory>;
    registry.add_resource_recovery_factory(Arc::clone(&as_factory));

    let helper = registry.helper_for(&as_factory).unwrap();
    let resources = helper.xa_resources();
    assert_eq!(resources.len(), 1);

    resources[0].recover(XaFlags::START_RSCAN).unwrap();
    assert_eq!(factory.closed(), 0);
    resources[0].recover(XaFlags::END_RSCAN).unwrap();
    resources[0].recover(XaFlags::END_RSCAN).unwrap();
    assert_eq!(factory.closed(), 1);
}
