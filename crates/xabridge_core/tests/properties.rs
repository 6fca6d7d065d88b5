//! Property tests: the bridge against a reference model of its state.

use proptest::prelude::*;
use std::sync::Arc;
use xabridge_core::{LocalXaResource, TransactionAwareness, XaFlags, XaResource};
use xabridge_testkit::prelude::*;

fn bridge_for(resource: &Arc<RecordingResource>) -> LocalXaResource {
    LocalXaResource::new(
        Arc::clone(resource) as Arc<dyn TransactionAwareness>,
        &local_config("model"),
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn bridge_matches_model(
        xids in xid_pool_strategy(3),
        ops in bridge_ops_strategy(3, 40),
    ) {
        let resource = Arc::new(RecordingResource::new());
        let bridge = bridge_for(&resource);

        let mut current: Option<usize> = None;
        let mut starts = 0;
        let mut commits = 0;
        let mut rollbacks = 0;

        for op in &ops {
            let accepted = match op {
                BridgeOp::Start(i, flags) => {
                    let ok = match current {
                        None if *flags == XaFlags::NO_FLAGS => {
                            current = Some(*i);
                            starts += 1;
                            true
                        }
                        None => false,
                        Some(active) => {
                            active == *i && (*flags == XaFlags::JOIN || *flags == XaFlags::RESUME)
                        }
                    };
                    prop_assert_eq!(bridge.start(&xids[*i], *flags).is_ok(), ok);
                    ok
                }
                BridgeOp::End(i) => {
                    let ok = current == Some(*i);
                    prop_assert_eq!(bridge.end(&xids[*i], XaFlags::SUCCESS).is_ok(), ok);
                    ok
                }
                BridgeOp::Prepare(i) => {
                    let ok = current == Some(*i);
                    prop_assert_eq!(bridge.prepare(&xids[*i]).is_ok(), ok);
                    ok
                }
                BridgeOp::Commit(i, one_phase) => {
                    let ok = current == Some(*i);
                    if ok {
                        current = None;
                        commits += 1;
                    }
                    prop_assert_eq!(bridge.commit(&xids[*i], *one_phase).is_ok(), ok);
                    ok
                }
                BridgeOp::Rollback(i) => {
                    let ok = current == Some(*i);
                    if ok {
                        current = None;
                        rollbacks += 1;
                    }
                    prop_assert_eq!(bridge.rollback(&xids[*i]).is_ok(), ok);
                    ok
                }
                BridgeOp::Forget(i) => {
                    prop_assert!(bridge.forget(&xids[*i]).is_err());
                    false
                }
                BridgeOp::Recover(flags) => {
                    prop_assert!(bridge.recover(*flags).is_err());
                    false
                }
            };

            prop_assert_eq!(bridge.current_xid(), current.map(|i| xids[i].clone()), "after {:?} (accepted: {})", op, accepted);
            prop_assert_eq!(resource.count(ResourceEvent::Start), starts);
            prop_assert_eq!(resource.count(ResourceEvent::Commit), commits);
            prop_assert_eq!(resource.count(ResourceEvent::Rollback), rollbacks);
        }
    }

    #[test]
    fn idle_start_with_flags_has_no_side_effects(
        xid in xid_strategy(),
        flags in any_flags_strategy(),
    ) {
        prop_assume!(flags != XaFlags::NO_FLAGS);
        let resource = Arc::new(RecordingResource::new());
        let bridge = bridge_for(&resource);

        prop_assert!(bridge.start(&xid, flags).is_err());
        prop_assert!(resource.events().is_empty());
        prop_assert!(bridge.current_xid().is_none());
    }

    #[test]
    fn forget_and_recover_always_fail(xid in xid_strategy(), flags in any_flags_strategy()) {
        let resource = Arc::new(RecordingResource::new());
        let bridge = bridge_for(&resource);

        prop_assert!(bridge.forget(&xid).is_err());
        prop_assert!(bridge.recover(flags).is_err());

        bridge.start(&xid, XaFlags::NO_FLAGS).unwrap();
        prop_assert!(bridge.forget(&xid).is_err());
        prop_assert!(bridge.recover(flags).is_err());
        prop_assert_eq!(bridge.current_xid(), Some(xid));
    }
}
