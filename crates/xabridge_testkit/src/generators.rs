//! Property-based test generators using proptest.

use proptest::prelude::*;
use xabridge_core::{XaFlags, Xid, MAX_BQUAL_SIZE, MAX_GTRID_SIZE};

/// Strategy for generating valid xids.
pub fn xid_strategy() -> impl Strategy<Value = Xid> {
    (
        any::<i32>(),
        prop::collection::vec(any::<u8>(), 1..=MAX_GTRID_SIZE),
        prop::collection::vec(any::<u8>(), 0..=MAX_BQUAL_SIZE),
    )
        .prop_map(|(format_id, gtrid, bqual)| {
            Xid::new(format_id, gtrid, bqual).expect("generated xid is within XA limits")
        })
}

/// Strategy for the flags a transaction manager passes to `start`.
pub fn start_flags_strategy() -> impl Strategy<Value = XaFlags> {
    prop_oneof![
        Just(XaFlags::NO_FLAGS),
        Just(XaFlags::JOIN),
        Just(XaFlags::RESUME),
    ]
}

/// Strategy for arbitrary flag words, including invalid combinations.
pub fn any_flags_strategy() -> impl Strategy<Value = XaFlags> {
    prop_oneof![
        start_flags_strategy(),
        Just(XaFlags::SUCCESS),
        Just(XaFlags::FAIL),
        Just(XaFlags::SUSPEND),
        Just(XaFlags::START_RSCAN),
        Just(XaFlags::END_RSCAN),
        Just(XaFlags::START_RSCAN | XaFlags::END_RSCAN),
        any::<u32>().prop_map(XaFlags::from_bits),
    ]
}

/// One call a transaction manager may make on a bridge.
///
/// Branches are referred to by index into a small pool of xids, so random
/// sequences hit both matching and mismatching branches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeOp {
    /// `start(xids[index], flags)`
    Start(usize, XaFlags),
    /// `end(xids[index], SUCCESS)`
    End(usize),
    /// `prepare(xids[index])`
    Prepare(usize),
    /// `commit(xids[index], one_phase)`
    Commit(usize, bool),
    /// `rollback(xids[index])`
    Rollback(usize),
    /// `forget(xids[index])`
    Forget(usize),
    /// `recover(flags)`
    Recover(XaFlags),
}

/// Strategy for one bridge call against a pool of `pool` xids.
pub fn bridge_op_strategy(pool: usize) -> impl Strategy<Value = BridgeOp> {
    let index = 0..pool.max(1);
    prop_oneof![
        3 => (index.clone(), start_flags_strategy()).prop_map(|(i, f)| BridgeOp::Start(i, f)),
        1 => (index.clone(), any_flags_strategy()).prop_map(|(i, f)| BridgeOp::Start(i, f)),
        2 => index.clone().prop_map(BridgeOp::End),
        1 => index.clone().prop_map(BridgeOp::Prepare),
        2 => (index.clone(), any::<bool>()).prop_map(|(i, p)| BridgeOp::Commit(i, p)),
        2 => index.clone().prop_map(BridgeOp::Rollback),
        1 => index.prop_map(BridgeOp::Forget),
        1 => any_flags_strategy().prop_map(BridgeOp::Recover),
    ]
}

/// Strategy for a sequence of bridge calls.
pub fn bridge_ops_strategy(pool: usize, max_len: usize) -> impl Strategy<Value = Vec<BridgeOp>> {
    prop::collection::vec(bridge_op_strategy(pool), 0..max_len)
}

/// Strategy for a pool of distinct xids.
pub fn xid_pool_strategy(size: usize) -> impl Strategy<Value = Vec<Xid>> {
    prop::collection::hash_set(xid_strategy(), size)
        .prop_map(|xids| xids.into_iter().collect())
}
