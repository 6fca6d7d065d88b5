//! Common fixtures: tracing setup, xids and configurations.

use std::sync::Once;
use tracing_subscriber::EnvFilter;
use xabridge_core::{BridgeConfig, EnlistmentMode, Xid};

/// Format id used by every fixture xid.
pub const TEST_FORMAT_ID: i32 = 0x1234;

/// Installs a `tracing` subscriber for tests, once per process.
///
/// The filter comes from `RUST_LOG`, defaulting to `warn`.
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

/// Creates the xid of branch `branch` of global transaction `gtrid`.
pub fn test_xid(gtrid: u64, branch: u8) -> Xid {
    Xid::new(TEST_FORMAT_ID, gtrid.to_be_bytes().to_vec(), vec![branch])
        .expect("fixture xid is within XA limits")
}

/// Bridge configuration for local enlistment under `name`.
pub fn local_config(name: &str) -> BridgeConfig {
    BridgeConfig::new().resource_name(name)
}

/// Bridge configuration for connectable enlistment under `name`.
pub fn connectable_config(name: &str) -> BridgeConfig {
    BridgeConfig::new()
        .resource_name(name)
        .enlistment(EnlistmentMode::Connectable)
}
