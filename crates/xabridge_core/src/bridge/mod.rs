//! XA resource wrappers for pooled resources.
//!
//! Three wrappers cover the ways a pooled resource can join a global
//! transaction:
//! - [`XaPassthroughResource`]: the resource has a native XA endpoint
//! - [`LocalXaResource`]: one-phase bridge for local-transaction resources
//! - [`ConnectableLocalXaResource`]: one-phase bridge whose connection is
//!   visible to the transaction manager

mod connectable;
mod local;
mod passthrough;

pub use connectable::ConnectableLocalXaResource;
pub use local::LocalXaResource;
pub use passthrough::XaPassthroughResource;

use crate::awareness::{TransactionAwareness, TransactionCheck};
use crate::config::{BridgeConfig, EnlistmentMode};
use crate::xa::XaResource;
use std::sync::Arc;

/// Builds the wrapper to enlist for `resource`.
///
/// A native XA endpoint always wins; otherwise the configured enlistment
/// mode picks the bridge variant. `check` is the liveness predicate the
/// bridge puts back after a pretend-active rollback.
pub fn wrap_resource(
    resource: Arc<dyn TransactionAwareness>,
    config: &BridgeConfig,
    check: Option<TransactionCheck>,
) -> Arc<dyn XaResource> {
    if let Some(native) = resource.xa_resource() {
        return Arc::new(XaPassthroughResource::new(
            resource,
            native,
            config.resource_name.clone(),
        ));
    }

    match (config.enlistment, check) {
        (EnlistmentMode::Connectable, Some(check)) => Arc::new(
            ConnectableLocalXaResource::new(resource, config).with_transaction_check(check),
        ),
        (EnlistmentMode::Connectable, None) => {
            Arc::new(ConnectableLocalXaResource::new(resource, config))
        }
        (EnlistmentMode::Local, Some(check)) => {
            Arc::new(LocalXaResource::new(resource, config).with_transaction_check(check))
        }
        (EnlistmentMode::Local, None) => Arc::new(LocalXaResource::new(resource, config)),
    }
}
