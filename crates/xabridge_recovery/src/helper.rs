//! Recovery helpers: sources of XA resources for a recovery pass.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};
use xabridge_core::{
    same_object, PrepareVote, ResourceError, ResourceResult, XaError, XaFlags, XaResource,
    XaResult, Xid,
};

/// A dedicated, unpooled connection opened for recovery.
pub trait RecoveryConnection: Send + Sync {
    /// Returns the connection's XA endpoint.
    fn xa_resource(&self) -> ResourceResult<Arc<dyn XaResource>>;

    /// Closes the connection.
    fn close(&self) -> ResourceResult<()>;
}

/// Opens recovery connections for one pool integration.
pub trait RecoveryConnectionFactory: Send + Sync {
    /// Opens a fresh connection for recovery, or `None` if the integration
    /// has nothing to recover.
    fn recovery_connection(&self) -> ResourceResult<Option<Arc<dyn RecoveryConnection>>>;

    /// Name of the integration, used in logs.
    fn name(&self) -> &str {
        "unnamed"
    }
}

/// Supplies XA resources to the recovery engine.
pub trait RecoveryHelper: Send + Sync {
    /// Name of the helper, used in logs.
    fn name(&self) -> &str;

    /// Returns the resources to scan in this pass.
    ///
    /// Failures must be reported as resources (see
    /// [`ErrorConditionXaResource`]) so one broken integration never aborts
    /// the whole pass.
    fn xa_resources(&self) -> Vec<Arc<dyn XaResource>>;
}

/// Recovery helper backed by a [`RecoveryConnectionFactory`].
pub struct FactoryRecoveryHelper {
    factory: Arc<dyn RecoveryConnectionFactory>,
    name: String,
}

impl FactoryRecoveryHelper {
    /// Creates a helper for `factory`.
    pub fn new(factory: Arc<dyn RecoveryConnectionFactory>) -> Self {
        let name = factory.name().to_string();
        Self { factory, name }
    }
}

impl RecoveryHelper for FactoryRecoveryHelper {
    fn name(&self) -> &str {
        &self.name
    }

    fn xa_resources(&self) -> Vec<Arc<dyn XaResource>> {
        let connection = match self.factory.recovery_connection() {
            Ok(Some(connection)) => connection,
            Ok(None) => return Vec::new(),
            Err(e) => {
                return vec![Arc::new(ErrorConditionXaResource::new(
                    None,
                    e,
                    self.name.clone(),
                ))]
            }
        };

        match connection.xa_resource() {
            Ok(xa) => vec![Arc::new(RecoveryXaResource::new(
                connection,
                xa,
                self.name.clone(),
            ))],
            Err(e) => vec![Arc::new(ErrorConditionXaResource::new(
                Some(connection),
                e,
                self.name.clone(),
            ))],
        }
    }
}

impl std::fmt::Debug for FactoryRecoveryHelper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FactoryRecoveryHelper")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Closes `connection` at most once.
struct CloseOnce {
    connection: Option<Arc<dyn RecoveryConnection>>,
    closed: AtomicBool,
}

impl CloseOnce {
    fn new(connection: Option<Arc<dyn RecoveryConnection>>) -> Self {
        Self {
            connection,
            closed: AtomicBool::new(false),
        }
    }

    fn close(&self, name: &str) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(connection) = &self.connection {
            match connection.close() {
                Ok(()) => debug!(resource = name, "recovery connection closed"),
                Err(e) => warn!(resource = name, error = %e, "failed to close recovery connection"),
            }
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// XA resource on a recovery connection.
///
/// Delegates to the connection's endpoint and closes the connection once a
/// recovery scan ends (`recover` with [`XaFlags::END_RSCAN`]).
pub struct RecoveryXaResource {
    native: Arc<dyn XaResource>,
    connection: CloseOnce,
    name: String,
}

impl RecoveryXaResource {
    /// Wraps the endpoint of `connection`.
    pub fn new(
        connection: Arc<dyn RecoveryConnection>,
        native: Arc<dyn XaResource>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            native,
            connection: CloseOnce::new(Some(connection)),
            name: name.into(),
        }
    }

    /// Returns true once the recovery connection was closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.connection.is_closed()
    }
}

impl XaResource for RecoveryXaResource {
    fn start(&self, xid: &Xid, flags: XaFlags) -> XaResult<()> {
        self.native.start(xid, flags)
    }

    fn end(&self, xid: &Xid, flags: XaFlags) -> XaResult<()> {
        self.native.end(xid, flags)
    }

    fn prepare(&self, xid: &Xid) -> XaResult<PrepareVote> {
        self.native.prepare(xid)
    }

    fn commit(&self, xid: &Xid, one_phase: bool) -> XaResult<()> {
        self.native.commit(xid, one_phase)
    }

    fn rollback(&self, xid: &Xid) -> XaResult<()> {
        self.native.rollback(xid)
    }

    fn forget(&self, xid: &Xid) -> XaResult<()> {
        self.native.forget(xid)
    }

    fn recover(&self, flags: XaFlags) -> XaResult<Vec<Xid>> {
        let result = self.native.recover(flags);
        if flags.contains(XaFlags::END_RSCAN) {
            self.connection.close(&self.name);
        }
        result
    }

    fn is_same_rm(&self, other: &dyn XaResource) -> XaResult<bool> {
        self.native.is_same_rm(other)
    }

    fn transaction_timeout(&self) -> XaResult<u32> {
        self.native.transaction_timeout()
    }

    fn set_transaction_timeout(&self, seconds: u32) -> XaResult<bool> {
        self.native.set_transaction_timeout(seconds)
    }

    fn resource_name(&self) -> &str {
        &self.name
    }
}

/// Stand-in resource for an integration whose recovery connection failed.
///
/// Its `recover` logs the failure and reports it as an error, so the engine
/// records it and moves on to the next resource; the integration is retried
/// on the next pass.
pub struct ErrorConditionXaResource {
    error: ResourceError,
    connection: CloseOnce,
    name: String,
    reported: Mutex<bool>,
}

impl ErrorConditionXaResource {
    /// Creates an error-condition resource.
    pub fn new(
        connection: Option<Arc<dyn RecoveryConnection>>,
        error: ResourceError,
        name: impl Into<String>,
    ) -> Self {
        Self {
            error,
            connection: CloseOnce::new(connection),
            name: name.into(),
            reported: Mutex::new(false),
        }
    }

    /// Returns the failure this resource stands for.
    #[must_use]
    pub fn error(&self) -> &ResourceError {
        &self.error
    }

    fn failure(&self) -> XaError {
        XaError::resource_manager_caused_by(
            format!("recovery connection for {} is unavailable", self.name),
            self.error.clone(),
        )
    }
}

impl XaResource for ErrorConditionXaResource {
    fn start(&self, _xid: &Xid, _flags: XaFlags) -> XaResult<()> {
        Err(self.failure())
    }

    fn end(&self, _xid: &Xid, _flags: XaFlags) -> XaResult<()> {
        Err(self.failure())
    }

    fn prepare(&self, _xid: &Xid) -> XaResult<PrepareVote> {
        Err(self.failure())
    }

    fn commit(&self, _xid: &Xid, _one_phase: bool) -> XaResult<()> {
        Err(self.failure())
    }

    fn rollback(&self, _xid: &Xid) -> XaResult<()> {
        Err(self.failure())
    }

    fn forget(&self, _xid: &Xid) -> XaResult<()> {
        Err(self.failure())
    }

    fn recover(&self, _flags: XaFlags) -> XaResult<Vec<Xid>> {
        let mut reported = self.reported.lock();
        if !*reported {
            warn!(resource = %self.name, error = %self.error, "recovery connection unavailable; will retry next pass");
            *reported = true;
        }
        drop(reported);
        self.connection.close(&self.name);
        Err(self.failure())
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
