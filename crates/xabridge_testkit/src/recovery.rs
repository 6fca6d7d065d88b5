//! Recovery connection factories and engine factories for tests.

use crate::resources::MockXaResource;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use xabridge_core::{ResourceError, ResourceResult, XaResource};
use xabridge_recovery::{
    EngineFactory, PeriodicRecoveryEngine, RecoveryConnection, RecoveryConnectionFactory,
    RecoveryEngine,
};

/// Recovery connection handing out a shared [`MockXaResource`].
pub struct MockRecoveryConnection {
    xa: Arc<MockXaResource>,
    xa_failure: Option<ResourceError>,
    closed: Arc<AtomicUsize>,
}

impl RecoveryConnection for MockRecoveryConnection {
    fn xa_resource(&self) -> ResourceResult<Arc<dyn XaResource>> {
        match &self.xa_failure {
            Some(error) => Err(error.clone()),
            None => Ok(Arc::clone(&self.xa) as Arc<dyn XaResource>),
        }
    }

    fn close(&self) -> ResourceResult<()> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Recovery connection factory over one [`MockXaResource`].
///
/// Every call opens a new connection; all of them share the resource, so
/// prepared branches survive across passes like they would in a database.
pub struct MockRecoveryFactory {
    name: String,
    xa: Arc<MockXaResource>,
    failure: Mutex<Option<ResourceError>>,
    xa_failure: Mutex<Option<ResourceError>>,
    opened: AtomicUsize,
    closed: Arc<AtomicUsize>,
}

impl MockRecoveryFactory {
    /// Creates a factory named `name` over `xa`.
    pub fn new(name: impl Into<String>, xa: Arc<MockXaResource>) -> Self {
        Self {
            name: name.into(),
            xa,
            failure: Mutex::new(None),
            xa_failure: Mutex::new(None),
            opened: AtomicUsize::new(0),
            closed: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Creates a factory whose connections cannot be opened.
    pub fn failing(name: impl Into<String>, error: ResourceError) -> Self {
        let name = name.into();
        let factory = Self::new(name.clone(), Arc::new(MockXaResource::new(name)));
        factory.set_failure(Some(error));
        factory
    }

    /// Sets (or with `None`, clears) the connection failure.
    pub fn set_failure(&self, error: Option<ResourceError>) {
        *self.failure.lock() = error;
    }

    /// Makes opened connections fail to produce an XA endpoint.
    pub fn set_xa_failure(&self, error: Option<ResourceError>) {
        *self.xa_failure.lock() = error;
    }

    /// Returns the shared XA resource.
    pub fn xa(&self) -> &Arc<MockXaResource> {
        &self.xa
    }

    /// Returns how many connections were opened.
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    /// Returns how many connections were closed.
    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

impl RecoveryConnectionFactory for MockRecoveryFactory {
    fn recovery_connection(&self) -> ResourceResult<Option<Arc<dyn RecoveryConnection>>> {
        if let Some(error) = self.failure.lock().clone() {
            return Err(error);
        }
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Some(Arc::new(MockRecoveryConnection {
            xa: Arc::clone(&self.xa),
            xa_failure: self.xa_failure.lock().clone(),
            closed: Arc::clone(&self.closed),
        })))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Engine factory that counts engine creations.
///
/// `delay` is slept before each creation to widen race windows.
pub fn counting_engine_factory(created: Arc<AtomicUsize>, delay: Duration) -> EngineFactory {
    Box::new(move |config| {
        std::thread::sleep(delay);
        created.fetch_add(1, Ordering::SeqCst);
        let engine: Arc<dyn RecoveryEngine> = Arc::new(PeriodicRecoveryEngine::new(config.clone()));
        Ok(engine)
    })
}

/// Engine factory that always hands out `engine`.
pub fn shared_engine_factory(engine: Arc<dyn RecoveryEngine>) -> EngineFactory {
    Box::new(move |_| Ok(Arc::clone(&engine)))
}
