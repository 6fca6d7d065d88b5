//! Recovery manager lifecycle.

use crate::config::{RecoveryConfig, RecoveryMode};
use crate::engine::{PeriodicRecoveryEngine, RecoveryEngine, RecoveryReport};
use crate::error::{RecoveryError, RecoveryResult};
use crate::registry::RecoveryRegistry;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use tracing::{debug, info, warn};

/// Builds the recovery engine when the service becomes ready.
pub type EngineFactory =
    Box<dyn Fn(&RecoveryConfig) -> RecoveryResult<Arc<dyn RecoveryEngine>> + Send + Sync>;

/// Application lifecycle signals the service reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// The application finished starting.
    ApplicationReady,
    /// The application is shutting down.
    ApplicationStopping,
}

/// Lifecycle state of the recovery manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ServiceState {
    /// Nothing has happened yet.
    #[default]
    Uninitialized,
    /// The recovery mode is fixed.
    Initialized,
    /// An engine exists and every helper is registered with it.
    Ready,
    /// The engine was stopped and detached.
    Stopped,
}

/// Owns the recovery engine and ties it to the application lifecycle.
///
/// `initialize` runs at most once. `ready` and `stop` are safe to call
/// concurrently and repeatedly: concurrent `ready` calls create a single
/// engine, and `stop` does nothing unless the service is ready.
pub struct RecoveryManagerService {
    config: RecoveryConfig,
    registry: Arc<RecoveryRegistry>,
    engine_factory: EngineFactory,
    initialized: AtomicBool,
    ready: AtomicBool,
    state: Mutex<ServiceState>,
    mode: OnceLock<RecoveryMode>,
    engine: RwLock<Option<Arc<dyn RecoveryEngine>>>,
}

impl RecoveryManagerService {
    /// Creates a service that builds engines with `engine_factory`.
    pub fn new(
        config: RecoveryConfig,
        registry: Arc<RecoveryRegistry>,
        engine_factory: EngineFactory,
    ) -> Self {
        Self {
            config,
            registry,
            engine_factory,
            initialized: AtomicBool::new(false),
            ready: AtomicBool::new(false),
            state: Mutex::new(ServiceState::Uninitialized),
            mode: OnceLock::new(),
            engine: RwLock::new(None),
        }
    }

    /// Creates a service backed by a [`PeriodicRecoveryEngine`].
    pub fn with_periodic_engine(config: RecoveryConfig, registry: Arc<RecoveryRegistry>) -> Self {
        Self::new(
            config,
            registry,
            Box::new(|config| {
                let engine: Arc<dyn RecoveryEngine> =
                    Arc::new(PeriodicRecoveryEngine::new(config.clone()));
                Ok(engine)
            }),
        )
    }

    /// Fixes the recovery mode. Runs at most once.
    pub fn initialize(&self) {
        if self.initialized.load(Ordering::Acquire) {
            return;
        }

        let mut state = self.state.lock();
        if self.initialized.load(Ordering::Acquire) {
            return;
        }

        let mode = *self.mode.get_or_init(|| self.config.mode);
        *state = ServiceState::Initialized;
        self.initialized.store(true, Ordering::Release);
        info!(?mode, "recovery manager initialized");
    }

    /// Creates the engine, hands it every registered helper and, in
    /// automatic mode, starts periodic scanning.
    pub fn ready(&self) -> RecoveryResult<()> {
        self.initialize();
        if self.ready.load(Ordering::Acquire) {
            return Ok(());
        }

        let mut state = self.state.lock();
        if self.ready.load(Ordering::Acquire) {
            return Ok(());
        }

        let engine = (self.engine_factory)(&self.config)?;
        self.registry.attach(Arc::clone(&engine));

        if self.mode() == RecoveryMode::Automatic {
            if let Err(e) = engine.start() {
                self.registry.detach();
                return Err(e);
            }
        }

        *self.engine.write() = Some(engine);
        *state = ServiceState::Ready;
        self.ready.store(true, Ordering::Release);
        info!(helpers = self.registry.len(), "recovery manager ready");
        Ok(())
    }

    /// Stops periodic scanning, then detaches every helper from the engine.
    pub fn stop(&self) {
        if !self.ready.load(Ordering::Acquire) {
            debug!("recovery manager not ready; nothing to stop");
            return;
        }

        let mut state = self.state.lock();
        if !self.ready.load(Ordering::Acquire) {
            return;
        }

        let engine = self.engine.write().take();
        if let Some(engine) = &engine {
            if self.mode() == RecoveryMode::Automatic {
                engine.stop();
            }
        }
        if self.registry.detach().is_none() {
            warn!("recovery registry was not attached to an engine");
        }

        *state = ServiceState::Stopped;
        self.ready.store(false, Ordering::Release);
        info!("recovery manager stopped");
    }

    /// Reacts to an application lifecycle signal.
    pub fn handle(&self, event: LifecycleEvent) -> RecoveryResult<()> {
        match event {
            LifecycleEvent::ApplicationReady => self.ready(),
            LifecycleEvent::ApplicationStopping => {
                self.stop();
                Ok(())
            }
        }
    }

    /// Runs one recovery pass on the calling thread.
    pub fn scan_now(&self) -> RecoveryResult<RecoveryReport> {
        let engine = self.engine().ok_or(RecoveryError::NotReady)?;
        Ok(engine.scan())
    }

    /// Returns the current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ServiceState {
        *self.state.lock()
    }

    /// Returns the recovery mode, or the configured one before
    /// initialization.
    #[must_use]
    pub fn mode(&self) -> RecoveryMode {
        self.mode.get().copied().unwrap_or(self.config.mode)
    }

    /// Returns the engine while the service is ready.
    #[must_use]
    pub fn engine(&self) -> Option<Arc<dyn RecoveryEngine>> {
        self.engine.read().clone()
    }

    /// Returns the helper registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<RecoveryRegistry> {
        &self.registry
    }
}

impl Drop for RecoveryManagerService {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for RecoveryManagerService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecoveryManagerService")
            .field("config", &self.config)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
