//! Process-wide registry of recovery helpers.

use crate::engine::RecoveryEngine;
use crate::helper::{FactoryRecoveryHelper, RecoveryConnectionFactory, RecoveryHelper};
use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::debug;

/// Identity of the object behind an `Arc`, ignoring trait-object metadata.
pub(crate) fn identity<T: ?Sized>(value: &Arc<T>) -> usize {
    Arc::as_ptr(value) as *const () as usize
}

struct Registration {
    // Held so the factory's address cannot be reused while registered.
    _factory: Arc<dyn RecoveryConnectionFactory>,
    helper: Arc<dyn RecoveryHelper>,
}

/// Registered recovery factories and the helpers built for them.
///
/// Registrations are keyed by factory identity, not by name: two
/// integrations sharing a configuration still get their own helper. The
/// helper built on registration is cached, so removal hands the engine the
/// exact helper object it was given.
///
/// While attached to an engine, registrations and removals are forwarded to
/// it. All operations are safe to call concurrently, including while a
/// recovery pass is iterating the helpers.
pub struct RecoveryRegistry {
    registrations: DashMap<usize, Registration>,
    engine: RwLock<Option<Arc<dyn RecoveryEngine>>>,
}

impl RecoveryRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            registrations: DashMap::new(),
            engine: RwLock::new(None),
        }
    }

    /// Registers `factory`. Returns false if it was already registered.
    pub fn add_resource_recovery_factory(&self, factory: Arc<dyn RecoveryConnectionFactory>) -> bool {
        let key = identity(&factory);
        // Held across the map update so attach and detach see either both
        // the registration and the forwarding, or neither.
        let engine = self.engine.read();
        let mut inserted = None;
        self.registrations.entry(key).or_insert_with(|| {
            let helper: Arc<dyn RecoveryHelper> =
                Arc::new(FactoryRecoveryHelper::new(Arc::clone(&factory)));
            inserted = Some(Arc::clone(&helper));
            Registration {
                _factory: Arc::clone(&factory),
                helper,
            }
        });

        let Some(helper) = inserted else {
            return false;
        };

        debug!(factory = factory.name(), "recovery factory registered");
        if let Some(engine) = engine.as_ref() {
            engine.register_helper(helper);
        }
        true
    }

    /// Removes `factory`. Returns false if it was not registered.
    pub fn remove_resource_recovery_factory(
        &self,
        factory: &Arc<dyn RecoveryConnectionFactory>,
    ) -> bool {
        let engine = self.engine.read();
        let Some((_, registration)) = self.registrations.remove(&identity(factory)) else {
            return false;
        };

        debug!(factory = factory.name(), "recovery factory removed");
        if let Some(engine) = engine.as_ref() {
            engine.deregister_helper(&registration.helper);
        }
        true
    }

    /// Returns true if `factory` is registered.
    #[must_use]
    pub fn contains(&self, factory: &Arc<dyn RecoveryConnectionFactory>) -> bool {
        self.registrations.contains_key(&identity(factory))
    }

    /// Returns the helper registered for `factory`.
    #[must_use]
    pub fn helper_for(
        &self,
        factory: &Arc<dyn RecoveryConnectionFactory>,
    ) -> Option<Arc<dyn RecoveryHelper>> {
        self.registrations
            .get(&identity(factory))
            .map(|registration| Arc::clone(&registration.helper))
    }

    /// Returns a snapshot of every registered helper.
    #[must_use]
    pub fn helpers(&self) -> Vec<Arc<dyn RecoveryHelper>> {
        self.registrations
            .iter()
            .map(|registration| Arc::clone(&registration.helper))
            .collect()
    }

    /// Returns the number of registered factories.
    #[must_use]
    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    /// Returns true if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }

    /// Attaches `engine` and hands it every registered helper.
    pub fn attach(&self, engine: Arc<dyn RecoveryEngine>) {
        let mut attached = self.engine.write();
        for helper in self.helpers() {
            engine.register_helper(helper);
        }
        *attached = Some(engine);
    }

    /// Deregisters every helper from the attached engine and detaches it.
    ///
    /// Returns the detached engine, if one was attached.
    pub fn detach(&self) -> Option<Arc<dyn RecoveryEngine>> {
        let mut attached = self.engine.write();
        let engine = attached.take()?;
        for helper in self.helpers() {
            engine.deregister_helper(&helper);
        }
        Some(engine)
    }

    /// Returns true while an engine is attached.
    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.engine.read().is_some()
    }
}

impl Default for RecoveryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RecoveryRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecoveryRegistry")
            .field("registrations", &self.len())
            .field("attached", &self.is_attached())
            .finish()
    }
}
