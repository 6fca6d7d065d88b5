//! Association of pooled resources with the ambient transaction.

use crate::awareness::{TransactionAwareness, TransactionCheck};
use crate::bridge::wrap_resource;
use crate::config::BridgeConfig;
use crate::error::{BridgeError, BridgeResult, TransactionError};
use crate::transaction::{
    transaction_running, ResourceReleaseSynchronization, Synchronization,
    SynchronizationRegistry, Transaction, TransactionManager,
};
use crate::types::AssociationKey;
use std::sync::Arc;
use tracing::{debug, warn};

/// Binds pooled resources to the ambient transaction, one per transaction.
///
/// Each manager owns one [`AssociationKey`]. The first checkout inside a
/// transaction is wrapped and enlisted, and a release synchronization is
/// registered for it; later checkouts inside the same transaction only
/// begin the resource again. A transaction therefore sees at most one
/// participant per manager, and the resource is ended exactly once, when
/// the transaction completes.
///
/// ```ignore
/// let manager = ResourceAssociationManager::new(tm, registry, BridgeConfig::default());
/// {
///     let guard = manager.enlist(connection)?;
///     // ... use the connection inside the transaction
/// } // disassociated here, ended at transaction completion
/// ```
pub struct ResourceAssociationManager {
    transaction_manager: Arc<dyn TransactionManager>,
    registry: Arc<dyn SynchronizationRegistry>,
    key: AssociationKey,
    config: BridgeConfig,
}

impl ResourceAssociationManager {
    /// Creates a manager with a fresh association key.
    pub fn new(
        transaction_manager: Arc<dyn TransactionManager>,
        registry: Arc<dyn SynchronizationRegistry>,
        config: BridgeConfig,
    ) -> Self {
        Self {
            transaction_manager,
            registry,
            key: AssociationKey::new(),
            config,
        }
    }

    /// Returns this manager's association key.
    #[must_use]
    pub fn key(&self) -> AssociationKey {
        self.key
    }

    /// Returns the bridge configuration.
    #[must_use]
    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Returns true if an ambient transaction can accept enlistments.
    pub fn is_transaction_running(&self) -> BridgeResult<bool> {
        transaction_running(self.transaction_manager.as_ref())
            .map_err(|e| BridgeError::resource_access("querying transaction status", e))
    }

    /// Returns the ambient transaction if it is running.
    fn running_transaction(&self) -> BridgeResult<Option<Arc<dyn Transaction>>> {
        let transaction = self
            .transaction_manager
            .transaction()
            .map_err(|e| BridgeError::resource_access("looking up ambient transaction", e))?;

        let Some(transaction) = transaction else {
            return Ok(None);
        };

        let status = transaction
            .status()
            .map_err(|e| BridgeError::resource_access("querying transaction status", e))?;

        Ok(status.is_running().then_some(transaction))
    }

    /// Associates `resource` with the ambient transaction.
    ///
    /// Outside a running transaction this only installs the liveness
    /// predicate. Errors from the transaction manager are returned as
    /// [`BridgeError::ResourceAccess`]; a resource is never left silently
    /// outside transactional control.
    pub fn associate(&self, resource: Arc<dyn TransactionAwareness>) -> BridgeResult<()> {
        let check = self.transaction_check();
        if let Some(transaction) = self.running_transaction()? {
            let existing = self
                .registry
                .get_resource(self.key)
                .map_err(|e| BridgeError::resource_access("reading transaction resources", e))?;

            match existing {
                None => self.enlist_first(&transaction, &resource, Arc::clone(&check))?,
                Some(existing) => {
                    if !Arc::ptr_eq(&existing, &resource) {
                        warn!(
                            resource = %self.config.resource_name,
                            "a different resource is already associated with this transaction; \
                             the new one is begun but not enlisted"
                        );
                    }
                    debug!(resource = %self.config.resource_name, "reusing transaction association");
                    resource.transaction_start()?;
                }
            }
        }

        resource.transaction_check_callback(check);
        Ok(())
    }

    fn transaction_check(&self) -> TransactionCheck {
        let transaction_manager = Arc::clone(&self.transaction_manager);
        Arc::new(move || transaction_running(transaction_manager.as_ref()))
    }

    fn enlist_first(
        &self,
        transaction: &Arc<dyn Transaction>,
        resource: &Arc<dyn TransactionAwareness>,
        check: TransactionCheck,
    ) -> BridgeResult<()> {
        let release = Arc::new(ResourceReleaseSynchronization::new(
            Arc::clone(resource),
            &self.config.resource_name,
        ));
        self.registry
            .register_interposed_synchronization(Arc::clone(&release) as Arc<dyn Synchronization>)
            .map_err(|e| BridgeError::resource_access("registering release synchronization", e))?;

        // Every failure past registration must disarm the synchronization.
        if let Err(e) = self.registry.put_resource(self.key, Some(Arc::clone(resource))) {
            release.disarm();
            return Err(BridgeError::resource_access("storing transaction resource", e));
        }

        let wrapper = wrap_resource(Arc::clone(resource), &self.config, Some(check));
        let enlisted = transaction.enlist_resource(wrapper).and_then(|accepted| {
            if accepted {
                Ok(())
            } else {
                Err(TransactionError::illegal_state(
                    "transaction refused the resource",
                ))
            }
        });

        if let Err(e) = enlisted {
            release.disarm();
            if let Err(clear) = self.registry.put_resource(self.key, None) {
                warn!(resource = %self.config.resource_name, error = %clear, "failed to clear association after enlistment failure");
            }
            return Err(BridgeError::resource_access("enlisting resource", e));
        }

        debug!(resource = %self.config.resource_name, key = %self.key, "resource enlisted");
        Ok(())
    }

    /// Clears the association for the ambient transaction.
    ///
    /// Idempotent. The resource itself is ended by the release
    /// synchronization when the transaction completes, not here.
    pub fn disassociate(&self) -> BridgeResult<()> {
        if self.is_transaction_running()? {
            self.registry
                .put_resource(self.key, None)
                .map_err(|e| BridgeError::resource_access("clearing transaction resource", e))?;
        }
        Ok(())
    }

    /// Returns the resource already associated with the ambient
    /// transaction, so a pool can hand it out again.
    pub fn associated_resource(&self) -> BridgeResult<Option<Arc<dyn TransactionAwareness>>> {
        if !self.is_transaction_running()? {
            return Ok(None);
        }
        self.registry
            .get_resource(self.key)
            .map_err(|e| BridgeError::resource_access("reading transaction resources", e))
    }

    /// Associates `resource` and returns a guard that disassociates it when
    /// dropped, on every exit path.
    pub fn enlist(
        &self,
        resource: Arc<dyn TransactionAwareness>,
    ) -> BridgeResult<AssociationGuard<'_>> {
        self.associate(Arc::clone(&resource))?;
        Ok(AssociationGuard {
            manager: self,
            resource,
        })
    }
}

impl std::fmt::Debug for ResourceAssociationManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceAssociationManager")
            .field("key", &self.key)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Scope of one resource checkout inside a unit of work.
///
/// Dropping the guard disassociates the resource; failures are logged.
pub struct AssociationGuard<'a> {
    manager: &'a ResourceAssociationManager,
    resource: Arc<dyn TransactionAwareness>,
}

impl AssociationGuard<'_> {
    /// Returns the associated resource.
    #[must_use]
    pub fn resource(&self) -> &Arc<dyn TransactionAwareness> {
        &self.resource
    }
}

impl Drop for AssociationGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.manager.disassociate() {
            warn!(
                resource = %self.manager.config.resource_name,
                error = %e,
                "failed to disassociate resource"
            );
        }
    }
}
