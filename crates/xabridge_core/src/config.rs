//! Bridge configuration.

/// How a resource without a native XA endpoint is enlisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnlistmentMode {
    /// Plain one-phase bridge.
    #[default]
    Local,
    /// One-phase bridge that exposes its connection to the transaction
    /// manager and checks reachability during prepare.
    Connectable,
}

/// Configuration for one pool integration.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Name of the pooled resource, used in logs and errors.
    pub resource_name: String,

    /// Bridge variant for resources without a native XA endpoint.
    pub enlistment: EnlistmentMode,

    /// Whether rollback makes the transaction check answer "still active"
    /// for resources that are still enlisted.
    ///
    /// Some pools can only roll back a timed-out local transaction while the
    /// connection still believes it is inside that transaction.
    pub pretend_active_on_rollback: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            resource_name: "default".to_string(),
            enlistment: EnlistmentMode::Local,
            pretend_active_on_rollback: true,
        }
    }
}

impl BridgeConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the resource name.
    #[must_use]
    pub fn resource_name(mut self, name: impl Into<String>) -> Self {
        self.resource_name = name.into();
        self
    }

    /// Sets the enlistment mode.
    #[must_use]
    pub const fn enlistment(mut self, mode: EnlistmentMode) -> Self {
        self.enlistment = mode;
        self
    }

    /// Sets whether rollback pretends the transaction is still active.
    #[must_use]
    pub const fn pretend_active_on_rollback(mut self, value: bool) -> Self {
        self.pretend_active_on_rollback = value;
        self
    }
}
