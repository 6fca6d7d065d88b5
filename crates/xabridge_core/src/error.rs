//! Error types for the XA bridge.
//!
//! Four layers of errors flow through the bridge:
//! - [`ResourceError`]: failures raised by the pooled resource's hooks
//! - [`TransactionError`]: failures raised by the transaction manager
//! - [`XaError`]: XA-protocol errors returned to the transaction manager
//! - [`BridgeError`]: failures returned to the caller of a pool checkout

use thiserror::Error;

/// Result type for resource hooks.
pub type ResourceResult<T> = Result<T, ResourceError>;

/// Result type for transaction manager calls.
pub type TransactionResult<T> = Result<T, TransactionError>;

/// Result type for XA protocol operations.
pub type XaResult<T> = Result<T, XaError>;

/// Result type for association operations.
pub type BridgeResult<T> = Result<T, BridgeError>;

/// XA return code: the branch was rolled back.
pub const XA_RBROLLBACK: i32 = 100;
/// XA return code: heuristic hazard.
pub const XA_HEURHAZ: i32 = 8;
/// XA return code: heuristic commit.
pub const XA_HEURCOM: i32 = 7;
/// XA return code: heuristic rollback.
pub const XA_HEURRB: i32 = 6;
/// XA return code: heuristic mixed outcome.
pub const XA_HEURMIX: i32 = 5;
/// XA error code: resource manager error.
pub const XAER_RMERR: i32 = -3;
/// XA error code: unknown xid.
pub const XAER_NOTA: i32 = -4;
/// XA error code: invalid arguments.
pub const XAER_INVAL: i32 = -5;
/// XA error code: routine invoked in an improper context.
pub const XAER_PROTO: i32 = -6;
/// XA error code: resource manager unavailable.
pub const XAER_RMFAIL: i32 = -7;
/// XA error code: the xid already exists.
pub const XAER_DUPID: i32 = -8;

/// A failure raised by the underlying single-phase resource.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResourceError {
    /// A transaction hook failed.
    #[error("resource operation failed: {message}")]
    Failed {
        /// Description of the failure.
        message: String,
    },

    /// The connection to the resource is broken.
    #[error("connection unavailable: {message}")]
    ConnectionUnavailable {
        /// Description of the failure.
        message: String,
    },

    /// The local transaction timed out in the pool.
    #[error("local transaction timed out")]
    Timeout,
}

impl ResourceError {
    /// Creates a hook failure.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }

    /// Creates a connection failure.
    pub fn connection_unavailable(message: impl Into<String>) -> Self {
        Self::ConnectionUnavailable {
            message: message.into(),
        }
    }
}

/// A failure raised by the transaction manager.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransactionError {
    /// Unexpected internal failure in the transaction manager.
    #[error("transaction system error: {message}")]
    System {
        /// Description of the failure.
        message: String,
    },

    /// The transaction is marked for rollback and refuses new work.
    #[error("transaction is marked for rollback")]
    RollbackOnly,

    /// The call was made in the wrong transaction state.
    #[error("illegal transaction state: {message}")]
    IllegalState {
        /// Description of the state problem.
        message: String,
    },
}

impl TransactionError {
    /// Creates a system error.
    pub fn system(message: impl Into<String>) -> Self {
        Self::System {
            message: message.into(),
        }
    }

    /// Creates an illegal state error.
    pub fn illegal_state(message: impl Into<String>) -> Self {
        Self::IllegalState {
            message: message.into(),
        }
    }
}

/// Heuristic outcome reported by a resource that decided on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeuristicOutcome {
    /// Some work committed, some rolled back.
    Mixed,
    /// The branch was rolled back.
    RolledBack,
    /// The branch was committed.
    Committed,
    /// The outcome may be mixed.
    Hazard,
}

/// An XA protocol error, as returned to the transaction manager.
///
/// Every variant maps to an XA error code through [`XaError::code`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum XaError {
    /// The resource manager failed (`XAER_RMERR`).
    #[error("resource manager error: {message}")]
    ResourceManager {
        /// Description of the failure.
        message: String,
        /// The resource failure behind this error, if any.
        #[source]
        source: Option<ResourceError>,
    },

    /// The resource manager is unavailable (`XAER_RMFAIL`).
    #[error("resource manager unavailable: {message}")]
    ResourceManagerUnavailable {
        /// Description of the failure.
        message: String,
    },

    /// The xid is not known to this resource (`XAER_NOTA`).
    #[error("unknown xid: {message}")]
    UnknownXid {
        /// Description of the mismatch.
        message: String,
    },

    /// Invalid arguments were supplied (`XAER_INVAL`).
    #[error("invalid arguments: {message}")]
    InvalidArguments {
        /// Description of the invalid argument.
        message: String,
    },

    /// The call was made out of protocol order (`XAER_PROTO`).
    #[error("protocol error: {message}")]
    Protocol {
        /// Description of the violation.
        message: String,
    },

    /// The resource already has a branch (`XAER_DUPID`).
    #[error("duplicate xid: {message}")]
    DuplicateXid {
        /// Description of the conflict.
        message: String,
    },

    /// The branch was rolled back (`XA_RBROLLBACK`).
    #[error("branch rolled back: {message}")]
    RolledBack {
        /// Description of why the branch rolled back.
        message: String,
        /// The resource failure behind the rollback, if any.
        #[source]
        source: Option<ResourceError>,
    },

    /// The resource made a heuristic decision (`XA_HEUR*`).
    #[error("heuristic outcome: {outcome:?}")]
    Heuristic {
        /// The heuristic decision.
        outcome: HeuristicOutcome,
    },

    /// The operation is not supported by this resource (`XAER_RMERR`).
    #[error("operation not supported: {operation}")]
    NotSupported {
        /// Name of the operation.
        operation: &'static str,
    },
}

impl XaError {
    /// Creates a resource manager error.
    pub fn resource_manager(message: impl Into<String>) -> Self {
        Self::ResourceManager {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a resource manager error caused by a resource failure.
    pub fn resource_manager_caused_by(message: impl Into<String>, source: ResourceError) -> Self {
        Self::ResourceManager {
            message: message.into(),
            source: Some(source),
        }
    }

    /// Creates a resource-manager-unavailable error.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::ResourceManagerUnavailable {
            message: message.into(),
        }
    }

    /// Creates an unknown xid error.
    pub fn unknown_xid(message: impl Into<String>) -> Self {
        Self::UnknownXid {
            message: message.into(),
        }
    }

    /// Creates an invalid arguments error.
    pub fn invalid_arguments(message: impl Into<String>) -> Self {
        Self::InvalidArguments {
            message: message.into(),
        }
    }

    /// Creates a protocol error.
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Creates a duplicate xid error.
    pub fn duplicate_xid(message: impl Into<String>) -> Self {
        Self::DuplicateXid {
            message: message.into(),
        }
    }

    /// Creates a rolled back error.
    pub fn rolled_back(message: impl Into<String>) -> Self {
        Self::RolledBack {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a rolled back error caused by a resource failure.
    pub fn rolled_back_caused_by(message: impl Into<String>, source: ResourceError) -> Self {
        Self::RolledBack {
            message: message.into(),
            source: Some(source),
        }
    }

    /// Creates a not supported error.
    pub fn not_supported(operation: &'static str) -> Self {
        Self::NotSupported { operation }
    }

    /// Returns the XA error code for this error.
    pub fn code(&self) -> i32 {
        match self {
            XaError::ResourceManager { .. } | XaError::NotSupported { .. } => XAER_RMERR,
            XaError::ResourceManagerUnavailable { .. } => XAER_RMFAIL,
            XaError::UnknownXid { .. } => XAER_NOTA,
            XaError::InvalidArguments { .. } => XAER_INVAL,
            XaError::Protocol { .. } => XAER_PROTO,
            XaError::DuplicateXid { .. } => XAER_DUPID,
            XaError::RolledBack { .. } => XA_RBROLLBACK,
            XaError::Heuristic { outcome } => match outcome {
                HeuristicOutcome::Mixed => XA_HEURMIX,
                HeuristicOutcome::RolledBack => XA_HEURRB,
                HeuristicOutcome::Committed => XA_HEURCOM,
                HeuristicOutcome::Hazard => XA_HEURHAZ,
            },
        }
    }

    /// Returns true if the error reports a rollback outcome.
    pub fn is_rollback(&self) -> bool {
        matches!(self, XaError::RolledBack { .. })
    }

    /// Returns true if the error reports a heuristic decision.
    pub fn is_heuristic(&self) -> bool {
        matches!(self, XaError::Heuristic { .. })
    }
}

/// An error returned to the code that checked a resource out of the pool.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The resource could not be placed under transactional control.
    #[error("resource access failure: {message}")]
    ResourceAccess {
        /// What was being attempted.
        message: String,
        /// The transaction manager failure.
        #[source]
        source: TransactionError,
    },

    /// A resource hook failed during association.
    #[error("resource failure: {0}")]
    Resource(#[from] ResourceError),

    /// An XA protocol error.
    #[error("XA error: {0}")]
    Xa(#[from] XaError),
}

impl BridgeError {
    /// Creates a resource access failure.
    pub fn resource_access(message: impl Into<String>, source: TransactionError) -> Self {
        Self::ResourceAccess {
            message: message.into(),
            source,
        }
    }
}
