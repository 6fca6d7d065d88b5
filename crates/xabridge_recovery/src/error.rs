//! Error types for the recovery subsystem.

use thiserror::Error;
use xabridge_core::XaError;

/// Result type for recovery operations.
pub type RecoveryResult<T> = Result<T, RecoveryError>;

/// Errors that can occur in the recovery subsystem.
#[derive(Debug, Error)]
pub enum RecoveryError {
    /// The recovery engine could not be created or started.
    #[error("recovery engine error: {message}")]
    Engine {
        /// Description of the failure.
        message: String,
    },

    /// The operation needs a ready recovery manager.
    #[error("recovery manager is not ready")]
    NotReady,

    /// An XA call failed.
    #[error("XA error during recovery: {0}")]
    Xa(#[from] XaError),
}

impl RecoveryError {
    /// Creates an engine error.
    pub fn engine(message: impl Into<String>) -> Self {
        Self::Engine {
            message: message.into(),
        }
    }
}
