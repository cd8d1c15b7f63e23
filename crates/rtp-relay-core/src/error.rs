//! Error handling for the relay coordination engine
//!
//! This module defines the error types surfaced to the host pipeline,
//! split along the taxonomy the engine cares about: configuration
//! mistakes (fatal at startup), precondition violations (permanent
//! rejections) and backend negotiation failures (classified by the
//! backend as temporary or permanent).

use thiserror::Error;

use crate::backend::BackendError;

/// Result type alias for relay operations
pub type Result<T> = std::result::Result<T, RelayError>;

/// Error type for relay coordination operations
#[derive(Debug, Error)]
pub enum RelayError {
    /// No backend registered under the requested name
    #[error("unknown relay backend: {name}")]
    UnknownBackend { name: String },

    /// A backend with this name is already registered
    #[error("relay backend already registered: {name}")]
    DuplicateBackend { name: String },

    /// Engage was attempted outside an initial INVITE transaction
    #[error("relay can only be engaged on an initial INVITE: {reason}")]
    NotInitialRequest { reason: String },

    /// The backend's negotiation failed
    #[error("backend '{backend}' engage failed: {source}")]
    EngageFailed {
        backend: String,
        #[source]
        source: BackendError,
    },

    /// Invalid engine or variable configuration
    #[error("invalid configuration: {details}")]
    InvalidConfig { details: String },
}

impl RelayError {
    /// Shortcut for precondition violations on the engage path
    pub fn not_initial(reason: impl Into<String>) -> Self {
        RelayError::NotInitialRequest {
            reason: reason.into(),
        }
    }

    /// Shortcut for configuration errors
    pub fn invalid_config(details: impl Into<String>) -> Self {
        RelayError::InvalidConfig {
            details: details.into(),
        }
    }

    /// Whether this failure is permanent (retrying the same operation
    /// cannot succeed). Temporary backend failures are the only
    /// retriable case; retry policy itself belongs to the caller.
    pub fn is_permanent(&self) -> bool {
        match self {
            RelayError::EngageFailed {
                source: BackendError::Temporary(_),
                ..
            } => false,
            _ => true,
        }
    }
}
