//! Error types for the telecom core

use thiserror::Error;

use crate::types::{AccountHandle, CallId};

/// Result type for telecom core operations
pub type TelecomResult<T> = Result<T, TelecomError>;

/// Errors that can occur while managing calls
#[derive(Debug, Error)]
pub enum TelecomError {
    /// No record exists for the given call
    #[error("Call not found: {call_id}")]
    CallNotFound { call_id: CallId },

    /// Operation is not valid for the call's current state
    #[error("Invalid state: {message}")]
    InvalidState { message: String },

    /// Outgoing call could not be given room
    #[error("Admission denied: {reason}")]
    AdmissionDenied { reason: String },

    /// The call does not advertise a capability the operation needs
    #[error("Call {call_id} lacks capability {capability}")]
    CapabilityMissing {
        call_id: CallId,
        capability: &'static str,
    },

    /// Account is not registered
    #[error("Account not registered: {account}")]
    AccountNotFound { account: AccountHandle },

    /// Configuration error
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Config file could not be read or deserialized
    #[error("Config source error: {0}")]
    ConfigSource(#[from] config::ConfigError),

    /// TOML parse error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// The service task has stopped or its queue is closed
    #[error("Service unavailable: {message}")]
    ServiceUnavailable { message: String },

    /// Internal error
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl TelecomError {
    /// Create a call-not-found error
    pub fn call_not_found(call_id: &CallId) -> Self {
        Self::CallNotFound {
            call_id: call_id.clone(),
        }
    }

    /// Create an invalid state error
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    /// Create an admission denied error
    pub fn admission_denied(reason: impl Into<String>) -> Self {
        Self::AdmissionDenied {
            reason: reason.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a service unavailable error
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::ServiceUnavailable {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Whether the error is caused by the caller's request rather than the service
    pub fn is_request_error(&self) -> bool {
        matches!(
            self,
            Self::CallNotFound { .. }
                | Self::InvalidState { .. }
                | Self::AdmissionDenied { .. }
                | Self::CapabilityMissing { .. }
                | Self::AccountNotFound { .. }
        )
    }
}
