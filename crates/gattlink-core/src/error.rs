//! Error types for gattlink-core.
//!
//! # Where errors surface
//!
//! | Operation | Failure is... |
//! |-----------|---------------|
//! | Keep-alive probe tick | logged at debug level, counted, never surfaced |
//! | Descriptor write during disconnect | logged as a warning, published as an event, never surfaced |
//! | Service or characteristic discovery | surfaced to every observer of that discovery attempt |
//! | Explicit enable/disable of notifications | returned to the caller |
//!
//! Errors are `Clone` because one discovery failure is replayed to all of
//! its observers.

use std::time::Duration;

use thiserror::Error;
use uuid::Uuid;

use gattlink_types::CharacteristicId;

/// Failures reported by the underlying BLE stack.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new variants
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum TransportError {
    /// The stack gave up waiting for the peripheral.
    #[error("request timed out")]
    Timeout,

    /// The link to the peripheral was lost.
    #[error("link lost")]
    LinkLost,

    /// The peripheral rejected the request (e.g. a descriptor write).
    #[error("request rejected: {0}")]
    Rejected(String),

    /// The stack does not support the request.
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// Any other platform error.
    #[error("{0}")]
    Other(String),
}

/// Errors that can occur while managing a peripheral connection.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum Error {
    /// The transport failed while performing an operation.
    #[error("Transport error during '{operation}': {source}")]
    Transport {
        /// The operation that failed.
        operation: String,
        /// The transport failure.
        #[source]
        source: TransportError,
    },

    /// Operation timed out.
    #[error("Operation '{operation}' timed out after {duration:?}")]
    Timeout {
        /// The operation that timed out.
        operation: String,
        /// The timeout duration.
        duration: Duration,
    },

    /// Operation attempted while not connected.
    #[error("Not connected to device")]
    NotConnected,

    /// The characteristic does not support the requested operation.
    #[error("Characteristic {id} does not support {operation}")]
    NotSupported {
        /// The characteristic.
        id: CharacteristicId,
        /// What was attempted.
        operation: String,
    },

    /// No service with this UUID was discovered.
    #[error("Service not found: {0}")]
    ServiceNotFound(Uuid),

    /// The service has no characteristic with this UUID.
    #[error("Characteristic not found: {uuid} in service {service}")]
    CharacteristicNotFound {
        /// The owning service.
        service: Uuid,
        /// The characteristic that was looked up.
        uuid: Uuid,
    },

    /// The dispatch context shut down before running the job.
    #[error("Dispatch context closed")]
    DispatcherClosed,

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Operation was cancelled.
    #[error("Operation cancelled")]
    Cancelled,
}

impl Error {
    /// Create a transport error with operation context.
    pub fn transport(operation: impl Into<String>, source: TransportError) -> Self {
        Self::Transport {
            operation: operation.into(),
            source,
        }
    }

    /// Create a timeout error with operation context.
    pub fn timeout(operation: impl Into<String>, duration: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            duration,
        }
    }

    /// Create a configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }

    /// Whether the failure came from the peripheral or the link rather than
    /// from local state.
    pub fn is_link_failure(&self) -> bool {
        matches!(self, Error::Transport { .. } | Error::Timeout { .. })
    }
}

/// Result type alias using gattlink-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;
