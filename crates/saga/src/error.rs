//! Saga error types.

use message_bus::BusError;
use thiserror::Error;

/// Errors that can occur during saga operations.
#[derive(Debug, Error)]
pub enum SagaError {
    /// The router was asked to start a saga from a message that has a cause.
    #[error("{kind} is not a flow start (caused by another message)")]
    NotAFlowStart { kind: &'static str },

    /// Saga configuration is unusable.
    #[error("Invalid saga configuration: {0}")]
    InvalidConfig(String),

    /// Bus error.
    #[error("Bus error: {0}")]
    Bus(#[from] BusError),
}

impl From<SagaError> for BusError {
    fn from(err: SagaError) -> Self {
        match err {
            SagaError::Bus(inner) => inner,
            other => BusError::handler("saga-router", other.to_string()),
        }
    }
}

/// Convenience type alias for saga results.
pub type Result<T> = std::result::Result<T, SagaError>;
