//! Domain error types.

use message_bus::BusError;
use thiserror::Error;

/// Errors raised by kitchen stages.
#[derive(Debug, Error)]
pub enum DomainError {
    /// A stage received a message kind it does not process.
    #[error("{stage} cannot handle {kind}")]
    UnexpectedMessage {
        stage: &'static str,
        kind: &'static str,
    },

    /// No order with this reference is waiting for payment.
    #[error("Order not found: {0}")]
    UnknownOrder(String),

    /// The order was already paid.
    #[error("Order already paid: {0}")]
    AlreadyPaid(String),

    /// An order with this reference is still in flight.
    #[error("Order already in progress: {0}")]
    DuplicateOrder(String),
}

impl From<DomainError> for BusError {
    fn from(err: DomainError) -> Self {
        let handler = match &err {
            DomainError::UnexpectedMessage { stage, .. } => *stage,
            _ => "domain",
        };
        BusError::handler(handler, err.to_string())
    }
}

/// Convenience type alias for domain results.
pub type Result<T> = std::result::Result<T, DomainError>;
