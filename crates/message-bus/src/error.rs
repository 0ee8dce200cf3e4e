//! Bus error types.

use thiserror::Error;

/// Errors produced by the bus and the components wired onto it.
#[derive(Debug, Error)]
pub enum BusError {
    /// A handler refused or failed to process a message.
    #[error("Handler '{handler}' failed: {reason}")]
    Handler { handler: String, reason: String },

    /// A handler panicked while processing a message.
    #[error("Handler '{handler}' panicked: {message}")]
    Panicked { handler: String, message: String },

    /// A processor thread was started twice.
    #[error("Processor '{0}' is already running")]
    AlreadyRunning(String),

    /// The OS refused to spawn a processor thread.
    #[error("Failed to spawn processor '{name}': {source}")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },

    /// A load-aware dispatcher had to wait for capacity but no worker is running.
    #[error("No running worker can accept messages")]
    NoRunningWorkers,

    /// A dispatcher was built without any downstream handler.
    #[error("Dispatcher requires at least one handler")]
    NoHandlers,

    /// The alarm clock received a message that carries no delayed-delivery request.
    #[error("Message of kind '{0}' is not a delayed delivery request")]
    NotDeferred(&'static str),

    /// The requested delay cannot be represented on the monotonic clock.
    #[error("Delay of {0:?} is out of range")]
    DelayOutOfRange(std::time::Duration),

    /// Chaos ratios outside `0..=1` or summing to more than one.
    #[error("Invalid chaos ratios: loose={loose}, duplication={duplication}")]
    InvalidChaosRatios { loose: f64, duplication: f64 },

    /// The durable journal rejected a message.
    #[error("Journal error: {0}")]
    Journal(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl BusError {
    /// Convenience constructor for handler failures.
    pub fn handler(handler: impl Into<String>, reason: impl Into<String>) -> Self {
        BusError::Handler {
            handler: handler.into(),
            reason: reason.into(),
        }
    }
}

/// Convenience type alias for bus results.
pub type Result<T> = std::result::Result<T, BusError>;
