//! Saga configuration.

use std::time::Duration;

use crate::error::{Result, SagaError};

/// Default delay before an unacknowledged cook request is retried.
pub const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(5);

/// Longest accepted retry delay.
pub const MAX_RETRY_AFTER: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SagaConfig {
    /// How long a saga waits for a stage to report back before re-sending
    /// the forward command.
    pub retry_after: Duration,
}

impl Default for SagaConfig {
    fn default() -> Self {
        Self {
            retry_after: DEFAULT_RETRY_AFTER,
        }
    }
}

impl SagaConfig {
    pub fn with_retry_after(retry_after: Duration) -> Result<Self> {
        let config = Self { retry_after };
        config.validate()?;
        Ok(config)
    }

    /// A zero retry delay would re-send the forward command on every tick;
    /// delays above [`MAX_RETRY_AFTER`] are refused.
    pub fn validate(&self) -> Result<()> {
        if self.retry_after.is_zero() {
            return Err(SagaError::InvalidConfig(
                "retry_after must be greater than zero".to_string(),
            ));
        }
        if self.retry_after > MAX_RETRY_AFTER {
            return Err(SagaError::InvalidConfig(format!(
                "retry_after must not exceed {MAX_RETRY_AFTER:?}"
            )));
        }
        Ok(())
    }
}
