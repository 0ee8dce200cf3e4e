//! Application configuration loaded from environment variables.

use std::time::Duration;

use crate::kitchen::KitchenConfig;

/// Server and kitchen configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default: `3000`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `COOK_QUEUE_LIMIT`: per-cook queue limit for load-aware dispatch (default: `5`)
/// - `COOK_RETRY_AFTER_MS`: cook timeout before a retry (default: `5000`)
/// - `WORKER_POLL_MS`: queue worker dequeue wait (default: `1000`)
/// - `ALARM_TICK_MS`: alarm clock granularity (default: `1000`)
/// - `MONITOR_INTERVAL_MS`: monitor sweep interval (default: `5000`)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub cook_queue_limit: usize,
    pub cook_retry_after: Duration,
    pub worker_poll: Duration,
    pub alarm_tick: Duration,
    pub monitor_interval: Duration,
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_millis(key: &str, default: u64) -> Duration {
    Duration::from_millis(env_or(key, default))
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self {
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env_or("PORT", 3000),
            log_level: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            cook_queue_limit: env_or("COOK_QUEUE_LIMIT", 5),
            cook_retry_after: env_millis("COOK_RETRY_AFTER_MS", 5000),
            worker_poll: env_millis("WORKER_POLL_MS", 1000),
            alarm_tick: env_millis("ALARM_TICK_MS", 1000),
            monitor_interval: env_millis("MONITOR_INTERVAL_MS", 5000),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Kitchen settings derived from this configuration.
    pub fn kitchen(&self) -> KitchenConfig {
        KitchenConfig {
            cook_queue_limit: self.cook_queue_limit,
            retry_after: self.cook_retry_after,
            worker_poll: self.worker_poll,
            alarm_tick: self.alarm_tick,
            monitor_interval: self.monitor_interval,
            ..KitchenConfig::default()
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            cook_queue_limit: 5,
            cook_retry_after: Duration::from_secs(5),
            worker_poll: Duration::from_secs(1),
            alarm_tick: Duration::from_secs(1),
            monitor_interval: Duration::from_secs(5),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let config = Config::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.cook_queue_limit, 5);
        assert_eq!(config.cook_retry_after, Duration::from_millis(5000));
    }

    #[test]
    fn test_addr_formatting() {
        let config = Config {
            host: "127.0.0.1".to_string(),
            port: 8080,
            ..Config::default()
        };
        assert_eq!(config.addr(), "127.0.0.1:8080");
    }

    #[test]
    fn test_kitchen_settings_follow_config() {
        let config = Config {
            cook_queue_limit: 2,
            worker_poll: Duration::from_millis(50),
            ..Config::default()
        };
        let kitchen = config.kitchen();
        assert_eq!(kitchen.cook_queue_limit, 2);
        assert_eq!(kitchen.worker_poll, Duration::from_millis(50));
        assert_eq!(kitchen.cooks.len(), 3);
    }

    #[test]
    fn test_unparsable_value_falls_back() {
        assert_eq!(env_or("API_CONFIG_TEST_UNSET_KEY", 7usize), 7);
    }
}
