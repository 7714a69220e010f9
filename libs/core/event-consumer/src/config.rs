//! Worker configuration

use core_config::{env_parse, ConfigError, FromEnv};
use std::time::Duration;

/// Configuration for the event worker loop
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Upper bound on a single handler invocation (render + deliver)
    pub handler_timeout_ms: u64,

    /// Initial backoff after a broker receive error
    pub initial_backoff_ms: u64,

    /// Cap for the exponential receive backoff
    pub max_backoff_secs: u64,
}

impl WorkerConfig {
    pub fn new() -> Self {
        Self {
            handler_timeout_ms: 30_000,
            initial_backoff_ms: 1_000,
            max_backoff_secs: 30,
        }
    }

    /// Builder method to set the handler timeout
    pub fn with_handler_timeout(mut self, timeout: Duration) -> Self {
        self.handler_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn handler_timeout(&self) -> Duration {
        Duration::from_millis(self.handler_timeout_ms)
    }

    /// Backoff to wait after `consecutive_errors` receive failures in a row.
    ///
    /// Doubles from `initial_backoff_ms` and never exceeds `max_backoff_secs`.
    pub fn backoff(&self, consecutive_errors: u32) -> Duration {
        let exponent = consecutive_errors.saturating_sub(1).min(16);
        let millis = self.initial_backoff_ms.saturating_mul(1u64 << exponent);
        Duration::from_millis(millis).min(Duration::from_secs(self.max_backoff_secs))
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl FromEnv for WorkerConfig {
    /// Reads:
    /// - HANDLER_TIMEOUT_MS: defaults to 30000
    /// - RECEIVE_BACKOFF_MS: defaults to 1000
    /// - RECEIVE_MAX_BACKOFF_SECS: defaults to 30
    fn from_env() -> Result<Self, ConfigError> {
        let handler_timeout_ms = env_parse("HANDLER_TIMEOUT_MS", 30_000u64)?;
        if handler_timeout_ms == 0 {
            return Err(ConfigError::ParseError {
                key: "HANDLER_TIMEOUT_MS".to_string(),
                details: "must be greater than zero".to_string(),
            });
        }

        Ok(Self {
            handler_timeout_ms,
            initial_backoff_ms: env_parse("RECEIVE_BACKOFF_MS", 1_000u64)?,
            max_backoff_secs: env_parse("RECEIVE_MAX_BACKOFF_SECS", 30u64)?,
        })
    }
}
