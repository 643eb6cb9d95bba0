//! # Engine Configuration
//!
//! Typed configuration for the command pipeline, retries, telemetry, history and
//! event publishing. Every section has defaults so an engine can be built with
//! `EngineConfig::default()`; [`ConfigManager`] layers files and environment
//! variables on top.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use process_engine::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load_from_file("config/engine.toml", "development")?;
//! let attempts = manager.config().retry.max_attempts;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// Command pipeline behavior
    pub command: CommandSettings,

    /// Retry policy for conflicting commands
    pub retry: RetryConfig,

    /// Logging settings
    pub telemetry: TelemetryConfig,

    /// History recording
    pub history: HistoryConfig,

    /// Engine event publishing
    pub events: EventsConfig,
}

impl EngineConfig {
    /// Validate cross-field constraints
    pub fn validate(&self) -> ConfigResult<()> {
        self.retry.validate()?;

        if self.events.channel_capacity == 0 {
            return Err(ConfigurationError::invalid_value(
                "events.channel_capacity",
                self.events.channel_capacity,
                "must be greater than zero",
            ));
        }

        match self.telemetry.log_level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
            other => Err(ConfigurationError::invalid_value(
                "telemetry.log_level",
                other,
                "expected one of trace, debug, info, warn, error",
            )),
        }
    }
}

/// Command pipeline settings
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct CommandSettings {
    /// Nested commands join the active command context instead of being refused
    pub context_reuse_possible: bool,

    /// Wrap each top-level command in a transaction boundary
    pub transactions_enabled: bool,
}

impl Default for CommandSettings {
    fn default() -> Self {
        Self {
            context_reuse_possible: true,
            transactions_enabled: true,
        }
    }
}

/// Exponential backoff for retryable (conflict) failures
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts including the first one
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 50,
            max_delay_ms: 2_000,
            multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Delay before the given retry (1-based retry number)
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1) as i32;
        let millis = (self.base_delay_ms as f64) * self.multiplier.powi(exponent);
        let capped = millis.min(self.max_delay_ms as f64).max(0.0);
        Duration::from_millis(capped as u64)
    }

    fn validate(&self) -> ConfigResult<()> {
        if self.max_attempts == 0 {
            return Err(ConfigurationError::invalid_value(
                "retry.max_attempts",
                self.max_attempts,
                "at least one attempt is required",
            ));
        }
        if self.multiplier < 1.0 {
            return Err(ConfigurationError::invalid_value(
                "retry.multiplier",
                self.multiplier,
                "must be >= 1.0",
            ));
        }
        if self.base_delay_ms > self.max_delay_ms {
            return Err(ConfigurationError::invalid_value(
                "retry.base_delay_ms",
                self.base_delay_ms,
                "must not exceed retry.max_delay_ms",
            ));
        }
        Ok(())
    }
}

/// Logging settings
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct TelemetryConfig {
    pub log_level: String,
    pub json_output: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_output: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct HistoryConfig {
    pub enabled: bool,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct EventsConfig {
    pub channel_capacity: usize,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 1000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.command.context_reuse_possible);
        assert!(config.command.transactions_enabled);
        assert_eq!(config.retry.max_attempts, 3);
    }

    #[test]
    fn test_backoff_is_capped() {
        let retry = RetryConfig {
            max_attempts: 10,
            base_delay_ms: 100,
            max_delay_ms: 500,
            multiplier: 2.0,
        };
        assert_eq!(retry.delay_for_retry(1), Duration::from_millis(100));
        assert_eq!(retry.delay_for_retry(2), Duration::from_millis(200));
        assert_eq!(retry.delay_for_retry(3), Duration::from_millis(400));
        assert_eq!(retry.delay_for_retry(4), Duration::from_millis(500));
    }

    #[test]
    fn test_invalid_log_level_rejected() {
        let mut config = EngineConfig::default();
        config.telemetry.log_level = "verbose".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigurationError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_zero_attempts_rejected() {
        let mut config = EngineConfig::default();
        config.retry.max_attempts = 0;
        assert!(config.validate().is_err());
    }
}
