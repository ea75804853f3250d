//! Configuration management for the recommendations service.

use std::time::Duration;
use viewtrack_runtime::config::{PostgresConfig, RedpandaConfig, ServerConfig, optional};
use viewtrack_runtime::{ConfigError, RetryPolicy};

/// Service configuration loaded from environment variables.
///
/// | Variable | Default |
/// |----------|---------|
/// | `PORT` | required |
/// | `HOST` | `0.0.0.0` |
/// | `DATABASE_URL` | required |
/// | `DATABASE_MAX_CONNECTIONS` | 5 |
/// | `STARTUP_RETRIES` | 5 |
/// | `REDPANDA_BROKERS` | required |
/// | `VIEWED_TOPIC` | `viewed` |
/// | `CONSUMER_GROUP` | unset: private group per instance |
/// | `REDELIVERY_INITIAL_DELAY_MS` | 100 |
/// | `REDELIVERY_MAX_DELAY_MS` | 30000 |
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// HTTP listener for health and metrics
    pub server: ServerConfig,
    /// Counter database
    pub postgres: PostgresConfig,
    /// Broker for view events
    pub redpanda: RedpandaConfig,
    /// Shared consumer group; `None` gives every instance every event
    pub consumer_group: Option<String>,
    /// Pacing between redeliveries of a message that could not be processed
    pub redelivery: RetryPolicy,
}

impl Config {
    /// Load configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a required variable is missing or a value is malformed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a required variable is missing or a value is malformed.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let initial_delay = optional(&lookup, "REDELIVERY_INITIAL_DELAY_MS", 100_u64)?;
        let max_delay = optional(&lookup, "REDELIVERY_MAX_DELAY_MS", 30_000_u64)?;

        Ok(Self {
            server: ServerConfig::from_lookup(&lookup)?,
            postgres: PostgresConfig::from_lookup(&lookup)?,
            redpanda: RedpandaConfig::from_lookup(&lookup)?,
            consumer_group: lookup("CONSUMER_GROUP").filter(|group| !group.trim().is_empty()),
            redelivery: RetryPolicy::builder()
                .initial_delay(Duration::from_millis(initial_delay))
                .max_delay(Duration::from_millis(max_delay))
                .build(),
        })
    }
}
