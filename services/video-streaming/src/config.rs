//! Configuration management for the video streaming service.

use std::path::PathBuf;
use std::time::Duration;
use viewtrack_core::publisher::DEFAULT_PUBLISH_TIMEOUT;
use viewtrack_runtime::ConfigError;
use viewtrack_runtime::config::{PostgresConfig, RedpandaConfig, ServerConfig, optional};

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
/// | `VIDEO_STORAGE_PATH` | `./videos` |
/// | `PUBLISH_TIMEOUT_MS` | 2000 |
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// HTTP listener
    pub server: ServerConfig,
    /// Catalog database
    pub postgres: PostgresConfig,
    /// Broker for view events
    pub redpanda: RedpandaConfig,
    /// Directory the catalog's file references resolve against
    pub storage_path: PathBuf,
    /// Upper bound on a single publish
    pub publish_timeout: Duration,
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
        let default_timeout_ms = u64::try_from(DEFAULT_PUBLISH_TIMEOUT.as_millis()).unwrap_or(u64::MAX);

        Ok(Self {
            server: ServerConfig::from_lookup(&lookup)?,
            postgres: PostgresConfig::from_lookup(&lookup)?,
            redpanda: RedpandaConfig::from_lookup(&lookup)?,
            storage_path: optional(&lookup, "VIDEO_STORAGE_PATH", PathBuf::from("./videos"))?,
            publish_timeout: Duration::from_millis(optional(
                &lookup,
                "PUBLISH_TIMEOUT_MS",
                default_timeout_ms,
            )?),
        })
    }
}
