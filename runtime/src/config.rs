//! Environment configuration shared by the services.
//!
//! Values come from a lookup function rather than straight from the process
//! environment, so parsing can be tested with a plain map:
//!
//! ```rust
//! use std::collections::HashMap;
//! use viewtrack_runtime::config::ServerConfig;
//!
//! let env = HashMap::from([("PORT", "3000")]);
//! let server = ServerConfig::from_lookup(|name| env.get(name).map(ToString::to_string)).unwrap();
//! assert_eq!(server.address(), "0.0.0.0:3000");
//! ```
//!
//! Empty values count as unset.

use std::fmt::Display;
use std::str::FromStr;
use thiserror::Error;

/// Configuration errors. Fatal at startup.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A required variable is unset or empty
    #[error("Please specify {name} ({what})")]
    Missing {
        /// Variable name
        name: &'static str,
        /// What the variable configures
        what: &'static str,
    },

    /// A variable is set but cannot be parsed
    #[error("Invalid value '{value}' for {name}: {reason}")]
    Invalid {
        /// Variable name
        name: &'static str,
        /// Offending value
        value: String,
        /// Parser message
        reason: String,
    },
}

/// Read a variable through `lookup`, treating empty values as unset.
fn get(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    lookup(name).filter(|value| !value.trim().is_empty())
}

/// Read a required variable.
///
/// # Errors
///
/// Returns [`ConfigError::Missing`] if the variable is unset or empty.
pub fn required(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    what: &'static str,
) -> Result<String, ConfigError> {
    get(lookup, name).ok_or(ConfigError::Missing { name, what })
}

/// Read and parse a required variable.
///
/// # Errors
///
/// Returns [`ConfigError::Missing`] if unset, [`ConfigError::Invalid`] if unparseable.
pub fn required_parsed<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    what: &'static str,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    let value = required(lookup, name, what)?;
    parse(name, value)
}

/// Read and parse an optional variable, falling back to `default`.
///
/// # Errors
///
/// Returns [`ConfigError::Invalid`] if the variable is set but unparseable.
pub fn optional<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    get(lookup, name).map_or(Ok(default), |value| parse(name, value))
}

fn parse<T>(name: &'static str, value: String) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        name,
        value,
        reason: e.to_string(),
    })
}

/// HTTP listener settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Interface to bind (`HOST`, default `0.0.0.0`)
    pub host: String,
    /// Port to bind (`PORT`, required)
    pub port: u16,
}

impl ServerConfig {
    /// Parse from `HOST` and `PORT`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if `PORT` is missing or not a port number.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        Ok(Self {
            host: optional(&lookup, "HOST", "0.0.0.0".to_string())?,
            port: required_parsed(&lookup, "PORT", "the port number for the HTTP server")?,
        })
    }

    /// `host:port`, ready for a TCP listener.
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// `PostgreSQL` connection settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostgresConfig {
    /// Connection URL (`DATABASE_URL`, required)
    pub url: String,
    /// Pool size (`DATABASE_MAX_CONNECTIONS`, default 5)
    pub max_connections: u32,
    /// Connection retries at startup (`STARTUP_RETRIES`, default 5)
    pub startup_retries: usize,
}

impl PostgresConfig {
    /// Parse from `DATABASE_URL`, `DATABASE_MAX_CONNECTIONS` and `STARTUP_RETRIES`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if `DATABASE_URL` is missing or a number is malformed.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        Ok(Self {
            url: required(&lookup, "DATABASE_URL", "the PostgreSQL connection URL")?,
            max_connections: optional(&lookup, "DATABASE_MAX_CONNECTIONS", 5)?,
            startup_retries: optional(&lookup, "STARTUP_RETRIES", 5)?,
        })
    }
}

/// Redpanda settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedpandaConfig {
    /// Comma-separated broker list (`REDPANDA_BROKERS`, required)
    pub brokers: String,
    /// Topic view events travel on (`VIEWED_TOPIC`, default `viewed`)
    pub topic: String,
}

impl RedpandaConfig {
    /// Parse from `REDPANDA_BROKERS` and `VIEWED_TOPIC`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Missing`] if `REDPANDA_BROKERS` is unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        Ok(Self {
            brokers: required(&lookup, "REDPANDA_BROKERS", "the Redpanda broker addresses")?,
            topic: optional(&lookup, "VIEWED_TOPIC", viewtrack_core::event::VIEWED_TOPIC.to_string())?,
        })
    }
}
