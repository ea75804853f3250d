//! # Viewtrack Runtime
//!
//! Long-running machinery shared by the services.
//!
//! ## Core Components
//!
//! - **`EventConsumer`**: subscribe/process/settle/reconnect loop around a
//!   [`viewtrack_core::event_bus::MessageHandler`]
//! - **Retry**: exponential backoff for startup connections and redelivery pacing
//! - **Metrics**: Prometheus recorder behind the `metrics` facade
//! - **Config**: environment parsing shared by the service binaries
//!
//! ## Example
//!
//! ```ignore
//! use viewtrack_runtime::{EventConsumer, MetricsRecorder};
//!
//! let metrics = MetricsRecorder::install()?;
//! let (shutdown_tx, shutdown_rx) = tokio::sync::broadcast::channel(1);
//!
//! let handle = EventConsumer::builder()
//!     .topic("viewed")
//!     .event_bus(event_bus)
//!     .handler(handler)
//!     .shutdown(shutdown_rx)
//!     .build()?
//!     .spawn();
//!
//! shutdown_tx.send(())?;
//! handle.await?;
//! ```

/// Environment configuration
pub mod config;

/// Event consumer loop with acknowledgement and reconnection
pub mod consumer;

/// Prometheus metrics for observability
pub mod metrics;

/// Retry logic with exponential backoff
pub mod retry;

/// Ctrl+C and SIGTERM handling
pub mod shutdown;

pub use config::ConfigError;
pub use consumer::{ConsumerBuildError, EventConsumer, EventConsumerBuilder};
pub use metrics::{MetricsError, MetricsRecorder};
pub use retry::{Backoff, RetryPolicy, retry_with_backoff};
pub use shutdown::shutdown_signal;
