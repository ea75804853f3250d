//! Video streaming server.
//!
//! This binary:
//! - Connects to `PostgreSQL` for the video catalog
//! - Connects to `RedPanda` to publish `viewed` events
//! - Serves `/video`, `/health` and `/metrics` until Ctrl+C or SIGTERM
//!
//! # Usage
//!
//! ```bash
//! PORT=3000 DATABASE_URL=postgres://localhost/videos REDPANDA_BROKERS=localhost:9092 \
//!     cargo run --bin video-streaming
//! ```

use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use video_streaming::Config;
use viewtrack_core::event_bus::EventBus;
use viewtrack_core::publisher::ViewPublisher;
use viewtrack_projections::PostgresVideoCatalog;
use viewtrack_redpanda::RedpandaEventBus;
use viewtrack_runtime::{MetricsRecorder, RetryPolicy, retry_with_backoff, shutdown_signal};
use viewtrack_web::{AppState, build_router};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "info,video_streaming=debug,viewtrack_core=debug,viewtrack_web=debug,sqlx=warn".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env().context("Invalid configuration")?;
    tracing::info!(
        address = %config.server.address(),
        redpanda = %config.redpanda.brokers,
        topic = %config.redpanda.topic,
        storage = %config.storage_path.display(),
        "Configuration loaded"
    );

    let metrics = MetricsRecorder::install()?;

    let startup = RetryPolicy::builder()
        .max_retries(config.postgres.startup_retries)
        .initial_delay(Duration::from_secs(1))
        .max_delay(Duration::from_secs(10))
        .build();
    let pool = retry_with_backoff(&startup, "connect to PostgreSQL", || {
        viewtrack_projections::connect(&config.postgres.url, config.postgres.max_connections)
    })
    .await
    .context("Failed to connect to PostgreSQL")?;
    viewtrack_projections::migrate(&pool).await?;
    tracing::info!("Video catalog connected");

    let event_bus: Arc<dyn EventBus> = Arc::new(
        RedpandaEventBus::builder()
            .brokers(&config.redpanda.brokers)
            .build()?,
    );
    let publisher = ViewPublisher::new(event_bus)
        .with_topic(&config.redpanda.topic)
        .with_timeout(config.publish_timeout);

    let state = AppState::new(
        Arc::new(PostgresVideoCatalog::new(pool)),
        publisher,
        &config.storage_path,
        metrics,
    );

    let address = config.server.address();
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind {address}"))?;
    tracing::info!(%address, "Video streaming service online");

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}
