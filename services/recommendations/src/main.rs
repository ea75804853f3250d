//! Recommendations server.
//!
//! This binary:
//! - Connects to `PostgreSQL` for the view counters
//! - Subscribes to `viewed` events on `RedPanda`
//! - Counts each view and logs a recommendation
//! - Serves `/health` and `/metrics` until Ctrl+C or SIGTERM
//!
//! # Usage
//!
//! ```bash
//! PORT=3001 DATABASE_URL=postgres://localhost/recommendations REDPANDA_BROKERS=localhost:9092 \
//!     cargo run --bin recommendations
//! ```

use anyhow::Context;
use recommendations::Config;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use viewtrack_core::consumer::ViewConsumer;
use viewtrack_core::event_bus::EventBus;
use viewtrack_projections::PostgresViewCounterStore;
use viewtrack_redpanda::RedpandaEventBus;
use viewtrack_runtime::{
    EventConsumer, MetricsRecorder, RetryPolicy, retry_with_backoff, shutdown_signal,
};
use viewtrack_web::operational_router;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "info,recommendations=debug,viewtrack_core=debug,viewtrack_runtime=debug,sqlx=warn"
                    .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env().context("Invalid configuration")?;
    tracing::info!(
        address = %config.server.address(),
        redpanda = %config.redpanda.brokers,
        topic = %config.redpanda.topic,
        consumer_group = ?config.consumer_group,
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
    tracing::info!("View counters connected");

    let mut bus = RedpandaEventBus::builder().brokers(&config.redpanda.brokers);
    if let Some(group) = &config.consumer_group {
        bus = bus.consumer_group(group);
    }
    let event_bus: Arc<dyn EventBus> = Arc::new(bus.build()?);

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let consumer = EventConsumer::builder()
        .name("recommendations")
        .topic(&config.redpanda.topic)
        .event_bus(event_bus)
        .handler(Arc::new(ViewConsumer::new(Arc::new(
            PostgresViewCounterStore::new(pool),
        ))))
        .shutdown(shutdown_rx)
        .redelivery_policy(config.redelivery.clone())
        .build()?
        .spawn();

    let address = config.server.address();
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind {address}"))?;
    tracing::info!(%address, "Recommendations service online");

    axum::serve(listener, operational_router(metrics))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // No receiver left means the consumer already stopped
    let _ = shutdown_tx.send(());
    consumer.await.context("Consumer task failed")?;

    tracing::info!("Server stopped");
    Ok(())
}
