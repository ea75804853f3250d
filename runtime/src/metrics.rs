//! Prometheus metrics for the view pipeline.
//!
//! Components record through the `metrics` facade (`counter!`, `histogram!`); this module
//! installs the Prometheus recorder behind that facade and renders the text exposition
//! format served at `GET /metrics`.
//!
//! # Example
//!
//! ```rust,no_run
//! use viewtrack_runtime::metrics::MetricsRecorder;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let recorder = MetricsRecorder::install()?;
//! let body = recorder.render();
//! # Ok(())
//! # }
//! ```

use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use thiserror::Error;

/// Errors from metrics setup.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

const LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0,
];

/// Handle to the Prometheus recorder.
#[derive(Clone)]
pub struct MetricsRecorder {
    handle: PrometheusHandle,
}

impl std::fmt::Debug for MetricsRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsRecorder").finish_non_exhaustive()
    }
}

impl MetricsRecorder {
    /// Install the Prometheus recorder as the process-wide `metrics` recorder.
    ///
    /// Call once per process, at startup.
    ///
    /// # Errors
    ///
    /// Returns [`MetricsError::Install`] if another recorder is already installed.
    pub fn install() -> Result<Self, MetricsError> {
        let handle = builder()?
            .install_recorder()
            .map_err(|e| MetricsError::Install(e.to_string()))?;
        describe_metrics();
        tracing::info!("Prometheus metrics recorder installed");
        Ok(Self { handle })
    }

    /// Build a recorder without installing it globally.
    ///
    /// Renders an empty exposition; meant for tests and embedding.
    ///
    /// # Errors
    ///
    /// Returns [`MetricsError::Build`] if the exporter configuration is invalid.
    pub fn detached() -> Result<Self, MetricsError> {
        let recorder = builder()?.build_recorder();
        Ok(Self {
            handle: recorder.handle(),
        })
    }

    /// Render current metrics in the Prometheus text format.
    #[must_use]
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

fn builder() -> Result<PrometheusBuilder, MetricsError> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Suffix("duration_seconds".to_string()),
            LATENCY_BUCKETS,
        )
        .map_err(|e| MetricsError::Build(e.to_string()))
}

fn describe_metrics() {
    // Publishing side
    describe_counter!(
        "viewtrack_views_published_total",
        "Viewed events handed to the event bus"
    );
    describe_counter!(
        "viewtrack_publish_failures_total",
        "Viewed events that could not be published"
    );

    // Consuming side
    describe_counter!(
        "viewtrack_views_recorded_total",
        "Views applied to the counter store"
    );
    describe_counter!(
        "viewtrack_malformed_events_total",
        "Messages dropped because they were not viewed events"
    );
    describe_counter!(
        "viewtrack_redeliveries_total",
        "Messages received again after a nack or an unacknowledged crash"
    );
    describe_histogram!(
        "viewtrack_message_processing_duration_seconds",
        "Time from receiving a message to settling it"
    );
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn test_detached_recorder_renders() {
        let recorder = MetricsRecorder::detached().unwrap();
        // Nothing recorded into a recorder that was never installed.
        assert!(!recorder.render().contains("viewtrack_views_recorded_total"));
    }
}
