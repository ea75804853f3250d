//! Prometheus scrape endpoint.

use axum::{extract::State, http::header, response::IntoResponse};
use viewtrack_runtime::MetricsRecorder;

/// Render every registered metric in the Prometheus text format.
///
/// ```text
/// GET /metrics
/// ```
#[allow(clippy::unused_async)]
pub async fn render_metrics(State(metrics): State<MetricsRecorder>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics.render(),
    )
}
