//! Router construction for both services.

use crate::handlers::{health_check, render_metrics, stream_video};
use crate::state::AppState;
use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;
use viewtrack_runtime::MetricsRecorder;

/// Router of the video-streaming service: `/video`, `/health` and `/metrics`.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/video", get(stream_video))
        .route("/health", get(health_check))
        .route("/metrics", get(render_metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Router of a service with no public API of its own: `/health` and `/metrics` only.
pub fn operational_router(metrics: MetricsRecorder) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(render_metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(metrics)
}
