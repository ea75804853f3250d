//! HTTP request handlers.

pub mod health;
pub mod metrics;
pub mod video;

pub use health::health_check;
pub use metrics::render_metrics;
pub use video::stream_video;
