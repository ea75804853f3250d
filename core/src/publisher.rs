//! Turns streaming requests into view events.
//!
//! A request carrying a `Range` header is treated as actual playback: players fetch media
//! in ranges, while existence checks and metadata probes do not. Only those requests are
//! counted. Publishing is best effort: the caller is in the middle of serving video bytes
//! and a broker hiccup must never turn into a failed response.

use crate::event::{VIEWED_TOPIC, ViewedEvent};
use crate::event_bus::EventBus;
use std::sync::Arc;
use std::time::Duration;

/// Default upper bound on a single publish.
pub const DEFAULT_PUBLISH_TIMEOUT: Duration = Duration::from_secs(2);

/// What happened to a streaming request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    /// A view event was handed to the bus
    Published,
    /// Not a playback request, nothing sent
    Skipped,
    /// The event could not be sent; already logged
    Failed(String),
}

/// Emits one `viewed` event per genuine playback request.
#[derive(Clone)]
pub struct ViewPublisher {
    event_bus: Arc<dyn EventBus>,
    topic: String,
    timeout: Duration,
}

impl ViewPublisher {
    /// Create a publisher on the default `viewed` topic.
    #[must_use]
    pub fn new(event_bus: Arc<dyn EventBus>) -> Self {
        Self {
            event_bus,
            topic: VIEWED_TOPIC.to_string(),
            timeout: DEFAULT_PUBLISH_TIMEOUT,
        }
    }

    /// Publish on a different topic.
    #[must_use]
    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = topic.into();
        self
    }

    /// Bound how long a publish may take before it counts as failed.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Topic events are published on.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Report a streaming request for `video_id`.
    ///
    /// Publishes iff `is_range_request`. Never returns an error: failures are logged,
    /// counted and reported as [`PublishOutcome::Failed`].
    pub async fn on_stream_request(&self, video_id: &str, is_range_request: bool) -> PublishOutcome {
        if !is_range_request {
            tracing::debug!(video_id, "Non-range request, not counted as a view");
            return PublishOutcome::Skipped;
        }

        let event = match ViewedEvent::new(video_id) {
            Ok(event) => event,
            Err(e) => return self.failed(video_id, e.to_string()),
        };
        let payload = event.to_bytes();

        match tokio::time::timeout(self.timeout, self.event_bus.publish(&self.topic, &payload)).await {
            Ok(Ok(())) => {
                metrics::counter!("viewtrack_views_published_total").increment(1);
                tracing::info!(
                    topic = %self.topic,
                    video_id = %event.video_id,
                    "Published viewed event"
                );
                PublishOutcome::Published
            }
            Ok(Err(e)) => self.failed(&event.video_id, e.to_string()),
            Err(_) => self.failed(
                &event.video_id,
                format!("publish timed out after {:?}", self.timeout),
            ),
        }
    }

    fn failed(&self, video_id: &str, reason: String) -> PublishOutcome {
        metrics::counter!("viewtrack_publish_failures_total").increment(1);
        tracing::error!(
            topic = %self.topic,
            video_id,
            error = %reason,
            "Failed to publish viewed event"
        );
        PublishOutcome::Failed(reason)
    }
}
