//! Applies view events to the counter store and recommends a video.
//!
//! # Settlement rules
//!
//! | Outcome                         | Settlement | Why it is safe                          |
//! |---------------------------------|------------|-----------------------------------------|
//! | Counted and recommended         | Ack        | side effects are durable                |
//! | Undecodable body                | Ack        | retrying can never succeed              |
//! | Counter store unreachable       | Nack       | redelivery repeats an atomic increment  |
//!
//! Redelivery is not deduplicated: a message that is processed twice (because the
//! process died before acknowledging it) counts twice. The guarantee is that every
//! increment is atomic, not that repeats are suppressed.

use crate::counter::{CounterStoreError, ViewCounterStore};
use crate::event::{EventError, decode};
use crate::event_bus::{Acknowledgement, MessageHandler};
use crate::recommendation::{Recommendation, select};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;

/// How many of the most viewed videos the recommendation looks at.
pub const RECOMMENDATION_CANDIDATES: usize = 2;

/// Errors from processing one message.
#[derive(Error, Debug, Clone)]
pub enum ConsumerError {
    /// The body is not a viewed event
    #[error(transparent)]
    Malformed(#[from] EventError),

    /// The counter store could not be reached
    #[error("Store unavailable: {0}")]
    StoreUnavailable(#[from] CounterStoreError),
}

impl ConsumerError {
    /// How a message that failed with this error must be settled.
    #[must_use]
    pub const fn acknowledgement(&self) -> Acknowledgement {
        match self {
            Self::Malformed(_) => Acknowledgement::Ack,
            Self::StoreUnavailable(_) => Acknowledgement::Nack,
        }
    }
}

/// Result of a successfully processed view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedView {
    /// Normalized identifier of the viewed video
    pub video_id: String,
    /// Its view count after this event
    pub views: u64,
    /// What to watch next
    pub recommendation: Recommendation,
}

/// Consumer side of the `viewed` topic.
///
/// Holds no state of its own; every call is independent, so one instance may be shared
/// across concurrently running deliveries.
pub struct ViewConsumer<S> {
    store: Arc<S>,
}

impl<S> Clone for ViewConsumer<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: ViewCounterStore> ViewConsumer<S> {
    /// Create a consumer writing to `store`.
    #[must_use]
    pub const fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Decode, count and recommend.
    ///
    /// # Errors
    ///
    /// Returns [`ConsumerError::Malformed`] for bodies that are not viewed events and
    /// [`ConsumerError::StoreUnavailable`] when any store call fails.
    pub async fn process(&self, payload: &[u8]) -> Result<ProcessedView, ConsumerError> {
        let video_id = decode(payload)?;

        let views = self.store.record_view(&video_id).await?;
        metrics::counter!("viewtrack_views_recorded_total").increment(1);

        // Read after our own increment, so the video just watched competes for the top.
        let top = self.store.top_n(RECOMMENDATION_CANDIDATES).await?;
        let recommendation = select(&video_id, &top);

        Ok(ProcessedView {
            video_id,
            views,
            recommendation,
        })
    }

    /// Process one message body and decide its settlement.
    ///
    /// Never fails: malformed bodies are logged and acknowledged, store faults are logged
    /// and negatively acknowledged.
    pub async fn on_message(&self, payload: &[u8]) -> Acknowledgement {
        match self.process(payload).await {
            Ok(processed) => {
                match &processed.recommendation {
                    Recommendation::Video(video) => tracing::info!(
                        video_id = %processed.video_id,
                        views = processed.views,
                        recommended = %video,
                        "Recommended {video}"
                    ),
                    Recommendation::None => tracing::info!(
                        video_id = %processed.video_id,
                        views = processed.views,
                        "No recommendations available"
                    ),
                }
                Acknowledgement::Ack
            }
            Err(e @ ConsumerError::Malformed(_)) => {
                metrics::counter!("viewtrack_malformed_events_total").increment(1);
                tracing::error!(
                    error = %e,
                    payload = %String::from_utf8_lossy(payload),
                    "Dropping malformed viewed event"
                );
                e.acknowledgement()
            }
            Err(e @ ConsumerError::StoreUnavailable(_)) => {
                tracing::warn!(error = %e, "Leaving viewed event unacknowledged for redelivery");
                e.acknowledgement()
            }
        }
    }
}

impl<S: ViewCounterStore + 'static> MessageHandler for ViewConsumer<S> {
    fn on_message<'a>(
        &'a self,
        payload: &'a [u8],
    ) -> Pin<Box<dyn Future<Output = Acknowledgement> + Send + 'a>> {
        Box::pin(Self::on_message(self, payload))
    }
}
