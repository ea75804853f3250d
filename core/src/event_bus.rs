//! Event bus abstraction for broadcasting view events between services.
//!
//! This module provides the [`EventBus`] trait for publishing raw message bodies to a topic
//! and subscribing to them. Unlike a fire-and-forget stream, every message handed to a
//! subscriber is wrapped in a [`Delivery`] that must be settled: acknowledged once it has
//! been fully processed, or negatively acknowledged so the broker hands it out again.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐
//! │ Streaming Gateway│
//! └────────┬─────────┘
//!          │ publish("viewed", {"videoId": ...})
//!          ▼
//! ┌──────────────────┐
//! │    Event Bus     │◄─── Fan-out, at-least-once
//! └────────┬─────────┘
//!     ┌────┴────┐
//!     ▼         ▼
//! ┌───────┐ ┌───────┐
//! │ Inst. │ │ Inst. │   each consumer instance has its own subscription
//! │   A   │ │   B   │   and settles each Delivery with Ack or Nack
//! └───────┘ └───────┘
//! ```
//!
//! # Key Principles
//!
//! - **Fan-out**: every subscription sees every message published after it was created
//! - **At-least-once delivery**: a message is redelivered until it is acknowledged
//! - **Settle after processing**: acknowledge only when the side effects are durable
//!
//! # Implementations
//!
//! - `InMemoryEventBus` in `viewtrack-testing` - for tests
//! - `RedpandaEventBus` in `viewtrack-redpanda` - for production (Kafka-compatible)
//!
//! # Example
//!
//! ```rust,ignore
//! use futures::StreamExt;
//! use viewtrack_core::event_bus::{Acknowledgement, EventBus};
//!
//! async fn example(event_bus: impl EventBus) -> Result<(), Box<dyn std::error::Error>> {
//!     event_bus.publish("viewed", br#"{"videoId":"clip1.mp4"}"#).await?;
//!
//!     let mut stream = event_bus.subscribe("viewed").await?;
//!     while let Some(result) = stream.next().await {
//!         let delivery = result?;
//!         println!("{} bytes", delivery.payload().len());
//!         delivery.settle(Acknowledgement::Ack);
//!     }
//!     Ok(())
//! }
//! ```

use futures::Stream;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Errors that can occur during event bus operations.
#[derive(Error, Debug, Clone)]
pub enum EventBusError {
    /// Failed to connect to the event bus
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Failed to publish a message to a topic
    #[error("Publish failed for topic '{topic}': {reason}")]
    PublishFailed {
        /// The topic that failed
        topic: String,
        /// The reason for failure
        reason: String,
    },

    /// Failed to subscribe to a topic
    #[error("Subscription failed for topic '{topic}': {reason}")]
    SubscriptionFailed {
        /// The topic that failed to subscribe
        topic: String,
        /// The reason for failure
        reason: String,
    },

    /// Network or transport error while receiving
    #[error("Transport error: {0}")]
    TransportError(String),
}

/// How a subscriber settled a delivered message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acknowledgement {
    /// Processing finished (or the message was deliberately dropped). Do not redeliver.
    Ack,
    /// Processing hit a transient fault. Leave the message pending for redelivery.
    Nack,
}

/// Broker-side half of a [`Delivery`], told how the message was settled.
///
/// Implementations must treat being dropped without a call to [`Acker::settle`] as a
/// [`Acknowledgement::Nack`]: an unsettled message is never committed.
pub trait Acker: Send {
    /// Record the settlement decision for this message.
    fn settle(self: Box<Self>, acknowledgement: Acknowledgement);
}

/// A message handed to a subscriber, pending settlement.
pub struct Delivery {
    topic: String,
    payload: Vec<u8>,
    redelivered: bool,
    acker: Box<dyn Acker>,
}

impl Delivery {
    /// Wrap a received message together with its acknowledgement handle.
    #[must_use]
    pub fn new(
        topic: impl Into<String>,
        payload: Vec<u8>,
        redelivered: bool,
        acker: Box<dyn Acker>,
    ) -> Self {
        Self {
            topic: topic.into(),
            payload,
            redelivered,
            acker,
        }
    }

    /// Topic this message was published on.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Raw message body.
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Whether the broker has handed this message out before.
    #[must_use]
    pub const fn redelivered(&self) -> bool {
        self.redelivered
    }

    /// Settle the message.
    pub fn settle(self, acknowledgement: Acknowledgement) {
        self.acker.settle(acknowledgement);
    }
}

impl fmt::Debug for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delivery")
            .field("topic", &self.topic)
            .field("payload_len", &self.payload.len())
            .field("redelivered", &self.redelivered)
            .finish_non_exhaustive()
    }
}

/// Stream of deliveries from a subscription.
pub type DeliveryStream = Pin<Box<dyn Stream<Item = Result<Delivery, EventBusError>> + Send>>;

/// Trait for event bus implementations.
///
/// # Thread Safety
///
/// All implementations must be `Send + Sync` so a single bus can be shared between HTTP
/// handlers (publishing) and background consumers (subscribing).
///
/// # Dyn Compatibility
///
/// This trait uses explicit `Pin<Box<dyn Future>>` returns instead of `async fn`
/// to enable trait object usage (`Arc<dyn EventBus>`).
pub trait EventBus: Send + Sync {
    /// Publish a raw message body to a topic.
    ///
    /// There is no routing key: every subscription on `topic` receives a copy.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::PublishFailed`] if the broker rejects or times out the send.
    fn publish(
        &self,
        topic: &str,
        payload: &[u8],
    ) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + '_>>;

    /// Open a new exclusive subscription on `topic`.
    ///
    /// Each call creates an independent subscription, so two subscribers on the same bus
    /// both see every message (fan-out).
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::SubscriptionFailed`] if the subscription cannot be created.
    fn subscribe(
        &self,
        topic: &str,
    ) -> Pin<Box<dyn Future<Output = Result<DeliveryStream, EventBusError>> + Send + '_>>;
}

/// Something that processes one message body and decides how it is settled.
///
/// The call completes before the decision is returned, so the runtime can settle the
/// delivery strictly after the handler's side effects have happened.
pub trait MessageHandler: Send + Sync {
    /// Process one message body.
    fn on_message<'a>(
        &'a self,
        payload: &'a [u8],
    ) -> Pin<Box<dyn Future<Output = Acknowledgement> + Send + 'a>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    struct RecordingAcker(Arc<Mutex<Vec<Acknowledgement>>>);

    impl Acker for RecordingAcker {
        fn settle(self: Box<Self>, acknowledgement: Acknowledgement) {
            if let Ok(mut settled) = self.0.lock() {
                settled.push(acknowledgement);
            }
        }
    }

    #[test]
    fn delivery_forwards_settlement_to_acker() {
        let settled = Arc::new(Mutex::new(Vec::new()));
        let delivery = Delivery::new(
            "viewed",
            b"{}".to_vec(),
            false,
            Box::new(RecordingAcker(Arc::clone(&settled))),
        );

        assert_eq!(delivery.topic(), "viewed");
        assert_eq!(delivery.payload(), b"{}");
        assert!(!delivery.redelivered());

        delivery.settle(Acknowledgement::Nack);
        assert_eq!(
            settled.lock().map(|s| s.clone()).unwrap_or_default(),
            vec![Acknowledgement::Nack]
        );
    }

    #[test]
    fn event_bus_is_dyn_compatible() {
        fn assert_dyn(_: Option<Arc<dyn EventBus>>) {}
        assert_dyn(None);
    }
}
