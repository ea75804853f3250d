//! Subscribe, process, settle, reconnect.
//!
//! `EventConsumer` owns the loop around a [`MessageHandler`]: it subscribes to a topic,
//! hands every delivery's body to the handler, settles the delivery with the handler's
//! decision, and resubscribes whenever the stream ends or cannot be opened.
//!
//! ```text
//! loop {
//!     subscribe (backoff on failure)
//!     for each delivery:
//!         ack = handler.on_message(payload)     // runs to completion
//!         delivery.settle(ack)
//!         if ack == Nack: wait (growing delay), so a dead store is not hammered
//!     stream ended: resubscribe
//! }
//! ```
//!
//! Shutdown is only observed between messages, never while a handler is running, so a
//! message is either fully processed and settled or not taken at all.
//!
//! # Example
//!
//! ```rust,ignore
//! let consumer = EventConsumer::builder()
//!     .name("recommendations")
//!     .topic("viewed")
//!     .event_bus(event_bus)
//!     .handler(Arc::new(view_consumer))
//!     .shutdown(shutdown_rx)
//!     .build()?;
//!
//! let handle = consumer.spawn();
//! ```

use crate::retry::{Backoff, RetryPolicy};
use futures::StreamExt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use viewtrack_core::event_bus::{Acknowledgement, Delivery, DeliveryStream, EventBus, MessageHandler};

/// Errors from assembling an [`EventConsumer`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConsumerBuildError {
    /// A required builder field was not set
    #[error("EventConsumer is missing required field '{0}'")]
    MissingField(&'static str),
}

/// Why processing of one stream stopped.
enum StreamEnd {
    Shutdown,
    Disconnected,
}

/// Long-running consumer of one topic.
pub struct EventConsumer {
    name: String,
    topic: String,
    event_bus: Arc<dyn EventBus>,
    handler: Arc<dyn MessageHandler>,
    shutdown: broadcast::Receiver<()>,
    redelivery: Backoff,
    reconnect: Backoff,
}

impl EventConsumer {
    /// Create a builder for configuring a consumer.
    #[must_use]
    pub fn builder() -> EventConsumerBuilder {
        EventConsumerBuilder::default()
    }

    /// Spawn the consumer as a background task.
    ///
    /// The task ends when the shutdown signal fires (or its sender is dropped).
    #[must_use]
    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Run until shutdown.
    pub async fn run(mut self) {
        info!(consumer = %self.name, topic = %self.topic, "Event consumer started");

        loop {
            let subscribed = tokio::select! {
                _ = self.shutdown.recv() => break,
                result = self.event_bus.subscribe(&self.topic) => result,
            };

            match subscribed {
                Ok(mut stream) => {
                    info!(consumer = %self.name, topic = %self.topic, "Subscribed to event bus");
                    self.reconnect.reset();
                    if matches!(self.process_stream(&mut stream).await, StreamEnd::Shutdown) {
                        break;
                    }
                    let delay = self.reconnect.next_delay();
                    warn!(consumer = %self.name, ?delay, "Event stream ended, resubscribing");
                    if self.pause(delay).await {
                        break;
                    }
                }
                Err(e) => {
                    let delay = self.reconnect.next_delay();
                    error!(
                        consumer = %self.name,
                        error = %e,
                        ?delay,
                        "Failed to subscribe to event bus, retrying"
                    );
                    if self.pause(delay).await {
                        break;
                    }
                }
            }
        }

        info!(consumer = %self.name, "Event consumer stopped");
    }

    async fn process_stream(&mut self, stream: &mut DeliveryStream) -> StreamEnd {
        loop {
            let next = tokio::select! {
                _ = self.shutdown.recv() => return StreamEnd::Shutdown,
                next = stream.next() => next,
            };

            match next {
                Some(Ok(delivery)) => {
                    if self.handle(delivery).await == Acknowledgement::Nack {
                        let delay = self.redelivery.next_delay();
                        warn!(
                            consumer = %self.name,
                            consecutive_failures = self.redelivery.failures(),
                            ?delay,
                            "Message left for redelivery, backing off"
                        );
                        if self.pause(delay).await {
                            return StreamEnd::Shutdown;
                        }
                    } else {
                        self.redelivery.reset();
                    }
                }
                Some(Err(e)) => {
                    error!(consumer = %self.name, error = %e, "Error receiving from event stream");
                }
                None => return StreamEnd::Disconnected,
            }
        }
    }

    async fn handle(&self, delivery: Delivery) -> Acknowledgement {
        if delivery.redelivered() {
            metrics::counter!("viewtrack_redeliveries_total").increment(1);
        }

        let started = Instant::now();
        let acknowledgement = self.handler.on_message(delivery.payload()).await;
        delivery.settle(acknowledgement);
        metrics::histogram!("viewtrack_message_processing_duration_seconds")
            .record(started.elapsed().as_secs_f64());

        acknowledgement
    }

    /// Sleep for `delay`; returns `true` if shutdown was requested meanwhile.
    async fn pause(&mut self, delay: Duration) -> bool {
        tokio::select! {
            _ = self.shutdown.recv() => true,
            () = tokio::time::sleep(delay) => false,
        }
    }
}

/// Builder for configuring an [`EventConsumer`].
#[derive(Default)]
pub struct EventConsumerBuilder {
    name: Option<String>,
    topic: Option<String>,
    event_bus: Option<Arc<dyn EventBus>>,
    handler: Option<Arc<dyn MessageHandler>>,
    shutdown: Option<broadcast::Receiver<()>>,
    redelivery: Option<RetryPolicy>,
    reconnect: Option<RetryPolicy>,
}

impl EventConsumerBuilder {
    /// Set consumer name (for logging).
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the topic to consume.
    #[must_use]
    pub fn topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    /// Set event bus instance.
    #[must_use]
    pub fn event_bus(mut self, event_bus: Arc<dyn EventBus>) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    /// Set the message handler.
    #[must_use]
    pub fn handler(mut self, handler: Arc<dyn MessageHandler>) -> Self {
        self.handler = Some(handler);
        self
    }

    /// Set shutdown signal receiver.
    #[must_use]
    pub fn shutdown(mut self, shutdown: broadcast::Receiver<()>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Delays between consecutive negatively acknowledged messages.
    ///
    /// Only `initial_delay`, `max_delay` and `multiplier` apply; redelivery never gives up.
    #[must_use]
    pub fn redelivery_policy(mut self, policy: RetryPolicy) -> Self {
        self.redelivery = Some(policy);
        self
    }

    /// Delays between failed or ended subscriptions (default: 1s doubling up to 30s).
    #[must_use]
    pub fn reconnect_policy(mut self, policy: RetryPolicy) -> Self {
        self.reconnect = Some(policy);
        self
    }

    /// Build the `EventConsumer`.
    ///
    /// # Errors
    ///
    /// Returns [`ConsumerBuildError::MissingField`] if topic, event bus, handler or
    /// shutdown receiver is not set.
    pub fn build(self) -> Result<EventConsumer, ConsumerBuildError> {
        let topic = self.topic.ok_or(ConsumerBuildError::MissingField("topic"))?;
        Ok(EventConsumer {
            name: self.name.unwrap_or_else(|| topic.clone()),
            event_bus: self
                .event_bus
                .ok_or(ConsumerBuildError::MissingField("event_bus"))?,
            handler: self
                .handler
                .ok_or(ConsumerBuildError::MissingField("handler"))?,
            shutdown: self
                .shutdown
                .ok_or(ConsumerBuildError::MissingField("shutdown"))?,
            redelivery: Backoff::new(self.redelivery.unwrap_or_default()),
            reconnect: Backoff::new(self.reconnect.unwrap_or_else(|| {
                RetryPolicy::builder()
                    .initial_delay(Duration::from_secs(1))
                    .max_delay(Duration::from_secs(30))
                    .build()
            })),
            topic,
        })
    }
}
