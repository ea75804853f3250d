//! Redpanda event bus for the view pipeline.
//!
//! Implements [`EventBus`] from `viewtrack-core` on top of rdkafka, so any
//! Kafka-compatible broker works (Redpanda, Apache Kafka, MSK).
//!
//! # Fan-out
//!
//! A bus built without a consumer group gets a unique group of its own
//! (`<topic>-<uuid>`), starting at the latest offset. Every process therefore
//! receives every message published after it subscribed, like an exclusive queue bound to
//! a fanout exchange. Setting [`RedpandaEventBusBuilder::consumer_group`] switches to
//! work-sharing between all processes using that group.
//!
//! Kafka cannot auto-delete a group. When a process exits its private group is left
//! empty, and the broker drops it with its offsets after `offsets.retention.minutes`.
//! A restarted process always starts a fresh group.
//!
//! # Delivery Semantics
//!
//! **At-least-once delivery**, gated on the subscriber's decision:
//! - Each message is handed out as a [`Delivery`] and the partition waits for it to be
//!   settled before the next message is read
//! - `Ack` commits the offset
//! - `Nack` (or dropping the delivery) seeks back to the same offset, so the message is
//!   read again
//! - A crash before the commit means redelivery from the last committed offset
//!
//! # Example
//!
//! ```no_run
//! use viewtrack_redpanda::RedpandaEventBus;
//! use viewtrack_core::event_bus::{Acknowledgement, EventBus};
//! use futures::StreamExt;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let event_bus = RedpandaEventBus::new("localhost:9092")?;
//!
//! event_bus.publish("viewed", br#"{"videoId":"clip1.mp4"}"#).await?;
//!
//! let mut stream = event_bus.subscribe("viewed").await?;
//! while let Some(result) = stream.next().await {
//!     let delivery = result?;
//!     println!("Received {} bytes", delivery.payload().len());
//!     delivery.settle(Acknowledgement::Ack);
//! }
//! # Ok(())
//! # }
//! ```

use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::Message;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use rdkafka::Offset;
use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use viewtrack_core::event_bus::{
    Acker, Acknowledgement, Delivery, DeliveryStream, EventBus, EventBusError,
};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);
const SEEK_TIMEOUT: Duration = Duration::from_secs(5);

/// Redpanda event bus implementation.
///
/// # Example
///
/// ```no_run
/// use viewtrack_redpanda::RedpandaEventBus;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// // One private group per process: every instance sees every view
/// let event_bus = RedpandaEventBus::new("localhost:9092")?;
///
/// // Shared group: instances split the partitions between them
/// let event_bus = RedpandaEventBus::builder()
///     .brokers("localhost:9092,localhost:9093")
///     .consumer_group("recommendations")
///     .producer_acks("all")
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct RedpandaEventBus {
    producer: FutureProducer,
    brokers: String,
    timeout: Duration,
    consumer_group: ConsumerGroup,
    auto_offset_reset: String,
}

/// How subscriptions pick their consumer group.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ConsumerGroup {
    /// Shared, named group
    Named(String),
    /// Private to this bus instance
    Anonymous(uuid::Uuid),
}

impl ConsumerGroup {
    fn anonymous() -> Self {
        Self::Anonymous(uuid::Uuid::new_v4())
    }

    fn group_id(&self, topic: &str) -> String {
        match self {
            Self::Named(group) => group.clone(),
            Self::Anonymous(instance) => format!("{topic}-{instance}"),
        }
    }
}

impl RedpandaEventBus {
    /// Create a new Redpanda event bus with default configuration.
    ///
    /// # Parameters
    ///
    /// - `brokers`: Comma-separated list of broker addresses (e.g., "localhost:9092")
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::ConnectionFailed`] if the producer cannot be created.
    pub fn new(brokers: &str) -> Result<Self, EventBusError> {
        Self::builder().brokers(brokers).build()
    }

    /// Create a new builder for configuring the event bus.
    #[must_use]
    pub fn builder() -> RedpandaEventBusBuilder {
        RedpandaEventBusBuilder::default()
    }

    /// Broker addresses this bus connects to.
    #[must_use]
    pub fn brokers(&self) -> &str {
        &self.brokers
    }

    /// Consumer group a subscription on `topic` joins.
    #[must_use]
    pub fn consumer_group_for(&self, topic: &str) -> String {
        self.consumer_group.group_id(topic)
    }

    fn consumer_config(&self, group_id: &str) -> ClientConfig {
        let mut config = ClientConfig::new();
        config
            .set("bootstrap.servers", &self.brokers)
            .set("group.id", group_id)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", &self.auto_offset_reset)
            .set("session.timeout.ms", "6000")
            .set("enable.partition.eof", "false");
        config
    }
}

/// Builder for configuring a [`RedpandaEventBus`].
#[derive(Default)]
pub struct RedpandaEventBusBuilder {
    brokers: Option<String>,
    producer_acks: Option<String>,
    compression: Option<String>,
    timeout: Option<Duration>,
    consumer_group: Option<String>,
    auto_offset_reset: Option<String>,
}

impl RedpandaEventBusBuilder {
    /// Set the broker addresses (comma-separated).
    #[must_use]
    pub fn brokers(mut self, brokers: impl Into<String>) -> Self {
        self.brokers = Some(brokers.into());
        self
    }

    /// Set the producer acknowledgment mode: "0", "1" or "all". Default: "1"
    #[must_use]
    pub fn producer_acks(mut self, acks: impl Into<String>) -> Self {
        self.producer_acks = Some(acks.into());
        self
    }

    /// Set the compression codec: "none", "gzip", "snappy", "lz4", "zstd". Default: "none"
    #[must_use]
    pub fn compression(mut self, compression: impl Into<String>) -> Self {
        self.compression = Some(compression.into());
        self
    }

    /// Set the producer send timeout. Default: 5 seconds
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Share a named consumer group instead of a private one per bus.
    ///
    /// Instances in the same group split the topic's partitions, so each message reaches
    /// only one of them.
    #[must_use]
    pub fn consumer_group(mut self, consumer_group: impl Into<String>) -> Self {
        self.consumer_group = Some(consumer_group.into());
        self
    }

    /// Where a group without committed offsets starts reading: "earliest" or "latest".
    /// Default: "latest"
    #[must_use]
    pub fn auto_offset_reset(mut self, policy: impl Into<String>) -> Self {
        self.auto_offset_reset = Some(policy.into());
        self
    }

    /// Build the [`RedpandaEventBus`].
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::ConnectionFailed`] if brokers are not set or the producer
    /// configuration is rejected.
    pub fn build(self) -> Result<RedpandaEventBus, EventBusError> {
        let brokers = self
            .brokers
            .filter(|b| !b.trim().is_empty())
            .ok_or_else(|| EventBusError::ConnectionFailed("Brokers not configured".to_string()))?;
        let acks = self.producer_acks.unwrap_or_else(|| "1".to_string());
        let compression = self.compression.unwrap_or_else(|| "none".to_string());
        let timeout = self.timeout.unwrap_or(DEFAULT_TIMEOUT);

        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &brokers)
            .set("message.timeout.ms", timeout.as_millis().to_string())
            .set("acks", &acks)
            .set("compression.type", &compression)
            .create()
            .map_err(|e| {
                EventBusError::ConnectionFailed(format!("Failed to create producer: {e}"))
            })?;

        let consumer_group = self
            .consumer_group
            .map_or_else(ConsumerGroup::anonymous, ConsumerGroup::Named);
        let auto_offset_reset = self
            .auto_offset_reset
            .unwrap_or_else(|| "latest".to_string());

        tracing::info!(
            brokers = %brokers,
            acks = %acks,
            compression = %compression,
            consumer_group = ?consumer_group,
            auto_offset_reset = %auto_offset_reset,
            "RedpandaEventBus created"
        );

        Ok(RedpandaEventBus {
            producer,
            brokers,
            timeout,
            consumer_group,
            auto_offset_reset,
        })
    }
}

impl EventBus for RedpandaEventBus {
    fn publish(
        &self,
        topic: &str,
        payload: &[u8],
    ) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + '_>> {
        let topic = topic.to_string();
        let payload = payload.to_vec();

        Box::pin(async move {
            // No key: views carry no ordering requirement, let the partitioner spread them.
            let record = FutureRecord::<(), [u8]>::to(&topic).payload(&payload);

            match self.producer.send(record, Timeout::After(self.timeout)).await {
                Ok((partition, offset)) => {
                    tracing::debug!(topic = %topic, partition, offset, "Message published");
                    Ok(())
                }
                Err((kafka_error, _)) => Err(EventBusError::PublishFailed {
                    topic,
                    reason: kafka_error.to_string(),
                }),
            }
        })
    }

    fn subscribe(
        &self,
        topic: &str,
    ) -> Pin<Box<dyn Future<Output = Result<DeliveryStream, EventBusError>> + Send + '_>> {
        let topic = topic.to_string();

        Box::pin(async move {
            let group_id = self.consumer_group.group_id(&topic);
            let consumer: StreamConsumer = self.consumer_config(&group_id).create().map_err(|e| {
                EventBusError::SubscriptionFailed {
                    topic: topic.clone(),
                    reason: format!("Failed to create consumer: {e}"),
                }
            })?;

            consumer
                .subscribe(&[topic.as_str()])
                .map_err(|e| EventBusError::SubscriptionFailed {
                    topic: topic.clone(),
                    reason: format!("Failed to subscribe: {e}"),
                })?;

            tracing::info!(
                topic = %topic,
                consumer_group = %group_id,
                auto_offset_reset = %self.auto_offset_reset,
                "Subscribed to topic"
            );

            // One delivery in flight at a time: the next message is only read once the
            // previous one has been settled.
            let (tx, rx) = mpsc::channel(1);
            tokio::spawn(forward_deliveries(consumer, tx));

            let stream = async_stream::stream! {
                let mut rx = rx;
                while let Some(result) = rx.recv().await {
                    yield result;
                }
            };

            Ok(Box::pin(stream) as DeliveryStream)
        })
    }
}

/// Owns the consumer: hands out each message and applies its settlement.
async fn forward_deliveries(
    consumer: StreamConsumer,
    tx: mpsc::Sender<Result<Delivery, EventBusError>>,
) {
    use futures::StreamExt;

    let mut stream = consumer.stream();
    // Positions handed out before and nacked, so their next read is flagged.
    let mut nacked: HashSet<(i32, i64)> = HashSet::new();

    while let Some(next) = stream.next().await {
        let message = match next {
            Ok(message) => message,
            Err(e) => {
                let err = EventBusError::TransportError(format!("Failed to receive message: {e}"));
                if tx.send(Err(err)).await.is_err() {
                    break;
                }
                continue;
            }
        };

        let topic = message.topic().to_string();
        let position = (message.partition(), message.offset());
        let redelivered = nacked.contains(&position);
        let payload = message.payload().unwrap_or_default().to_vec();

        let (ack_tx, ack_rx) = oneshot::channel();
        let delivery = Delivery::new(
            topic.clone(),
            payload,
            redelivered,
            Box::new(RedpandaAcker { tx: ack_tx }),
        );
        if tx.send(Ok(delivery)).await.is_err() {
            tracing::debug!("Subscriber dropped, exiting consumer task without committing");
            break;
        }

        // A dropped acker closes the channel, which counts as a nack.
        let acknowledgement = ack_rx.await.unwrap_or(Acknowledgement::Nack);
        match acknowledgement {
            Acknowledgement::Ack => {
                nacked.remove(&position);
                if let Err(e) = consumer.commit_message(&message, CommitMode::Async) {
                    tracing::warn!(
                        topic = %topic,
                        partition = position.0,
                        offset = position.1,
                        error = %e,
                        "Failed to commit offset (message may be redelivered)"
                    );
                }
            }
            Acknowledgement::Nack => {
                nacked.insert(position);
                if let Err(e) = consumer.seek(
                    &topic,
                    position.0,
                    Offset::Offset(position.1),
                    Timeout::After(SEEK_TIMEOUT),
                ) {
                    // Without the seek the partition would move past an unprocessed
                    // message. Ending the stream forces a resubscribe from the last commit.
                    tracing::error!(
                        topic = %topic,
                        partition = position.0,
                        offset = position.1,
                        error = %e,
                        "Failed to rewind for redelivery, closing subscription"
                    );
                    break;
                }
            }
        }
    }

    tracing::debug!("Consumer task exiting");
}

/// Passes the subscriber's decision back to the consumer task.
struct RedpandaAcker {
    tx: oneshot::Sender<Acknowledgement>,
}

impl Acker for RedpandaAcker {
    fn settle(self: Box<Self>, acknowledgement: Acknowledgement) {
        // The consumer task is gone only if the subscription is shutting down.
        let _ = self.tx.send(acknowledgement);
    }
}
