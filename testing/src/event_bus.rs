//! In-memory event bus with acknowledgement tracking.
//!
//! Every subscription gets its own unbounded queue, so publishing fans a message out to all
//! live subscribers. A delivery that is negatively acknowledged, or dropped without being
//! settled, goes back to the end of its subscriber's queue flagged as redelivered.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Panics only on a poisoned lock

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use viewtrack_core::event_bus::{
    Acker, Acknowledgement, Delivery, DeliveryStream, EventBus, EventBusError,
};

#[derive(Debug, Clone)]
struct Pending {
    topic: String,
    payload: Vec<u8>,
    redelivered: bool,
}

#[derive(Debug, Default)]
struct Inner {
    subscribers: HashMap<String, Vec<mpsc::UnboundedSender<Pending>>>,
    published: HashMap<String, Vec<Vec<u8>>>,
    fail_publishes: bool,
    acked: usize,
    nacked: usize,
}

/// In-memory event bus for fast, deterministic tests.
///
/// Messages published while nobody is subscribed are recorded (see
/// [`InMemoryEventBus::published`]) but delivered to no one, matching a broker topic that
/// only retains messages for existing subscriptions.
///
/// # Example
///
/// ```
/// use futures::StreamExt;
/// use viewtrack_core::event_bus::{Acknowledgement, EventBus};
/// use viewtrack_testing::InMemoryEventBus;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let bus = InMemoryEventBus::new();
/// let mut stream = bus.subscribe("viewed").await?;
///
/// bus.publish("viewed", br#"{"videoId":"a.mp4"}"#).await?;
///
/// if let Some(Ok(delivery)) = stream.next().await {
///     delivery.settle(Acknowledgement::Ack);
/// }
/// assert_eq!(bus.acked_count(), 1);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct InMemoryEventBus {
    inner: Arc<Mutex<Inner>>,
}

impl InMemoryEventBus {
    /// Create an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following publish fail (or succeed again).
    pub fn fail_publishes(&self, fail: bool) {
        self.inner.lock().unwrap().fail_publishes = fail;
    }

    /// Bodies successfully published on `topic`, in order.
    #[must_use]
    pub fn published(&self, topic: &str) -> Vec<Vec<u8>> {
        self.inner
            .lock()
            .unwrap()
            .published
            .get(topic)
            .cloned()
            .unwrap_or_default()
    }

    /// Number of bodies successfully published on `topic`.
    #[must_use]
    pub fn published_count(&self, topic: &str) -> usize {
        self.inner
            .lock()
            .unwrap()
            .published
            .get(topic)
            .map_or(0, Vec::len)
    }

    /// Number of live subscriptions on `topic`.
    #[must_use]
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.inner
            .lock()
            .unwrap()
            .subscribers
            .get(topic)
            .map_or(0, |subscribers| {
                subscribers.iter().filter(|tx| !tx.is_closed()).count()
            })
    }

    /// Deliveries settled with [`Acknowledgement::Ack`] across all subscriptions.
    #[must_use]
    pub fn acked_count(&self) -> usize {
        self.inner.lock().unwrap().acked
    }

    /// Deliveries settled with [`Acknowledgement::Nack`] or dropped unsettled.
    #[must_use]
    pub fn nacked_count(&self) -> usize {
        self.inner.lock().unwrap().nacked
    }

    /// Wait until at least `count` deliveries have been acknowledged.
    ///
    /// Returns `false` if that did not happen within `timeout`.
    pub async fn wait_for_acks(&self, count: usize, timeout: Duration) -> bool {
        self.wait_until(timeout, |inner| inner.acked >= count).await
    }

    /// Wait until at least `count` deliveries have been negatively acknowledged.
    ///
    /// Returns `false` if that did not happen within `timeout`.
    pub async fn wait_for_nacks(&self, count: usize, timeout: Duration) -> bool {
        self.wait_until(timeout, |inner| inner.nacked >= count).await
    }

    /// Wait until at least `count` bodies have been published on `topic`.
    ///
    /// For publishes that happen in a background task.
    pub async fn wait_for_published(&self, topic: &str, count: usize, timeout: Duration) -> bool {
        self.wait_until(timeout, |inner| {
            inner.published.get(topic).map_or(0, Vec::len) >= count
        })
        .await
    }

    /// Wait until `topic` has at least `count` live subscriptions.
    pub async fn wait_for_subscribers(&self, topic: &str, count: usize, timeout: Duration) -> bool {
        self.wait_until(timeout, |inner| {
            inner
                .subscribers
                .get(topic)
                .map_or(0, |subscribers| {
                    subscribers.iter().filter(|tx| !tx.is_closed()).count()
                })
                >= count
        })
        .await
    }

    async fn wait_until(&self, timeout: Duration, condition: impl Fn(&Inner) -> bool) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let done = condition(&self.inner.lock().unwrap());
            if done {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

impl EventBus for InMemoryEventBus {
    fn publish(
        &self,
        topic: &str,
        payload: &[u8],
    ) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + '_>> {
        let topic = topic.to_string();
        let payload = payload.to_vec();
        Box::pin(async move {
            let mut inner = self.inner.lock().unwrap();
            if inner.fail_publishes {
                return Err(EventBusError::PublishFailed {
                    topic,
                    reason: "publishing disabled".to_string(),
                });
            }

            if let Some(subscribers) = inner.subscribers.get_mut(&topic) {
                subscribers.retain(|tx| {
                    tx.send(Pending {
                        topic: topic.clone(),
                        payload: payload.clone(),
                        redelivered: false,
                    })
                    .is_ok()
                });
            }
            inner.published.entry(topic).or_default().push(payload);
            Ok(())
        })
    }

    fn subscribe(
        &self,
        topic: &str,
    ) -> Pin<Box<dyn Future<Output = Result<DeliveryStream, EventBusError>> + Send + '_>> {
        let topic = topic.to_string();
        Box::pin(async move {
            let (tx, mut rx) = mpsc::unbounded_channel::<Pending>();
            self.inner
                .lock()
                .unwrap()
                .subscribers
                .entry(topic)
                .or_default()
                .push(tx.clone());

            let inner = Arc::clone(&self.inner);
            let stream = async_stream::stream! {
                while let Some(pending) = rx.recv().await {
                    let acker = InMemoryAcker {
                        queue: tx.clone(),
                        inner: Arc::clone(&inner),
                        message: Some(pending.clone()),
                    };
                    yield Ok::<_, EventBusError>(Delivery::new(
                        pending.topic,
                        pending.payload,
                        pending.redelivered,
                        Box::new(acker),
                    ));
                }
            };
            Ok(Box::pin(stream) as DeliveryStream)
        })
    }
}

struct InMemoryAcker {
    queue: mpsc::UnboundedSender<Pending>,
    inner: Arc<Mutex<Inner>>,
    message: Option<Pending>,
}

impl InMemoryAcker {
    fn requeue(&mut self) {
        if let Some(mut pending) = self.message.take() {
            self.inner.lock().unwrap().nacked += 1;
            pending.redelivered = true;
            // The subscription may already be gone, in which case there is no one to redeliver to.
            let _ = self.queue.send(pending);
        }
    }
}

impl Acker for InMemoryAcker {
    fn settle(mut self: Box<Self>, acknowledgement: Acknowledgement) {
        match acknowledgement {
            Acknowledgement::Ack => {
                if self.message.take().is_some() {
                    self.inner.lock().unwrap().acked += 1;
                }
            }
            Acknowledgement::Nack => self.requeue(),
        }
    }
}

impl Drop for InMemoryAcker {
    fn drop(&mut self) {
        self.requeue();
    }
}
