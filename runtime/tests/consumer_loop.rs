//! End-to-end tests of the consumer loop over the in-memory event bus

#![allow(clippy::unwrap_used)] // Tests can unwrap
#![allow(clippy::expect_used)] // Tests can expect

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use viewtrack_core::consumer::ViewConsumer;
use viewtrack_core::event::{VIEWED_TOPIC, encode};
use viewtrack_core::event_bus::{EventBus, MessageHandler};
use viewtrack_runtime::{ConsumerBuildError, EventConsumer, RetryPolicy};
use viewtrack_testing::{InMemoryEventBus, InMemoryViewCounterStore, init_test_tracing};

const TIMEOUT: Duration = Duration::from_secs(2);

struct Running {
    shutdown: broadcast::Sender<()>,
    handle: tokio::task::JoinHandle<()>,
}

impl Running {
    async fn stop(self) {
        let _ = self.shutdown.send(());
        tokio::time::timeout(TIMEOUT, self.handle)
            .await
            .expect("consumer did not stop")
            .unwrap();
    }
}

async fn start(bus: &Arc<InMemoryEventBus>, store: &Arc<InMemoryViewCounterStore>) -> Running {
    init_test_tracing();
    let (shutdown, shutdown_rx) = broadcast::channel(1);
    let before = bus.subscriber_count(VIEWED_TOPIC);

    let handler: Arc<dyn MessageHandler> = Arc::new(ViewConsumer::new(Arc::clone(store)));
    let handle = EventConsumer::builder()
        .name("test")
        .topic(VIEWED_TOPIC)
        .event_bus(Arc::clone(bus) as Arc<dyn EventBus>)
        .handler(handler)
        .shutdown(shutdown_rx)
        .redelivery_policy(
            RetryPolicy::builder()
                .initial_delay(Duration::from_millis(5))
                .max_delay(Duration::from_millis(20))
                .build(),
        )
        .build()
        .unwrap()
        .spawn();

    assert!(bus.wait_for_subscribers(VIEWED_TOPIC, before + 1, TIMEOUT).await);
    Running { shutdown, handle }
}

#[tokio::test]
async fn test_events_are_counted_and_acked() {
    let bus = Arc::new(InMemoryEventBus::new());
    let store = Arc::new(InMemoryViewCounterStore::new());
    let running = start(&bus, &store).await;

    for video in ["a.mp4", "b.mp4", "a.mp4"] {
        bus.publish(VIEWED_TOPIC, &encode(video)).await.unwrap();
    }

    assert!(bus.wait_for_acks(3, TIMEOUT).await);
    assert_eq!(store.views("a.mp4"), Some(2));
    assert_eq!(store.views("b.mp4"), Some(1));
    running.stop().await;
}

#[tokio::test]
async fn test_store_outage_redelivers_until_recovery() {
    let bus = Arc::new(InMemoryEventBus::new());
    let store = Arc::new(InMemoryViewCounterStore::new());
    let running = start(&bus, &store).await;

    store.set_available(false);
    bus.publish(VIEWED_TOPIC, &encode("a.mp4")).await.unwrap();
    assert!(bus.wait_for_nacks(2, TIMEOUT).await);
    assert_eq!(bus.acked_count(), 0);

    store.set_available(true);
    assert!(bus.wait_for_acks(1, TIMEOUT).await);
    assert_eq!(store.views("a.mp4"), Some(1));
    running.stop().await;
}

#[tokio::test]
async fn test_malformed_message_is_acked_and_loop_continues() {
    let bus = Arc::new(InMemoryEventBus::new());
    let store = Arc::new(InMemoryViewCounterStore::new());
    let running = start(&bus, &store).await;

    bus.publish(VIEWED_TOPIC, b"not json").await.unwrap();
    bus.publish(VIEWED_TOPIC, &encode("a.mp4")).await.unwrap();

    assert!(bus.wait_for_acks(2, TIMEOUT).await);
    assert_eq!(bus.nacked_count(), 0);
    assert_eq!(store.views("a.mp4"), Some(1));
    running.stop().await;
}

#[tokio::test]
async fn test_every_consumer_instance_sees_every_event() {
    let bus = Arc::new(InMemoryEventBus::new());
    let first_store = Arc::new(InMemoryViewCounterStore::new());
    let second_store = Arc::new(InMemoryViewCounterStore::new());
    let first = start(&bus, &first_store).await;
    let second = start(&bus, &second_store).await;

    bus.publish(VIEWED_TOPIC, &encode("a.mp4")).await.unwrap();

    assert!(bus.wait_for_acks(2, TIMEOUT).await);
    assert_eq!(first_store.views("a.mp4"), Some(1));
    assert_eq!(second_store.views("a.mp4"), Some(1));
    first.stop().await;
    second.stop().await;
}

#[tokio::test]
async fn test_shutdown_stops_the_loop() {
    let bus = Arc::new(InMemoryEventBus::new());
    let store = Arc::new(InMemoryViewCounterStore::new());
    let running = start(&bus, &store).await;

    running.stop().await;

    bus.publish(VIEWED_TOPIC, &encode("a.mp4")).await.unwrap();
    assert_eq!(bus.subscriber_count(VIEWED_TOPIC), 0);
    assert!(store.is_empty());
}

#[test]
fn test_builder_reports_missing_fields() {
    let (_tx, rx) = broadcast::channel(1);
    let result = EventConsumer::builder().topic(VIEWED_TOPIC).shutdown(rx).build();
    assert!(matches!(result, Err(ConsumerBuildError::MissingField("event_bus"))));

    let result = EventConsumer::builder().build();
    assert!(matches!(result, Err(ConsumerBuildError::MissingField("topic"))));
}
