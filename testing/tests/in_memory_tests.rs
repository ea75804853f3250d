//! Tests for the in-memory backends

#![allow(clippy::unwrap_used)] // Tests can unwrap
#![allow(clippy::expect_used)] // Tests can expect

use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use viewtrack_core::catalog::VideoCatalog;
use viewtrack_core::counter::{CounterStoreError, ViewCounterStore};
use viewtrack_core::event_bus::{Acknowledgement, EventBus};
use viewtrack_testing::{InMemoryEventBus, InMemoryVideoCatalog, InMemoryViewCounterStore};

const TIMEOUT: Duration = Duration::from_secs(1);

#[tokio::test]
async fn test_publish_fans_out_to_every_subscriber() {
    let bus = InMemoryEventBus::new();
    let mut first = bus.subscribe("viewed").await.unwrap();
    let mut second = bus.subscribe("viewed").await.unwrap();

    bus.publish("viewed", b"hello").await.unwrap();

    for stream in [&mut first, &mut second] {
        let delivery = stream.next().await.unwrap().unwrap();
        assert_eq!(delivery.payload(), b"hello");
        assert!(!delivery.redelivered());
        delivery.settle(Acknowledgement::Ack);
    }
    assert_eq!(bus.acked_count(), 2);
}

#[tokio::test]
async fn test_topics_are_isolated() {
    let bus = InMemoryEventBus::new();
    let mut viewed = bus.subscribe("viewed").await.unwrap();

    bus.publish("other", b"ignored").await.unwrap();
    bus.publish("viewed", b"seen").await.unwrap();

    let delivery = viewed.next().await.unwrap().unwrap();
    assert_eq!(delivery.topic(), "viewed");
    assert_eq!(delivery.payload(), b"seen");
}

#[tokio::test]
async fn test_nack_redelivers_with_flag() {
    let bus = InMemoryEventBus::new();
    let mut stream = bus.subscribe("viewed").await.unwrap();
    bus.publish("viewed", b"retry me").await.unwrap();

    let first = stream.next().await.unwrap().unwrap();
    first.settle(Acknowledgement::Nack);

    let second = stream.next().await.unwrap().unwrap();
    assert_eq!(second.payload(), b"retry me");
    assert!(second.redelivered());
    second.settle(Acknowledgement::Ack);

    assert_eq!(bus.nacked_count(), 1);
    assert_eq!(bus.acked_count(), 1);
}

#[tokio::test]
async fn test_dropped_delivery_is_redelivered() {
    let bus = InMemoryEventBus::new();
    let mut stream = bus.subscribe("viewed").await.unwrap();
    bus.publish("viewed", b"lost").await.unwrap();

    drop(stream.next().await.unwrap().unwrap());

    let again = stream.next().await.unwrap().unwrap();
    assert!(again.redelivered());
    assert_eq!(again.payload(), b"lost");
}

#[tokio::test]
async fn test_publish_without_subscribers_is_recorded_but_not_delivered() {
    let bus = InMemoryEventBus::new();
    bus.publish("viewed", b"early").await.unwrap();

    let mut late = bus.subscribe("viewed").await.unwrap();
    bus.publish("viewed", b"late").await.unwrap();

    let delivery = late.next().await.unwrap().unwrap();
    assert_eq!(delivery.payload(), b"late");
    assert_eq!(bus.published_count("viewed"), 2);
}

#[tokio::test]
async fn test_publish_failure_toggle() {
    let bus = InMemoryEventBus::new();
    bus.fail_publishes(true);
    assert!(bus.publish("viewed", b"x").await.is_err());
    assert_eq!(bus.published_count("viewed"), 0);

    bus.fail_publishes(false);
    bus.publish("viewed", b"x").await.unwrap();
    assert_eq!(bus.published("viewed"), vec![b"x".to_vec()]);
}

#[tokio::test]
async fn test_dropped_subscription_is_pruned() {
    let bus = InMemoryEventBus::new();
    let stream = bus.subscribe("viewed").await.unwrap();
    assert!(bus.wait_for_subscribers("viewed", 1, TIMEOUT).await);

    drop(stream);
    bus.publish("viewed", b"x").await.unwrap();
    assert_eq!(bus.subscriber_count("viewed"), 0);
}

#[tokio::test]
async fn test_counter_store_records_and_ranks() {
    let store = InMemoryViewCounterStore::new();
    for video in ["b.mp4", "a.mp4", "a.mp4", "c.mp4", "c.mp4"] {
        store.record_view(video).await.unwrap();
    }

    let top = store.top_n(2).await.unwrap();
    let ranked: Vec<(&str, u64)> = top.iter().map(|c| (c.video.as_str(), c.views)).collect();
    assert_eq!(ranked, vec![("a.mp4", 2), ("c.mp4", 2)]);
    assert!(top.iter().all(|c| c.last_viewed_at.is_some()));
}

#[tokio::test]
async fn test_counter_store_insert_conflicts_and_increment_requires_counter() {
    let store = InMemoryViewCounterStore::with_counters([("a.mp4", 3)]);

    assert!(matches!(
        store.insert("a.mp4", 1).await,
        Err(CounterStoreError::Conflict(_))
    ));
    assert!(matches!(
        store.increment_count("missing.mp4", 1).await,
        Err(CounterStoreError::NotFound(_))
    ));
    assert_eq!(store.increment_count("a.mp4", 2).await.unwrap(), 5);
}

#[tokio::test]
async fn test_counter_store_concurrent_first_views_are_not_lost() {
    let store = Arc::new(InMemoryViewCounterStore::new());

    let handles: Vec<_> = (0..25)
        .map(|_| {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.record_view("hot.mp4").await })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(store.views("hot.mp4"), Some(25));
}

#[tokio::test]
async fn test_counter_store_outages() {
    let store = InMemoryViewCounterStore::new();

    store.set_available(false);
    assert!(matches!(
        store.record_view("a.mp4").await,
        Err(CounterStoreError::Unavailable(_))
    ));
    store.set_available(true);

    store.fail_next(1);
    assert!(store.top_n(2).await.is_err());
    assert!(store.top_n(2).await.is_ok());
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_catalog_lookup_and_outage() {
    let catalog = InMemoryVideoCatalog::new().with_video("a1", "clip1.mp4");

    let record = catalog.find_video("a1").await.unwrap().unwrap();
    assert_eq!(record.video_path, "clip1.mp4");
    assert!(catalog.find_video("zz").await.unwrap().is_none());

    catalog.set_available(false);
    assert!(catalog.find_video("a1").await.is_err());
}
