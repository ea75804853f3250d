//! Tests for the view consumer against in-memory backends

#![allow(clippy::unwrap_used)] // Tests can unwrap
#![allow(clippy::expect_used)] // Tests can expect

use std::sync::Arc;
use viewtrack_core::consumer::{ConsumerError, ViewConsumer};
use viewtrack_core::counter::{self, CounterStoreError, ViewCounter, ViewCounterStore};
use viewtrack_core::event::encode;
use viewtrack_core::event_bus::{Acknowledgement, MessageHandler};
use viewtrack_core::recommendation::Recommendation;
use viewtrack_testing::{InMemoryViewCounterStore, init_test_tracing};

fn consumer_with(store: &Arc<InMemoryViewCounterStore>) -> ViewConsumer<InMemoryViewCounterStore> {
    init_test_tracing();
    ViewConsumer::new(Arc::clone(store))
}

#[tokio::test]
async fn test_first_view_creates_counter_and_recommends_itself() {
    let store = Arc::new(InMemoryViewCounterStore::new());
    let consumer = consumer_with(&store);

    let processed = consumer.process(&encode("clip1.mp4")).await.unwrap();

    assert_eq!(processed.video_id, "clip1.mp4");
    assert_eq!(processed.views, 1);
    // Only one entry exists, so it is recommended even though it was just watched.
    assert_eq!(
        processed.recommendation,
        Recommendation::Video("clip1.mp4".to_string())
    );
    assert_eq!(store.views("clip1.mp4"), Some(1));
}

#[tokio::test]
async fn test_recommends_runner_up_when_just_viewed_is_top() {
    let store = Arc::new(InMemoryViewCounterStore::with_counters([
        ("A", 9),
        ("B", 7),
        ("C", 1),
    ]));
    let consumer = consumer_with(&store);

    let processed = consumer.process(&encode("A")).await.unwrap();

    assert_eq!(processed.views, 10);
    assert_eq!(processed.recommendation, Recommendation::Video("B".to_string()));
}

#[tokio::test]
async fn test_recommends_top_when_another_video_is_viewed() {
    let store = Arc::new(InMemoryViewCounterStore::with_counters([("B", 9), ("A", 2)]));
    let consumer = consumer_with(&store);

    let processed = consumer.process(&encode("A")).await.unwrap();

    assert_eq!(processed.views, 3);
    assert_eq!(processed.recommendation, Recommendation::Video("B".to_string()));
}

#[tokio::test]
async fn test_just_viewed_can_overtake_before_selection() {
    let store = Arc::new(InMemoryViewCounterStore::with_counters([("B", 5), ("A", 5)]));
    let consumer = consumer_with(&store);

    // A reaches 6 and becomes the top entry, so the runner-up B is recommended.
    let processed = consumer.process(&encode("A")).await.unwrap();

    assert_eq!(processed.recommendation, Recommendation::Video("B".to_string()));
}

#[tokio::test]
async fn test_legacy_path_is_normalized() {
    let store = Arc::new(InMemoryViewCounterStore::new());
    let consumer = consumer_with(&store);

    let processed = consumer
        .process(br#"{"videoPath":"videos/clip1.mp4"}"#)
        .await
        .unwrap();

    assert_eq!(processed.video_id, "clip1.mp4");
    assert_eq!(store.views("clip1.mp4"), Some(1));
}

#[tokio::test]
async fn test_malformed_body_is_acked_without_counting() {
    let store = Arc::new(InMemoryViewCounterStore::new());
    let consumer = consumer_with(&store);

    assert!(matches!(
        consumer.process(b"not json").await,
        Err(ConsumerError::Malformed(_))
    ));
    assert_eq!(consumer.on_message(b"not json").await, Acknowledgement::Ack);
    assert_eq!(consumer.on_message(br#"{"videoId":""}"#).await, Acknowledgement::Ack);
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_store_outage_is_nacked() {
    let store = Arc::new(InMemoryViewCounterStore::new());
    let consumer = consumer_with(&store);
    store.set_available(false);

    assert_eq!(consumer.on_message(&encode("A")).await, Acknowledgement::Nack);

    store.set_available(true);
    assert_eq!(consumer.on_message(&encode("A")).await, Acknowledgement::Ack);
    assert_eq!(store.views("A"), Some(1));
}

/// Counts views normally but cannot answer ranking queries.
struct RankingOutage(InMemoryViewCounterStore);

impl ViewCounterStore for RankingOutage {
    async fn find_by_video(&self, video: &str) -> counter::Result<Option<ViewCounter>> {
        self.0.find_by_video(video).await
    }

    async fn insert(&self, video: &str, views: u64) -> counter::Result<()> {
        self.0.insert(video, views).await
    }

    async fn increment_count(&self, video: &str, delta: u64) -> counter::Result<u64> {
        self.0.increment_count(video, delta).await
    }

    async fn top_n(&self, _n: usize) -> counter::Result<Vec<ViewCounter>> {
        Err(CounterStoreError::Unavailable("ranking offline".to_string()))
    }
}

#[tokio::test]
async fn test_failure_after_increment_is_nacked() {
    init_test_tracing();
    let inner = InMemoryViewCounterStore::with_counters([("A", 1)]);
    let consumer = ViewConsumer::new(Arc::new(RankingOutage(inner.clone())));

    assert_eq!(consumer.on_message(&encode("A")).await, Acknowledgement::Nack);

    // The increment already happened; redelivery will count it a second time.
    assert_eq!(inner.views("A"), Some(2));
}

#[tokio::test]
async fn test_redelivered_event_counts_again() {
    let store = Arc::new(InMemoryViewCounterStore::new());
    let consumer = consumer_with(&store);
    let payload = encode("A");

    // Processed once but never acknowledged, then handed out again.
    consumer.process(&payload).await.unwrap();
    consumer.process(&payload).await.unwrap();

    assert_eq!(store.views("A"), Some(2));
}

#[tokio::test]
async fn test_concurrent_events_lose_no_updates() {
    let store = Arc::new(InMemoryViewCounterStore::new());
    let consumer = consumer_with(&store);

    let handles: Vec<_> = (0..40)
        .map(|_| {
            let consumer = consumer.clone();
            tokio::spawn(async move { consumer.on_message(&encode("hot.mp4")).await })
        })
        .collect();
    for handle in handles {
        assert_eq!(handle.await.unwrap(), Acknowledgement::Ack);
    }

    assert_eq!(store.views("hot.mp4"), Some(40));
}

#[tokio::test]
async fn test_consumer_is_usable_as_message_handler() {
    let store = Arc::new(InMemoryViewCounterStore::new());
    let handler: Arc<dyn MessageHandler> = Arc::new(consumer_with(&store));

    assert_eq!(handler.on_message(&encode("A")).await, Acknowledgement::Ack);
    assert_eq!(store.views("A"), Some(1));
}
