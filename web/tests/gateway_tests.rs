//! End-to-end tests of the streaming gateway against in-memory backends.

#![allow(clippy::unwrap_used)] // Tests can unwrap
#![allow(clippy::expect_used)] // Tests can expect

use axum::http::{HeaderValue, StatusCode, header};
use axum_test::TestServer;
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use viewtrack_core::event::VIEWED_TOPIC;
use viewtrack_core::event_bus::{DeliveryStream, EventBus, EventBusError};
use viewtrack_core::publisher::ViewPublisher;
use viewtrack_runtime::MetricsRecorder;
use viewtrack_testing::{InMemoryEventBus, InMemoryVideoCatalog};
use viewtrack_web::{AppState, build_router};

const WAIT: Duration = Duration::from_secs(2);

const CLIP: &[u8] = b"\x00\x00\x00\x18ftypmp42 not really a video";

struct Gateway {
    server: TestServer,
    bus: InMemoryEventBus,
    catalog: InMemoryVideoCatalog,
    _storage: TempDir,
}

fn gateway() -> Gateway {
    let bus = InMemoryEventBus::new();
    gateway_with(Arc::new(bus.clone()), bus)
}

/// `publish_bus` is what the publisher talks to; `bus` is kept for assertions.
fn gateway_with(publish_bus: Arc<dyn EventBus>, bus: InMemoryEventBus) -> Gateway {
    let storage = tempfile::tempdir().unwrap();
    std::fs::write(storage.path().join("clip1.mp4"), CLIP).unwrap();

    let catalog = InMemoryVideoCatalog::new()
        .with_video("a1", "clip1.mp4")
        .with_video("clip1.mp4", "clip1.mp4")
        .with_video("gone", "deleted.mp4");
    let publisher = ViewPublisher::new(publish_bus);

    let state = AppState::new(
        Arc::new(catalog.clone()),
        publisher,
        storage.path(),
        MetricsRecorder::detached().unwrap(),
    );

    Gateway {
        server: TestServer::new(build_router(state)).unwrap(),
        bus,
        catalog,
        _storage: storage,
    }
}

#[tokio::test]
async fn range_request_streams_file_and_publishes_one_view() {
    let gw = gateway();

    let response = gw
        .server
        .get("/video")
        .add_query_param("id", "a1")
        .add_header(header::RANGE, HeaderValue::from_static("bytes=0-"))
        .await;

    response.assert_status(StatusCode::OK);
    assert_eq!(response.header(header::CONTENT_TYPE), "video/mp4");
    assert_eq!(
        response.header(header::CONTENT_LENGTH),
        CLIP.len().to_string().as_str()
    );
    assert_eq!(response.as_bytes().as_ref(), CLIP);

    assert!(gw.bus.wait_for_published(VIEWED_TOPIC, 1, WAIT).await);
    let published = gw.bus.published(VIEWED_TOPIC);
    assert_eq!(published.len(), 1);
    let event: Value = serde_json::from_slice(&published[0]).unwrap();
    assert_eq!(event, serde_json::json!({ "videoId": "a1" }));
}

#[tokio::test]
async fn range_request_for_file_named_id_publishes_that_id() {
    let gw = gateway();

    gw.server
        .get("/video")
        .add_query_param("id", "clip1.mp4")
        .add_header(header::RANGE, HeaderValue::from_static("bytes=0-1023"))
        .await
        .assert_status(StatusCode::OK);

    assert!(gw.bus.wait_for_published(VIEWED_TOPIC, 1, WAIT).await);
    let published = gw.bus.published(VIEWED_TOPIC);
    assert_eq!(published, vec![br#"{"videoId":"clip1.mp4"}"#.to_vec()]);
}

#[tokio::test]
async fn plain_request_streams_without_publishing() {
    let gw = gateway();

    let response = gw.server.get("/video").add_query_param("id", "a1").await;

    response.assert_status(StatusCode::OK);
    assert_eq!(response.as_bytes().as_ref(), CLIP);
    assert_eq!(gw.bus.published_count(VIEWED_TOPIC), 0);
}

#[tokio::test]
async fn missing_id_is_bad_request() {
    let gw = gateway();

    let response = gw.server.get("/video").await;
    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["code"], "BAD_REQUEST");
    assert_eq!(body["message"], "Missing video ID");

    gw.server
        .get("/video")
        .add_query_param("id", "")
        .await
        .assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_video_is_not_found_and_never_published() {
    let gw = gateway();

    let response = gw
        .server
        .get("/video")
        .add_query_param("id", "nope")
        .add_header(header::RANGE, HeaderValue::from_static("bytes=0-"))
        .await;

    response.assert_status(StatusCode::NOT_FOUND);
    assert_eq!(gw.bus.published_count(VIEWED_TOPIC), 0);
}

#[tokio::test]
async fn missing_file_is_not_found_and_never_published() {
    let gw = gateway();

    let response = gw
        .server
        .get("/video")
        .add_query_param("id", "gone")
        .add_header(header::RANGE, HeaderValue::from_static("bytes=0-"))
        .await;

    response.assert_status(StatusCode::NOT_FOUND);
    assert_eq!(gw.bus.published_count(VIEWED_TOPIC), 0);
}

#[tokio::test]
async fn catalog_outage_is_service_unavailable() {
    let gw = gateway();
    gw.catalog.set_available(false);

    let response = gw.server.get("/video").add_query_param("id", "a1").await;

    response.assert_status(StatusCode::SERVICE_UNAVAILABLE);
    let body: Value = response.json();
    assert_eq!(body["code"], "SERVICE_UNAVAILABLE");
}

#[tokio::test]
async fn broker_failure_does_not_affect_the_response() {
    let gw = gateway();
    gw.bus.fail_publishes(true);

    let response = gw
        .server
        .get("/video")
        .add_query_param("id", "a1")
        .add_header(header::RANGE, HeaderValue::from_static("bytes=0-"))
        .await;

    response.assert_status(StatusCode::OK);
    assert_eq!(response.as_bytes().as_ref(), CLIP);
}

#[tokio::test]
async fn health_and_metrics_are_served() {
    let gw = gateway();

    let health = gw.server.get("/health").await;
    health.assert_status(StatusCode::OK);
    let body: Value = health.json();
    assert_eq!(body["status"], "ok");

    gw.server.get("/metrics").await.assert_status(StatusCode::OK);
}

/// Accepts publishes and never completes them.
struct StalledBus;

impl EventBus for StalledBus {
    fn publish(
        &self,
        _topic: &str,
        _payload: &[u8],
    ) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + '_>> {
        Box::pin(futures::future::pending())
    }

    fn subscribe(
        &self,
        topic: &str,
    ) -> Pin<Box<dyn Future<Output = Result<DeliveryStream, EventBusError>> + Send + '_>> {
        let topic = topic.to_string();
        Box::pin(async move {
            Err(EventBusError::SubscriptionFailed {
                topic,
                reason: "not supported".to_string(),
            })
        })
    }
}

#[tokio::test]
async fn stalled_broker_does_not_delay_playback() {
    let gw = gateway_with(Arc::new(StalledBus), InMemoryEventBus::new());

    let started = Instant::now();
    let response = gw
        .server
        .get("/video")
        .add_query_param("id", "a1")
        .add_header(header::RANGE, HeaderValue::from_static("bytes=0-"))
        .await;
    let elapsed = started.elapsed();

    response.assert_status(StatusCode::OK);
    assert_eq!(response.as_bytes().as_ref(), CLIP);
    // Default publish timeout is 2s; the response must not wait for it
    assert!(
        elapsed < Duration::from_millis(500),
        "range response took {elapsed:?}"
    );
}
