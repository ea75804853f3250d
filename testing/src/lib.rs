//! # Viewtrack Testing
//!
//! Testing utilities for the view tracking pipeline.
//!
//! This crate provides:
//! - [`InMemoryEventBus`]: fan-out bus with Ack/Nack tracking and redelivery
//! - [`InMemoryViewCounterStore`]: counter store with injectable outages
//! - [`InMemoryVideoCatalog`]: catalog with injectable outages
//! - [`init_test_tracing`]: log output for failing tests
//!
//! ## Example
//!
//! ```ignore
//! use viewtrack_core::consumer::ViewConsumer;
//! use viewtrack_core::event::encode;
//! use viewtrack_testing::InMemoryViewCounterStore;
//!
//! #[tokio::test]
//! async fn counts_a_view() {
//!     let store = Arc::new(InMemoryViewCounterStore::new());
//!     let consumer = ViewConsumer::new(Arc::clone(&store));
//!
//!     consumer.process(&encode("a.mp4")).await.unwrap();
//!
//!     assert_eq!(store.views("a.mp4"), Some(1));
//! }
//! ```

mod catalog;
mod counter_store;
mod event_bus;

pub use catalog::InMemoryVideoCatalog;
pub use counter_store::InMemoryViewCounterStore;
pub use event_bus::InMemoryEventBus;

/// Install a test-friendly tracing subscriber.
///
/// Output goes through the test harness's capture, so it only shows up for failing tests.
/// Safe to call from every test; only the first call installs anything. Honors `RUST_LOG`
/// and defaults to `debug`.
pub fn init_test_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracing_can_be_initialized_twice() {
        init_test_tracing();
        init_test_tracing();
    }
}
