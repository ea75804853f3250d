//! # Viewtrack Core
//!
//! Core traits and types for tracking video views and recommending what to watch next.
//!
//! The pipeline has two halves connected by an event bus:
//!
//! - **Publishing**: the streaming gateway reports every playback request through a
//!   [`publisher::ViewPublisher`], which emits one `viewed` event per range request.
//! - **Consuming**: a [`consumer::ViewConsumer`] bumps a [`counter::ViewCounter`] per event
//!   and runs [`recommendation::select`] over the two most viewed videos.
//!
//! Infrastructure is injected through traits:
//!
//! - [`event_bus::EventBus`] carries events (in-memory for tests, Redpanda in production)
//! - [`counter::ViewCounterStore`] persists the counters
//! - [`catalog::VideoCatalog`] resolves video identifiers to stored files
//!
//! ## Example
//!
//! ```ignore
//! use viewtrack_core::consumer::ViewConsumer;
//! use viewtrack_core::event::encode;
//!
//! let consumer = ViewConsumer::new(Arc::new(store));
//! let processed = consumer.process(&encode("clip1.mp4")).await?;
//! println!("{} has {} views", processed.video_id, processed.views);
//! ```

// Re-export commonly used types
pub use chrono::{DateTime, Utc};

/// Catalog module - Lookup of streamable videos
pub mod catalog;

/// Consumer module - Count views and pick a recommendation
pub mod consumer;

/// Counter module - View counters and their storage trait
pub mod counter;

/// Event module - The `viewed` event and its wire envelope
pub mod event;

/// Event bus module - Publish/subscribe with explicit acknowledgement
pub mod event_bus;

/// Publisher module - Turn streaming requests into view events
pub mod publisher;

/// Recommendation module - Popularity-based selection
pub mod recommendation;
