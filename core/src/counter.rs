//! View counters: the read model built from viewed events.
//!
//! # Overview
//!
//! Every consumed view event bumps one [`ViewCounter`]. The counters are the query side of
//! the pipeline: the recommendation step reads the most-viewed entries back out.
//!
//! ```text
//! ┌──────────────┐   viewed    ┌──────────────┐   record_view   ┌──────────────────┐
//! │  Event Bus   │ ──────────► │ ViewConsumer │ ──────────────► │ ViewCounterStore │
//! └──────────────┘             └──────┬───────┘                 └────────┬─────────┘
//!                                     │            top_n(2)              │
//!                                     └◄─────────────────────────────────┘
//! ```
//!
//! The store is the serialization point for concurrent updates. Backends must make
//! [`ViewCounterStore::insert`] fail with [`CounterStoreError::Conflict`] when the entry
//! already exists and [`ViewCounterStore::increment_count`] atomic, which is enough for the
//! default [`ViewCounterStore::record_view`] to never lose an update. Backends that can do
//! the whole upsert in one statement override `record_view`.

use crate::{DateTime, Utc};
use std::cmp::Ordering;
use std::future::Future;

/// Error type for counter store operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CounterStoreError {
    /// Storage backend unreachable or failing
    #[error("Counter store unavailable: {0}")]
    Unavailable(String),

    /// Tried to insert a counter that already exists
    #[error("Counter already exists for video '{0}'")]
    Conflict(String),

    /// Tried to increment a counter that does not exist
    #[error("No counter for video '{0}'")]
    NotFound(String),

    /// Stored data cannot be represented (e.g. a negative count)
    #[error("Corrupt counter data: {0}")]
    Corrupt(String),
}

/// Result type for counter store operations.
pub type Result<T> = std::result::Result<T, CounterStoreError>;

/// Number of views recorded for one video.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewCounter {
    /// Video identifier (bare file name, no directories)
    pub video: String,
    /// Views recorded so far
    pub views: u64,
    /// When the last view was recorded, if the backend tracks it
    pub last_viewed_at: Option<DateTime<Utc>>,
}

impl ViewCounter {
    /// Create a counter without a timestamp.
    #[must_use]
    pub fn new(video: impl Into<String>, views: u64) -> Self {
        Self {
            video: video.into(),
            views,
            last_viewed_at: None,
        }
    }
}

/// Ordering used by every `top_n` implementation: most views first, then ascending video
/// identifier so equal counts always come back in the same order.
#[must_use]
pub fn by_popularity(a: &ViewCounter, b: &ViewCounter) -> Ordering {
    b.views.cmp(&a.views).then_with(|| a.video.cmp(&b.video))
}

/// Storage backend for view counters.
///
/// # Example
///
/// ```ignore
/// let store = PostgresViewCounterStore::new(pool);
/// let views = store.record_view("clip1.mp4").await?;
/// let top = store.top_n(2).await?;
/// ```
pub trait ViewCounterStore: Send + Sync {
    /// Look up the counter for a video.
    ///
    /// # Errors
    ///
    /// Returns [`CounterStoreError::Unavailable`] if the backend cannot be queried.
    fn find_by_video(&self, video: &str) -> impl Future<Output = Result<Option<ViewCounter>>> + Send;

    /// Create a counter with an initial count.
    ///
    /// # Errors
    ///
    /// Returns [`CounterStoreError::Conflict`] if a counter for `video` already exists,
    /// [`CounterStoreError::Unavailable`] on backend failure.
    fn insert(&self, video: &str, views: u64) -> impl Future<Output = Result<()>> + Send;

    /// Atomically add `delta` to an existing counter and return the new count.
    ///
    /// # Errors
    ///
    /// Returns [`CounterStoreError::NotFound`] if there is no counter for `video`,
    /// [`CounterStoreError::Unavailable`] on backend failure.
    fn increment_count(&self, video: &str, delta: u64) -> impl Future<Output = Result<u64>> + Send;

    /// The `n` most viewed counters, ordered by [`by_popularity`].
    ///
    /// # Errors
    ///
    /// Returns [`CounterStoreError::Unavailable`] on backend failure.
    fn top_n(&self, n: usize) -> impl Future<Output = Result<Vec<ViewCounter>>> + Send;

    /// Record one view: create the counter at 1 or increment it, returning the new count.
    ///
    /// A concurrent first view that wins the insert race turns this call's insert into a
    /// [`CounterStoreError::Conflict`], which falls through to an increment.
    ///
    /// # Errors
    ///
    /// Propagates any error other than the handled `Conflict`.
    fn record_view(&self, video: &str) -> impl Future<Output = Result<u64>> + Send {
        async move {
            if self.find_by_video(video).await?.is_some() {
                return self.increment_count(video, 1).await;
            }
            match self.insert(video, 1).await {
                Ok(()) => Ok(1),
                Err(CounterStoreError::Conflict(_)) => self.increment_count(video, 1).await,
                Err(e) => Err(e),
            }
        }
    }
}
