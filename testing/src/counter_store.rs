//! In-memory view counter store.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Panics only on a poisoned lock

use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use viewtrack_core::counter::{
    CounterStoreError, Result, ViewCounter, ViewCounterStore, by_popularity,
};

#[derive(Debug, Default)]
struct Inner {
    counters: HashMap<String, ViewCounter>,
    unavailable: bool,
    failures_remaining: usize,
}

impl Inner {
    fn check_available(&mut self) -> Result<()> {
        if self.unavailable {
            return Err(CounterStoreError::Unavailable("store offline".to_string()));
        }
        if self.failures_remaining > 0 {
            self.failures_remaining -= 1;
            return Err(CounterStoreError::Unavailable(
                "injected transient failure".to_string(),
            ));
        }
        Ok(())
    }
}

/// `HashMap`-backed counter store for fast, deterministic testing.
///
/// Each operation takes the lock on its own, so [`ViewCounterStore::record_view`] runs the
/// trait's find/insert/increment sequence and concurrent first views really do race on
/// the insert.
///
/// # Example
///
/// ```
/// use viewtrack_core::counter::ViewCounterStore;
/// use viewtrack_testing::InMemoryViewCounterStore;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = InMemoryViewCounterStore::new();
/// assert_eq!(store.record_view("a.mp4").await?, 1);
/// assert_eq!(store.record_view("a.mp4").await?, 2);
/// assert_eq!(store.views("a.mp4"), Some(2));
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct InMemoryViewCounterStore {
    inner: Arc<Mutex<Inner>>,
}

impl InMemoryViewCounterStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with `(video, views)` pairs.
    #[must_use]
    pub fn with_counters<'a>(counters: impl IntoIterator<Item = (&'a str, u64)>) -> Self {
        let store = Self::new();
        {
            let mut inner = store.inner.lock().unwrap();
            for (video, views) in counters {
                inner
                    .counters
                    .insert(video.to_string(), ViewCounter::new(video, views));
            }
        }
        store
    }

    /// Take the store offline (every call fails) or bring it back.
    pub fn set_available(&self, available: bool) {
        self.inner.lock().unwrap().unavailable = !available;
    }

    /// Make the next `count` store calls fail as unavailable.
    pub fn fail_next(&self, count: usize) {
        self.inner.lock().unwrap().failures_remaining = count;
    }

    /// Current count for `video`, bypassing availability.
    #[must_use]
    pub fn views(&self, video: &str) -> Option<u64> {
        self.inner
            .lock()
            .unwrap()
            .counters
            .get(video)
            .map(|counter| counter.views)
    }

    /// Number of distinct videos with a counter.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().counters.len()
    }

    /// Whether no views have been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().unwrap().counters.is_empty()
    }
}

impl ViewCounterStore for InMemoryViewCounterStore {
    async fn find_by_video(&self, video: &str) -> Result<Option<ViewCounter>> {
        let mut inner = self.inner.lock().unwrap();
        inner.check_available()?;
        Ok(inner.counters.get(video).cloned())
    }

    async fn insert(&self, video: &str, views: u64) -> Result<()> {
        // Yield first so concurrent first views interleave between find and insert.
        tokio::task::yield_now().await;
        let mut inner = self.inner.lock().unwrap();
        inner.check_available()?;
        if inner.counters.contains_key(video) {
            return Err(CounterStoreError::Conflict(video.to_string()));
        }
        let mut counter = ViewCounter::new(video, views);
        counter.last_viewed_at = Some(Utc::now());
        inner.counters.insert(video.to_string(), counter);
        Ok(())
    }

    async fn increment_count(&self, video: &str, delta: u64) -> Result<u64> {
        let mut inner = self.inner.lock().unwrap();
        inner.check_available()?;
        let counter = inner
            .counters
            .get_mut(video)
            .ok_or_else(|| CounterStoreError::NotFound(video.to_string()))?;
        counter.views += delta;
        counter.last_viewed_at = Some(Utc::now());
        Ok(counter.views)
    }

    async fn top_n(&self, n: usize) -> Result<Vec<ViewCounter>> {
        let mut inner = self.inner.lock().unwrap();
        inner.check_available()?;
        let mut counters: Vec<ViewCounter> = inner.counters.values().cloned().collect();
        counters.sort_by(by_popularity);
        counters.truncate(n);
        Ok(counters)
    }
}
