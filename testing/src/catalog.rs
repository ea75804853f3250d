//! In-memory video catalog.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Panics only on a poisoned lock

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use viewtrack_core::catalog::{CatalogError, VideoCatalog, VideoRecord};

/// `HashMap`-backed catalog.
///
/// # Example
///
/// ```
/// use viewtrack_core::catalog::VideoCatalog;
/// use viewtrack_testing::InMemoryVideoCatalog;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let catalog = InMemoryVideoCatalog::new().with_video("a1", "clip1.mp4");
/// let record = catalog.find_video("a1").await?;
/// assert_eq!(record.map(|r| r.video_path), Some("clip1.mp4".to_string()));
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct InMemoryVideoCatalog {
    videos: Arc<RwLock<HashMap<String, VideoRecord>>>,
    available: Arc<AtomicBool>,
}

impl InMemoryVideoCatalog {
    /// Create an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self {
            videos: Arc::new(RwLock::new(HashMap::new())),
            available: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Builder-style [`InMemoryVideoCatalog::add_video`].
    #[must_use]
    pub fn with_video(self, id: &str, video_path: &str) -> Self {
        self.add_video(id, video_path);
        self
    }

    /// Register a video.
    pub fn add_video(&self, id: &str, video_path: &str) {
        self.videos
            .write()
            .unwrap()
            .insert(id.to_string(), VideoRecord::new(id, video_path));
    }

    /// Take the catalog offline (every lookup fails) or bring it back.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }
}

impl Default for InMemoryVideoCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl VideoCatalog for InMemoryVideoCatalog {
    fn find_video(
        &self,
        id: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<VideoRecord>, CatalogError>> + Send + '_>> {
        let id = id.to_string();
        Box::pin(async move {
            if !self.available.load(Ordering::SeqCst) {
                return Err(CatalogError::Unavailable("catalog offline".to_string()));
            }
            Ok(self.videos.read().unwrap().get(&id).cloned())
        })
    }
}
