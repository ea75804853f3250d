//! Read-only catalog of streamable videos.
//!
//! Records are created out-of-band (an ingest job, an admin tool); this system only looks
//! them up to find the stored file behind a video identifier.

use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Errors from catalog lookups.
#[derive(Error, Debug, Clone)]
pub enum CatalogError {
    /// Backend unreachable or failing
    #[error("Video catalog unavailable: {0}")]
    Unavailable(String),
}

/// A streamable video.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoRecord {
    /// Unique video identifier
    pub id: String,
    /// Stored file, relative to the storage root
    pub video_path: String,
}

impl VideoRecord {
    /// Create a record.
    #[must_use]
    pub fn new(id: impl Into<String>, video_path: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            video_path: video_path.into(),
        }
    }
}

/// Lookup of video records by identifier.
///
/// Uses boxed futures so handlers can hold an `Arc<dyn VideoCatalog>`.
pub trait VideoCatalog: Send + Sync {
    /// Find the record for `id`.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Unavailable`] if the backend cannot be queried.
    fn find_video(
        &self,
        id: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<VideoRecord>, CatalogError>> + Send + '_>>;
}
