//! Application state for Axum handlers.

use axum::extract::FromRef;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use viewtrack_core::catalog::VideoCatalog;
use viewtrack_core::publisher::ViewPublisher;
use viewtrack_runtime::MetricsRecorder;

/// State shared by the streaming gateway handlers.
///
/// Cheap to clone: every field is reference counted.
#[derive(Clone)]
pub struct AppState {
    catalog: Arc<dyn VideoCatalog>,
    publisher: ViewPublisher,
    storage_root: Arc<PathBuf>,
    metrics: MetricsRecorder,
}

impl AppState {
    /// Create the gateway state.
    ///
    /// `storage_root` is the directory the catalog's stored file references resolve against.
    #[must_use]
    pub fn new(
        catalog: Arc<dyn VideoCatalog>,
        publisher: ViewPublisher,
        storage_root: impl Into<PathBuf>,
        metrics: MetricsRecorder,
    ) -> Self {
        Self {
            catalog,
            publisher,
            storage_root: Arc::new(storage_root.into()),
            metrics,
        }
    }

    /// Catalog used to resolve video identifiers.
    #[must_use]
    pub fn catalog(&self) -> &dyn VideoCatalog {
        self.catalog.as_ref()
    }

    /// Publisher notified of every streaming request.
    #[must_use]
    pub const fn publisher(&self) -> &ViewPublisher {
        &self.publisher
    }

    /// Directory holding the video files.
    #[must_use]
    pub fn storage_root(&self) -> &Path {
        &self.storage_root
    }
}

impl FromRef<AppState> for MetricsRecorder {
    fn from_ref(state: &AppState) -> Self {
        state.metrics.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_is_clone() {
        // Axum requires Clone state
        fn assert_clone<T: Clone + Send + Sync + 'static>() {}
        assert_clone::<AppState>();
    }
}
