//! `PostgreSQL` video catalog.

use sqlx::postgres::PgPool;
use std::future::Future;
use std::pin::Pin;
use viewtrack_core::catalog::{CatalogError, VideoCatalog, VideoRecord};

/// Looks videos up in the `videos` table.
#[derive(Clone, Debug)]
pub struct PostgresVideoCatalog {
    pool: PgPool,
}

impl PostgresVideoCatalog {
    /// Create a catalog on an existing connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Register a video. Used by seeding scripts and tests; the services only read.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Unavailable`] if the insert fails.
    pub async fn add_video(&self, record: &VideoRecord) -> Result<(), CatalogError> {
        sqlx::query(
            "INSERT INTO videos (id, video_path) VALUES ($1, $2)
             ON CONFLICT (id) DO UPDATE SET video_path = EXCLUDED.video_path",
        )
        .bind(&record.id)
        .bind(&record.video_path)
        .execute(&self.pool)
        .await
        .map_err(|e| CatalogError::Unavailable(format!("Failed to add video: {e}")))?;
        Ok(())
    }
}

impl VideoCatalog for PostgresVideoCatalog {
    fn find_video(
        &self,
        id: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<VideoRecord>, CatalogError>> + Send + '_>> {
        let id = id.to_string();
        Box::pin(async move {
            let row: Option<(String, String)> =
                sqlx::query_as("SELECT id, video_path FROM videos WHERE id = $1")
                    .bind(&id)
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(|e| CatalogError::Unavailable(format!("Failed to find video: {e}")))?;

            Ok(row.map(|(id, video_path)| VideoRecord { id, video_path }))
        })
    }
}
