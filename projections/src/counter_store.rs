//! `PostgreSQL` view counter store.
//!
//! # Schema
//!
//! ```sql
//! CREATE TABLE view_counters (
//!     video TEXT PRIMARY KEY,
//!     views BIGINT NOT NULL CHECK (views >= 0),
//!     updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
//! );
//! ```
//!
//! Counts are `u64` in the domain and `BIGINT` in the table; values that do not fit
//! either way surface as [`CounterStoreError::Corrupt`].

use sqlx::postgres::PgPool;
use viewtrack_core::counter::{CounterStoreError, Result, ViewCounter, ViewCounterStore};
use viewtrack_core::{DateTime, Utc};

/// PostgreSQL-backed counter store.
///
/// [`ViewCounterStore::record_view`] is a single upsert, so concurrent views of the same
/// video never lose an update regardless of how many consumers run.
///
/// # Example
///
/// ```ignore
/// let pool = viewtrack_projections::connect("postgres://localhost/views", 5).await?;
/// viewtrack_projections::migrate(&pool).await?;
///
/// let store = PostgresViewCounterStore::new(pool);
/// let views = store.record_view("clip1.mp4").await?;
/// ```
#[derive(Clone, Debug)]
pub struct PostgresViewCounterStore {
    pool: PgPool,
}

impl PostgresViewCounterStore {
    /// Create a store on an existing connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get the underlying connection pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn unavailable(action: &str, e: &sqlx::Error) -> CounterStoreError {
    CounterStoreError::Unavailable(format!("Failed to {action}: {e}"))
}

fn to_column(video: &str, views: u64) -> Result<i64> {
    i64::try_from(views)
        .map_err(|_| CounterStoreError::Corrupt(format!("count {views} for '{video}' overflows BIGINT")))
}

fn from_column(video: &str, views: i64) -> Result<u64> {
    u64::try_from(views)
        .map_err(|_| CounterStoreError::Corrupt(format!("negative count {views} for '{video}'")))
}

fn from_row((video, views, updated_at): (String, i64, DateTime<Utc>)) -> Result<ViewCounter> {
    let views = from_column(&video, views)?;
    Ok(ViewCounter {
        video,
        views,
        last_viewed_at: Some(updated_at),
    })
}

impl ViewCounterStore for PostgresViewCounterStore {
    async fn find_by_video(&self, video: &str) -> Result<Option<ViewCounter>> {
        let row: Option<(String, i64, DateTime<Utc>)> = sqlx::query_as(
            "SELECT video, views, updated_at FROM view_counters WHERE video = $1",
        )
        .bind(video)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| unavailable("find counter", &e))?;

        row.map(from_row).transpose()
    }

    async fn insert(&self, video: &str, views: u64) -> Result<()> {
        let views = to_column(video, views)?;

        sqlx::query("INSERT INTO view_counters (video, views, updated_at) VALUES ($1, $2, now())")
            .bind(video)
            .bind(views)
            .execute(&self.pool)
            .await
            .map_err(|e| match &e {
                sqlx::Error::Database(db) if db.is_unique_violation() => {
                    CounterStoreError::Conflict(video.to_string())
                }
                _ => unavailable("insert counter", &e),
            })?;

        Ok(())
    }

    async fn increment_count(&self, video: &str, delta: u64) -> Result<u64> {
        let delta = to_column(video, delta)?;

        let views: Option<i64> = sqlx::query_scalar(
            "UPDATE view_counters
             SET views = views + $2, updated_at = now()
             WHERE video = $1
             RETURNING views",
        )
        .bind(video)
        .bind(delta)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| unavailable("increment counter", &e))?;

        let views = views.ok_or_else(|| CounterStoreError::NotFound(video.to_string()))?;
        from_column(video, views)
    }

    async fn top_n(&self, n: usize) -> Result<Vec<ViewCounter>> {
        let limit = i64::try_from(n).unwrap_or(i64::MAX);

        let rows: Vec<(String, i64, DateTime<Utc>)> = sqlx::query_as(
            "SELECT video, views, updated_at
             FROM view_counters
             ORDER BY views DESC, video ASC
             LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| unavailable("load most viewed", &e))?;

        rows.into_iter().map(from_row).collect()
    }

    async fn record_view(&self, video: &str) -> Result<u64> {
        let views: i64 = sqlx::query_scalar(
            "INSERT INTO view_counters (video, views, updated_at)
             VALUES ($1, 1, now())
             ON CONFLICT (video) DO UPDATE
             SET views = view_counters.views + 1, updated_at = now()
             RETURNING views",
        )
        .bind(video)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| unavailable("record view", &e))?;

        tracing::debug!(video, views, "View recorded");
        from_column(video, views)
    }
}
