//! `PostgreSQL` read models for the view pipeline.
//!
//! # Overview
//!
//! - [`PostgresViewCounterStore`]: per-video view counts, queried for the most viewed
//! - [`PostgresVideoCatalog`]: video identifiers and their stored files
//!
//! Both live in the same database; [`migrate`] creates their tables from the migrations
//! embedded in this crate.
//!
//! ```ignore
//! let pool = viewtrack_projections::connect(&database_url, 5).await?;
//! viewtrack_projections::migrate(&pool).await?;
//!
//! let counters = PostgresViewCounterStore::new(pool.clone());
//! let catalog = PostgresVideoCatalog::new(pool);
//! ```

pub mod catalog;
pub mod counter_store;

pub use catalog::PostgresVideoCatalog;
pub use counter_store::PostgresViewCounterStore;

use sqlx::postgres::{PgPool, PgPoolOptions};

/// Open a connection pool and check it with a round trip.
///
/// # Errors
///
/// Returns the connection error if the database cannot be reached.
pub async fn connect(database_url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await?;
    sqlx::query("SELECT 1").execute(&pool).await?;
    Ok(pool)
}

/// Apply the embedded migrations.
///
/// # Errors
///
/// Returns the migration error if a migration fails to apply.
pub async fn migrate(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}
