//! Recommendations service.
//!
//! Consumes `viewed` events, keeps per-video view counts in `PostgreSQL` and logs a
//! recommendation for every event. Its HTTP surface is operational only (`/health`,
//! `/metrics`). See [`Config`] for the environment it reads.

pub mod config;

pub use config::Config;
