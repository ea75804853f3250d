//! Video streaming service.
//!
//! Serves `GET /video?id=<id>` from local storage and publishes a `viewed` event for
//! every playback (range) request. See [`Config`] for the environment it reads.

pub mod config;

pub use config::Config;
