//! Axum integration for the view tracking services.
//!
//! # Routes
//!
//! ```text
//! GET /video?id=<id>   stream a stored video (video-streaming service)
//! GET /health          liveness
//! GET /metrics         Prometheus exposition
//! ```
//!
//! The streaming handler is the only place HTTP meets the pipeline: it resolves the
//! video through a [`VideoCatalog`](viewtrack_core::catalog::VideoCatalog), serves the
//! file, and reports the request to a
//! [`ViewPublisher`](viewtrack_core::publisher::ViewPublisher). Nothing the publisher does
//! can change the response.
//!
//! # Example
//!
//! ```ignore
//! use viewtrack_web::{build_router, AppState};
//!
//! let state = AppState::new(catalog, publisher, "./videos", metrics);
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
//! axum::serve(listener, build_router(state)).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod handlers;
pub mod router;
pub mod state;

pub use error::AppError;
pub use router::{build_router, operational_router};
pub use state::AppState;
