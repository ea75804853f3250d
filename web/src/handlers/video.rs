//! Video streaming endpoint.
//!
//! ```text
//! GET /video?id=<id>
//! ```
//!
//! Resolves `id` through the catalog and streams the stored file with
//! `Content-Type: video/mp4`. The whole file is always served; a `Range` header only
//! marks the request as playback, which is what gets reported as a view. The view is
//! published from a background task, so a slow broker never delays the response.

use crate::error::AppError;
use crate::state::AppState;
use axum::{
    body::{Body, Bytes},
    extract::{Query, State},
    http::{HeaderMap, HeaderValue, header},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use std::path::{Component, Path, PathBuf};
use tokio::io::AsyncReadExt;

const CHUNK_SIZE: usize = 64 * 1024;

/// Query parameters of `GET /video`.
#[derive(Debug, Deserialize)]
pub struct VideoQuery {
    /// Video identifier
    pub id: Option<String>,
}

/// Stream a video.
///
/// # Errors
///
/// - 400 when `id` is missing or empty
/// - 404 when the catalog has no such video or its file is missing
/// - 503 when the catalog cannot be queried
pub async fn stream_video(
    State(state): State<AppState>,
    Query(query): Query<VideoQuery>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let Some(id) = query.id.filter(|id| !id.is_empty()) else {
        return Err(AppError::bad_request("Missing video ID"));
    };

    let record = state
        .catalog()
        .find_video(&id)
        .await?
        .ok_or_else(|| AppError::not_found("Video not found"))?;

    let path = resolve(state.storage_root(), &record.video_path)
        .ok_or_else(|| AppError::not_found("Video not found"))?;

    let file = match tokio::fs::File::open(&path).await {
        Ok(file) => file,
        Err(e) => {
            tracing::warn!(video_id = %id, path = %path.display(), error = %e, "Video file unavailable");
            return Err(AppError::not_found("Video not found"));
        }
    };
    let metadata = file
        .metadata()
        .await
        .map_err(|e| AppError::internal("Failed to read video metadata").with_source(e.into()))?;
    if !metadata.is_file() {
        return Err(AppError::not_found("Video not found"));
    }
    let length = metadata.len();

    let is_range_request = headers.contains_key(header::RANGE);
    tracing::debug!(video_id = %id, length, is_range_request, "Streaming video");

    if is_range_request {
        // Runs alongside the body; the publisher logs its own outcome
        let publisher = state.publisher().clone();
        tokio::spawn(async move {
            publisher.on_stream_request(&id, true).await;
        });
    }

    Ok((
        [
            (header::CONTENT_TYPE, HeaderValue::from_static("video/mp4")),
            (header::CONTENT_LENGTH, HeaderValue::from(length)),
        ],
        Body::from_stream(read_chunks(file)),
    )
        .into_response())
}

/// Join a stored file reference onto the storage root, refusing references that
/// would escape it.
fn resolve(root: &Path, video_path: &str) -> Option<PathBuf> {
    let relative = Path::new(video_path);
    let contained = relative
        .components()
        .all(|component| matches!(component, Component::Normal(_) | Component::CurDir));

    (contained && !video_path.is_empty()).then(|| root.join(relative))
}

fn read_chunks(
    mut file: tokio::fs::File,
) -> impl futures::Stream<Item = std::io::Result<Bytes>> {
    async_stream::try_stream! {
        let mut buffer = vec![0_u8; CHUNK_SIZE];
        loop {
            let read = file.read(&mut buffer).await?;
            if read == 0 {
                break;
            }
            yield Bytes::copy_from_slice(&buffer[..read]);
        }
    }
}
