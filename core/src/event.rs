//! The "viewed" event and its JSON wire envelope.
//!
//! Producers publish `{"videoId": "<id>"}` as UTF-8 JSON. Older producers sent the full
//! stored path instead, as `{"videoPath": "/data/videos/<id>"}`; the decoder accepts both
//! and always hands back the bare identifier (the last path segment).
//!
//! # Example
//!
//! ```
//! use viewtrack_core::event::{decode, encode};
//!
//! let bytes = encode("clip1.mp4");
//! assert_eq!(bytes, br#"{"videoId":"clip1.mp4"}"#);
//!
//! let legacy = br#"{"videoPath":"/data/videos/clip1.mp4"}"#;
//! assert_eq!(decode(legacy).unwrap(), "clip1.mp4");
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Topic the streaming service broadcasts views on.
pub const VIEWED_TOPIC: &str = "viewed";

/// Error types for event envelope operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EventError {
    /// The message could not be interpreted as a viewed event.
    #[error("Malformed event: {0}")]
    MalformedEvent(String),
}

/// A genuine playback of one video.
///
/// Exists only on the wire between the streaming gateway and the consumers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewedEvent {
    /// Identifier of the video that was played. Never empty.
    pub video_id: String,
}

impl ViewedEvent {
    /// Create an event for `video_id`, normalized to its last path segment.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::MalformedEvent`] if nothing is left after normalization.
    pub fn new(video_id: &str) -> Result<Self, EventError> {
        let video_id = normalize_video_id(video_id);
        if video_id.is_empty() {
            return Err(EventError::MalformedEvent(
                "videoId must not be empty".to_string(),
            ));
        }
        Ok(Self {
            video_id: video_id.to_string(),
        })
    }

    /// Serialize to the JSON envelope.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        encode(&self.video_id)
    }

    /// Parse from the JSON envelope.
    ///
    /// # Errors
    ///
    /// See [`decode`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, EventError> {
        decode(bytes).map(|video_id| Self { video_id })
    }
}

/// Both field spellings ever sent on the `viewed` topic.
///
/// Kept as raw values so a wrongly typed `videoId` still lets `videoPath` through.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Envelope {
    #[serde(default)]
    video_id: Option<serde_json::Value>,
    #[serde(default)]
    video_path: Option<serde_json::Value>,
}

impl Envelope {
    /// First of `videoId`, `videoPath` that holds a string.
    fn into_raw_id(self) -> Option<String> {
        [self.video_id, self.video_path]
            .into_iter()
            .flatten()
            .find_map(|value| match value {
                serde_json::Value::String(raw) => Some(raw),
                _ => None,
            })
    }
}

/// Encode a video identifier as `{"videoId": <id>}`.
#[must_use]
pub fn encode(video_id: &str) -> Vec<u8> {
    serde_json::json!({ "videoId": video_id }).to_string().into_bytes()
}

/// Decode a viewed-event envelope into a normalized video identifier.
///
/// `videoId` wins when both fields are present.
///
/// # Errors
///
/// Returns [`EventError::MalformedEvent`] if the bytes are not a JSON object, if neither
/// `videoId` nor `videoPath` is a string, or if the identifier is empty once normalized.
pub fn decode(bytes: &[u8]) -> Result<String, EventError> {
    let envelope: Envelope = serde_json::from_slice(bytes)
        .map_err(|e| EventError::MalformedEvent(format!("invalid JSON envelope: {e}")))?;

    let raw = envelope.into_raw_id().ok_or_else(|| {
        EventError::MalformedEvent("missing string field videoId or videoPath".to_string())
    })?;

    let video_id = normalize_video_id(&raw);
    if video_id.is_empty() {
        return Err(EventError::MalformedEvent(format!(
            "empty video identifier in {raw:?}"
        )));
    }
    Ok(video_id.to_string())
}

/// Strip any directory components, keeping only the final path segment.
///
/// Both `/` and `\` count as separators. A trailing separator leaves an empty segment.
///
/// ```
/// use viewtrack_core::event::normalize_video_id;
///
/// assert_eq!(normalize_video_id("/data/videos/clip1.mp4"), "clip1.mp4");
/// assert_eq!(normalize_video_id("clip1.mp4"), "clip1.mp4");
/// ```
#[must_use]
pub fn normalize_video_id(raw: &str) -> &str {
    raw.rsplit(['/', '\\']).next().unwrap_or(raw)
}
