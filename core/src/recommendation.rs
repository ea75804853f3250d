//! Popularity-based recommendation.
//!
//! Recommend the most viewed video, unless that is the video being watched right now, in
//! which case recommend the runner-up.

use crate::counter::ViewCounter;
use std::fmt;

/// Outcome of [`select`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recommendation {
    /// Recommend this video
    Video(String),
    /// Nothing has been viewed yet
    None,
}

impl Recommendation {
    /// The recommended video, if any.
    #[must_use]
    pub fn video(&self) -> Option<&str> {
        match self {
            Self::Video(video) => Some(video),
            Self::None => None,
        }
    }
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Video(video) => f.write_str(video),
            Self::None => f.write_str("none"),
        }
    }
}

/// Pick a recommendation from the top entries by view count.
///
/// `top` must already be ordered most viewed first; only the first two entries matter.
///
/// ```
/// use viewtrack_core::counter::ViewCounter;
/// use viewtrack_core::recommendation::{select, Recommendation};
///
/// let top = [ViewCounter::new("A", 10), ViewCounter::new("B", 7)];
/// assert_eq!(select("A", &top), Recommendation::Video("B".to_string()));
/// assert_eq!(select("A", &[]), Recommendation::None);
/// ```
#[must_use]
pub fn select(just_viewed: &str, top: &[ViewCounter]) -> Recommendation {
    match top {
        [] => Recommendation::None,
        [first, second, ..] if first.video == just_viewed => {
            Recommendation::Video(second.video.clone())
        }
        [first, ..] => Recommendation::Video(first.video.clone()),
    }
}
