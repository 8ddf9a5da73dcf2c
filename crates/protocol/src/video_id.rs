use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::error::{EmptyVideoIdSnafu, ProtocolError};

/// Substring that marks a full watch page.
pub const WATCH_PAGE_MARKER: &str = "youtube.com/watch";
/// Substring that marks a short link; the identifier follows it directly.
pub const SHORT_LINK_MARKER: &str = "youtu.be/";

static QUERY_FORM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[?&]v=([^&]+)").expect("query form pattern compiles"));
static SHORT_FORM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"youtu\.be/([^?]+)").expect("short form pattern compiles"));

/// Canonical token naming one video.
///
/// Only equality is meaningful. Absence is always `Option::None`, never an empty token.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VideoId(String);

impl VideoId {
    /// Wraps a raw token, rejecting blank input.
    pub fn new(raw: impl Into<String>) -> Option<Self> {
        let raw = raw.into();
        if raw.is_empty() { None } else { Some(Self(raw)) }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for VideoId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.0)
    }
}

impl TryFrom<String> for VideoId {
    type Error = ProtocolError;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        Self::new(raw).ok_or_else(|| {
            EmptyVideoIdSnafu {
                stage: "video-id-from-string",
            }
            .build()
        })
    }
}

impl From<VideoId> for String {
    fn from(value: VideoId) -> Self {
        value.0
    }
}

impl AsRef<str> for VideoId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Extracts the video identifier from `url`.
///
/// Two shapes are recognized, in this order:
/// 1. a `v` query parameter after `?` or `&`, taken up to the next `&`;
/// 2. the short-link path after `youtu.be/`, taken up to the next `?`.
///
/// Anything else yields `None`.
pub fn extract_video_id(url: &str) -> Option<VideoId> {
    if let Some(captures) = QUERY_FORM.captures(url) {
        return VideoId::new(&captures[1]);
    }

    SHORT_FORM
        .captures(url)
        .and_then(|captures| VideoId::new(&captures[1]))
}

/// Returns true when the panel may be offered for `url`.
pub fn is_eligible(url: &str) -> bool {
    url.contains(WATCH_PAGE_MARKER) || url.contains(SHORT_LINK_MARKER)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extracted(url: &str) -> Option<String> {
        extract_video_id(url).map(VideoId::into_inner)
    }

    #[test]
    fn watch_url_stops_at_next_parameter() {
        assert_eq!(
            extracted("https://www.youtube.com/watch?v=dQw4w9WgXcQ&t=10s").as_deref(),
            Some("dQw4w9WgXcQ")
        );
    }

    #[test]
    fn query_parameter_may_appear_after_other_parameters() {
        assert_eq!(
            extracted("https://www.youtube.com/watch?list=PL1&v=ABC&index=3").as_deref(),
            Some("ABC")
        );
        assert_eq!(extracted("https://example.com/?v=ABC").as_deref(), Some("ABC"));
    }

    #[test]
    fn short_link_stops_at_query() {
        assert_eq!(
            extracted("https://youtu.be/dQw4w9WgXcQ?t=5").as_deref(),
            Some("dQw4w9WgXcQ")
        );
        assert_eq!(extracted("https://youtu.be/XYZ").as_deref(), Some("XYZ"));
    }

    #[test]
    fn query_form_wins_over_short_form() {
        assert_eq!(
            extracted("https://youtu.be/SHORT?v=QUERY").as_deref(),
            Some("QUERY")
        );
    }

    #[test]
    fn unrecognized_urls_yield_none() {
        for url in [
            "",
            "https://www.youtube.com/",
            "https://www.youtube.com/feed/subscriptions",
            "https://www.youtube.com/watch?list=PL1",
            "https://example.com/?video=ABC",
            "https://youtu.be/",
            "https://youtu.be/?t=5",
        ] {
            assert_eq!(extracted(url), None, "{url}");
        }
    }

    #[test]
    fn parameter_named_like_v_is_not_confused() {
        assert_eq!(extracted("https://www.youtube.com/watch?xv=ABC"), None);
    }

    #[test]
    fn eligibility_matches_both_markers() {
        assert!(is_eligible("https://www.youtube.com/watch?v=ABC"));
        assert!(is_eligible("https://youtu.be/ABC"));
        assert!(!is_eligible("https://www.youtube.com/results?search_query=rust"));
        assert!(!is_eligible("https://example.com/watch?v=ABC"));
    }

    #[test]
    fn blank_tokens_are_absent() {
        assert_eq!(VideoId::new(""), None);
        assert_eq!(VideoId::new("abc").map(|id| id.to_string()).as_deref(), Some("abc"));
    }
}
