use serde::{Deserialize, Serialize};
use serde_json::Value;
use snafu::ResultExt;

use super::error::{DecodeEnvelopeSnafu, EncodeEnvelopeSnafu, ProtocolResult};
use super::video_id::VideoId;

/// Message passed between page, coordinator and panel contexts.
///
/// On the wire this is a JSON object tagged by `type`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Envelope {
    VideoChanged {
        #[serde(rename = "videoId")]
        video_id: VideoId,
    },
    GetVideoId,
    OpenSidePanel,
}

impl Envelope {
    pub const KNOWN_TYPES: [&'static str; 3] = ["VIDEO_CHANGED", "GET_VIDEO_ID", "OPEN_SIDE_PANEL"];

    pub fn video_changed(video_id: VideoId) -> Self {
        Self::VideoChanged { video_id }
    }

    pub fn encode(&self) -> ProtocolResult<String> {
        serde_json::to_string(self).context(EncodeEnvelopeSnafu {
            stage: "encode-envelope",
        })
    }

    /// Decodes a raw envelope.
    ///
    /// Objects whose `type` is missing or unrecognized decode to `Ok(None)` so callers can
    /// ignore them; a recognized type with a malformed payload is an error.
    pub fn decode(raw: &str) -> ProtocolResult<Option<Self>> {
        let value: Value = serde_json::from_str(raw).context(DecodeEnvelopeSnafu {
            stage: "decode-envelope-json",
        })?;

        let Some(kind) = value.get("type").and_then(Value::as_str) else {
            tracing::debug!("ignoring envelope without a type tag");
            return Ok(None);
        };
        if !Self::KNOWN_TYPES.contains(&kind) {
            tracing::debug!(kind, "ignoring envelope with unrecognized type");
            return Ok(None);
        }

        serde_json::from_value(value)
            .map(Some)
            .context(DecodeEnvelopeSnafu {
                stage: "decode-envelope-payload",
            })
    }
}

/// Answer to a request envelope.
///
/// Variant order matters for untagged decoding: `PanelOpened` requires `success`, while
/// every field of `VideoId` is optional.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Reply {
    PanelOpened {
        success: bool,
    },
    VideoId {
        #[serde(rename = "videoId")]
        video_id: Option<VideoId>,
    },
}

impl Reply {
    pub fn video_id(video_id: Option<VideoId>) -> Self {
        Self::VideoId { video_id }
    }

    pub fn panel_opened(success: bool) -> Self {
        Self::PanelOpened { success }
    }

    /// Returns the carried identifier; any other reply carries none.
    pub fn into_video_id(self) -> Option<VideoId> {
        match self {
            Self::VideoId { video_id } => video_id,
            Self::PanelOpened { .. } => None,
        }
    }

    pub fn encode(&self) -> ProtocolResult<String> {
        serde_json::to_string(self).context(EncodeEnvelopeSnafu {
            stage: "encode-reply",
        })
    }

    pub fn decode(raw: &str) -> ProtocolResult<Self> {
        serde_json::from_str(raw).context(DecodeEnvelopeSnafu {
            stage: "decode-reply",
        })
    }
}
