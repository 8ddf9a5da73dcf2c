use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use snafu::Snafu;
use vidchat_protocol::VideoId;

/// Fallback detail when a failed HTTP response carries no readable error.
pub const GENERIC_STATUS_DETAIL: &str = "Failed to get response";
/// Fallback detail when the service reports failure without saying why.
pub const GENERIC_REJECTION_DETAIL: &str = "Unknown error occurred";

pub type AnswerResult<T> = Result<T, AnswerError>;

/// Body of `POST /chat`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatRequest {
    pub video_id: VideoId,
    pub user_query: String,
}

impl ChatRequest {
    pub fn new(video_id: VideoId, user_query: impl Into<String>) -> Self {
        Self {
            video_id,
            user_query: user_query.into(),
        }
    }
}

/// Response body of `POST /chat`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub answer: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl ChatResponse {
    pub fn into_answer(self) -> AnswerResult<String> {
        if !self.success {
            return RejectedSnafu {
                stage: "chat-response-flag",
                message: self
                    .error
                    .unwrap_or_else(|| GENERIC_REJECTION_DETAIL.to_string()),
            }
            .fail();
        }

        match self.answer {
            Some(answer) => Ok(answer),
            None => MissingAnswerSnafu {
                stage: "chat-response-answer",
            }
            .fail(),
        }
    }
}

/// Response body of `GET /health`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    #[serde(default)]
    pub message: String,
}

impl HealthStatus {
    pub fn is_ok(&self) -> bool {
        self.status.eq_ignore_ascii_case("ok")
    }
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum AnswerError {
    #[snafu(display("failed to build HTTP client on `{stage}`: {source}"))]
    BuildClient {
        stage: &'static str,
        source: reqwest::Error,
    },
    #[snafu(display("cannot reach answering service at {base_url} on `{stage}`: {source}"))]
    Unreachable {
        stage: &'static str,
        base_url: String,
        source: reqwest::Error,
    },
    #[snafu(display("failed to read answering service response on `{stage}`: {source}"))]
    ReadBody {
        stage: &'static str,
        source: reqwest::Error,
    },
    #[snafu(display("answering service returned status {status}: {message}"))]
    Status {
        stage: &'static str,
        status: u16,
        message: String,
    },
    #[snafu(display("answering service rejected the question: {message}"))]
    Rejected {
        stage: &'static str,
        message: String,
    },
    #[snafu(display("failed to decode answering service response on `{stage}`: {source}"))]
    Decode {
        stage: &'static str,
        source: serde_json::Error,
    },
    #[snafu(display("answering service reported success without an answer"))]
    MissingAnswer { stage: &'static str },
}

/// Coarse grouping of failures for user-facing messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureCategory {
    /// The video has no usable transcript or content.
    ContentUnavailable,
    /// The answering service could not be contacted at all.
    BackendUnreachable,
    Other,
}

impl AnswerError {
    /// Human-readable reason, without the transport framing of `Display`.
    pub fn detail(&self) -> String {
        match self {
            Self::Status { message, .. } | Self::Rejected { message, .. } => message.clone(),
            _ => self.to_string(),
        }
    }

    pub fn category(&self) -> FailureCategory {
        if self.detail().to_lowercase().contains("transcript") {
            return FailureCategory::ContentUnavailable;
        }

        match self {
            Self::Unreachable { .. } => FailureCategory::BackendUnreachable,
            _ => FailureCategory::Other,
        }
    }
}

/// Pulls an error message out of a failed response body, if it has one.
///
/// Besides the service's own `error` field this understands the `detail` string that
/// validation failures use.
pub fn error_detail_from_body(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    ["error", "detail"].into_iter().find_map(|key| {
        value
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|message| !message.is_empty())
            .map(str::to_string)
    })
}

/// Remote collaborator that answers questions about one video.
pub trait AnswerService: Send + Sync {
    fn ask<'a>(&'a self, request: ChatRequest) -> BoxFuture<'a, AnswerResult<String>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rejected(message: &str) -> AnswerError {
        AnswerError::Rejected {
            stage: "test",
            message: message.to_string(),
        }
    }

    #[test]
    fn request_serializes_with_service_field_names() {
        let request = ChatRequest::new(VideoId::new("abc").unwrap(), "What is this about?");
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            serde_json::json!({"video_id": "abc", "user_query": "What is this about?"})
        );
    }

    #[test]
    fn successful_response_yields_answer() {
        let response: ChatResponse =
            serde_json::from_str(r#"{"success":true,"answer":"It's about X"}"#).unwrap();
        assert_eq!(response.into_answer().unwrap(), "It's about X");
    }

    #[test]
    fn failed_flag_carries_service_message() {
        let response: ChatResponse =
            serde_json::from_str(r#"{"success":false,"answer":"","error":"No transcript found"}"#)
                .unwrap();
        let error = response.into_answer().unwrap_err();
        assert_eq!(error.detail(), "No transcript found");
        assert_eq!(error.category(), FailureCategory::ContentUnavailable);
    }

    #[test]
    fn failed_flag_without_message_uses_generic_detail() {
        let error = ChatResponse::default().into_answer().unwrap_err();
        assert_eq!(error.detail(), GENERIC_REJECTION_DETAIL);
        assert_eq!(error.category(), FailureCategory::Other);
    }

    #[test]
    fn success_without_answer_is_an_error() {
        let response = ChatResponse {
            success: true,
            ..ChatResponse::default()
        };
        assert!(matches!(
            response.into_answer(),
            Err(AnswerError::MissingAnswer { .. })
        ));
    }

    #[test]
    fn categorizes_by_transcript_mention_first() {
        assert_eq!(
            rejected("Transcripts are disabled for this video").category(),
            FailureCategory::ContentUnavailable
        );
        assert_eq!(rejected("rate limited").category(), FailureCategory::Other);
    }

    #[test]
    fn reads_error_or_detail_from_failed_bodies() {
        assert_eq!(
            error_detail_from_body(r#"{"error":"boom"}"#).as_deref(),
            Some("boom")
        );
        assert_eq!(
            error_detail_from_body(r#"{"detail":"User query cannot be empty"}"#).as_deref(),
            Some("User query cannot be empty")
        );
        assert_eq!(error_detail_from_body("Internal Server Error"), None);
        assert_eq!(error_detail_from_body(r#"{"error":"  "}"#), None);
    }
}
