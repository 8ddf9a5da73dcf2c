use futures::future::BoxFuture;
use snafu::ResultExt;

use super::service::{
    AnswerResult, AnswerService, BuildClientSnafu, ChatRequest, ChatResponse, DecodeSnafu,
    GENERIC_STATUS_DETAIL, HealthStatus, ReadBodySnafu, StatusSnafu, UnreachableSnafu,
    error_detail_from_body,
};

pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";

/// Answering service reached over HTTP/JSON.
#[derive(Debug, Clone)]
pub struct HttpAnswerService {
    client: reqwest::Client,
    base_url: String,
}

impl HttpAnswerService {
    pub fn new(base_url: impl Into<String>) -> AnswerResult<Self> {
        let client = reqwest::Client::builder().build().context(BuildClientSnafu {
            stage: "build-answer-client",
        })?;

        Ok(Self::with_client(client, base_url))
    }

    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim().trim_end_matches('/').to_string();
        Self { client, base_url }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn post_chat(&self, request: &ChatRequest) -> AnswerResult<String> {
        let response = self
            .client
            .post(self.endpoint("chat"))
            .json(request)
            .send()
            .await
            .context(UnreachableSnafu {
                stage: "send-chat-request",
                base_url: self.base_url.clone(),
            })?;

        let status = response.status();
        let body = response.text().await.context(ReadBodySnafu {
            stage: "read-chat-response",
        })?;

        if !status.is_success() {
            return StatusSnafu {
                stage: "chat-http-status",
                status: status.as_u16(),
                message: error_detail_from_body(&body)
                    .unwrap_or_else(|| GENERIC_STATUS_DETAIL.to_string()),
            }
            .fail();
        }

        let payload: ChatResponse = serde_json::from_str(&body).context(DecodeSnafu {
            stage: "decode-chat-response",
        })?;
        payload.into_answer()
    }

    /// Checks `GET /health`.
    pub async fn health(&self) -> AnswerResult<HealthStatus> {
        let response = self
            .client
            .get(self.endpoint("health"))
            .send()
            .await
            .context(UnreachableSnafu {
                stage: "send-health-request",
                base_url: self.base_url.clone(),
            })?;

        let status = response.status();
        let body = response.text().await.context(ReadBodySnafu {
            stage: "read-health-response",
        })?;

        if !status.is_success() {
            return StatusSnafu {
                stage: "health-http-status",
                status: status.as_u16(),
                message: error_detail_from_body(&body)
                    .unwrap_or_else(|| GENERIC_STATUS_DETAIL.to_string()),
            }
            .fail();
        }

        serde_json::from_str(&body).context(DecodeSnafu {
            stage: "decode-health-response",
        })
    }
}

impl AnswerService for HttpAnswerService {
    fn ask<'a>(&'a self, request: ChatRequest) -> BoxFuture<'a, AnswerResult<String>> {
        Box::pin(async move {
            tracing::debug!(
                video_id = %request.video_id,
                query_len = request.user_query.len(),
                "sending question to answering service"
            );

            let result = self.post_chat(&request).await;
            if let Err(error) = &result {
                tracing::warn!(
                    video_id = %request.video_id,
                    base_url = %self.base_url,
                    error = %error,
                    "answering service request failed"
                );
            }
            result
        })
    }
}
