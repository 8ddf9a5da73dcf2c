#![deny(unsafe_code)]

mod http;
mod service;

pub use http::{DEFAULT_BASE_URL, HttpAnswerService};
pub use service::{
    AnswerError, AnswerResult, AnswerService, ChatRequest, ChatResponse, FailureCategory,
    GENERIC_REJECTION_DETAIL, GENERIC_STATUS_DETAIL, HealthStatus, error_detail_from_body,
};
