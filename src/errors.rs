// src/errors.rs
use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnalysisError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Camera unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("AI service is throttling requests: {message}")]
    Throttled {
        message: String,
        retry_after: Option<Duration>,
    },

    #[error("AI service unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("AI response could not be parsed: {0}")]
    MalformedResponse(String),

    #[error("AI response violates the order schema at `{field}`: {reason}")]
    SchemaViolation { field: String, reason: String },
}

impl AnalysisError {
    pub fn schema(field: impl Into<String>, reason: impl Into<String>) -> Self {
        AnalysisError::SchemaViolation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Stable name of the failure kind, shared with the browser UI.
    pub fn kind(&self) -> &'static str {
        match self {
            AnalysisError::InvalidInput(_) => "InvalidInputKind",
            AnalysisError::DeviceUnavailable(_) => "DeviceUnavailable",
            AnalysisError::Configuration(_) => "ConfigurationError",
            AnalysisError::Throttled { .. } => "ThrottledError",
            AnalysisError::UpstreamUnavailable(_) => "UpstreamUnavailable",
            AnalysisError::MalformedResponse(_) => "MalformedResponse",
            AnalysisError::SchemaViolation { .. } => "SchemaViolation",
        }
    }

    /// Whether repeating the same request may succeed.
    ///
    /// Bad model output for a given image tends to repeat, so malformed and
    /// schema-violating responses are not retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AnalysisError::Throttled { .. } | AnalysisError::UpstreamUnavailable(_)
        )
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            AnalysisError::Throttled { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

impl ResponseError for AnalysisError {
    fn status_code(&self) -> StatusCode {
        match self {
            AnalysisError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AnalysisError::DeviceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AnalysisError::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AnalysisError::Throttled { .. } => StatusCode::TOO_MANY_REQUESTS,
            AnalysisError::UpstreamUnavailable(_)
            | AnalysisError::MalformedResponse(_)
            | AnalysisError::SchemaViolation { .. } => StatusCode::BAD_GATEWAY,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let mut body = serde_json::json!({
            "error": self.kind(),
            "message": self.to_string(),
            "retryable": self.is_retryable(),
        });
        if let AnalysisError::SchemaViolation { field, .. } = self {
            body["field"] = serde_json::Value::String(field.clone());
        }

        let mut response = HttpResponse::build(self.status_code());
        if let Some(wait) = self.retry_after() {
            response.insert_header(("Retry-After", wait.as_secs().max(1).to_string()));
        }
        response.json(body)
    }
}
