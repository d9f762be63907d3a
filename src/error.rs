//! Error types for the chat relay

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

/// Result type for relay operations
pub type RelayResult<T> = Result<T, RelayError>;

/// Errors that can occur while configuring or relaying a chat
#[derive(Error, Debug)]
pub enum RelayError {
    #[error("No completion service configured: set LOCAL_OPENAI_ENDPOINT or OPENAI_AUTH_TOKEN")]
    ConfigurationMissing,

    #[error("Completion client is not available")]
    ServiceUnavailable,

    #[error("Malformed request: {0}")]
    MalformedRequest(String),

    #[error("Error code: {status} - {body}")]
    UpstreamStatus { status: u16, body: String },

    #[error("{0}")]
    Upstream(String),

    #[error("Connection error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid JSON from completion service: {0}")]
    Json(#[from] serde_json::Error),
}

impl RelayError {
    /// HTTP status used when the error is reported before streaming starts
    pub fn status_code(&self) -> StatusCode {
        match self {
            RelayError::MalformedRequest(_) => StatusCode::BAD_REQUEST,
            RelayError::ConfigurationMissing | RelayError::ServiceUnavailable => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            _ => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({ "error": self.to_string() });
        (self.status_code(), Json(body)).into_response()
    }
}
