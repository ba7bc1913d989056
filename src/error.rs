//! Error types for prompt-relay.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::upstream::UpstreamError;

/// Result type alias for prompt-relay operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for prompt-relay.
///
/// Only errors detected before any response bytes are sent are turned into
/// HTTP statuses. Streaming failures travel in-band as SSE error frames.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Upstream(#[from] UpstreamError),

    #[error("Not Found")]
    NotFound,
}

impl Error {
    /// HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Error::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Error::Upstream(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Error::NotFound => StatusCode::NOT_FOUND,
        }
    }
}

impl From<JsonRejection> for Error {
    fn from(rejection: JsonRejection) -> Self {
        Error::Validation(rejection.body_text())
    }
}

impl From<QueryRejection> for Error {
    fn from(rejection: QueryRejection) -> Self {
        Error::Validation(rejection.body_text())
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = serde_json::json!({ "detail": self.to_string() });

        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), 1_048_576)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_validation_is_422_with_detail() {
        let response = Error::Validation("prompt must not be empty".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let json = body_json(response).await;
        assert_eq!(json["detail"], "prompt must not be empty");
    }

    #[tokio::test]
    async fn test_upstream_is_500_with_provider_message() {
        let response = Error::Upstream(UpstreamError::Truncated).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json = body_json(response).await;
        assert!(json["detail"]
            .as_str()
            .unwrap()
            .contains("ended without a finish reason"));
    }

    #[test]
    fn test_config_error_message() {
        let err = Error::from(crate::config::ConfigError::Missing("OPENAI_API_KEY"));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(err.to_string().starts_with("Configuration error:"));
    }

    #[test]
    fn test_not_found_status() {
        assert_eq!(Error::NotFound.status_code(), StatusCode::NOT_FOUND);
    }
}
