//! API error handling.
//!
//! Provides consistent error responses for the API.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::json;

use crate::error::Error;

/// API error response body.
#[derive(Debug, Serialize)]
pub struct ApiErrorResponse {
    /// Always `false`; mirrors the success envelope.
    pub success: bool,
    /// Error code for programmatic handling
    pub code: String,
    /// Human-readable error message
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// API error type that can be converted to HTTP responses.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: String,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(status: StatusCode, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "BAD_REQUEST", message)
    }

    /// Create a 422 Unprocessable Entity error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNPROCESSABLE_ENTITY, "VALIDATION_ERROR", message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", message)
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE", message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiErrorResponse {
            success: false,
            code: self.code,
            message: self.message,
            details: self.details,
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        match err {
            Error::DuplicateEvent { event_id } => {
                ApiError::new(StatusCode::CONFLICT, "DUPLICATE_EVENT", "Event already processed")
                    .with_details(json!({ "event_id": event_id }))
            }
            Error::InvalidPayload(msg) => ApiError::validation(msg),
            Error::ConnectionFailure { .. }
            | Error::UpstreamClientError { .. }
            | Error::UpstreamRateLimited { .. }
            | Error::UpstreamServerError { .. } => {
                tracing::error!("Upstream error: {}", err);
                let details = json!({
                    "upstream_status": err.upstream_status(),
                    "upstream_body": err.upstream_body(),
                });
                let code = if matches!(err, Error::ConnectionFailure { .. }) {
                    "CONNECTION_ERROR"
                } else {
                    "UPSTREAM_ERROR"
                };
                ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, code, err.to_string())
                    .with_details(details)
            }
            Error::CredentialUnavailable(_) => {
                tracing::error!("Credential error: {}", err);
                ApiError::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "CREDENTIAL_UNAVAILABLE",
                    err.to_string(),
                )
            }
            Error::RetriesExhausted { .. } => {
                tracing::error!("{}", err);
                ApiError::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "RETRIES_EXHAUSTED",
                    err.to_string(),
                )
            }
            _ => {
                tracing::error!("Unexpected error: {}", err);
                ApiError::internal(err.to_string())
            }
        }
    }
}

/// Result type for API handlers.
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_maps_to_conflict() {
        let err: ApiError = Error::DuplicateEvent {
            event_id: "ghl_abc".to_string(),
        }
        .into();

        assert_eq!(err.status, StatusCode::CONFLICT);
        assert_eq!(err.code, "DUPLICATE_EVENT");
        assert_eq!(err.details.unwrap()["event_id"], "ghl_abc");
    }

    #[test]
    fn test_upstream_error_carries_details() {
        let err: ApiError = Error::from_status("ghl", 422, "email invalid").into();

        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.code, "UPSTREAM_ERROR");
        let details = err.details.unwrap();
        assert_eq!(details["upstream_status"], 422);
        assert_eq!(details["upstream_body"], "email invalid");
    }

    #[test]
    fn test_invalid_payload_is_validation_error() {
        let err: ApiError = Error::invalid_payload("missing event_type").into();
        assert_eq!(err.status, StatusCode::UNPROCESSABLE_ENTITY);
    }
}
