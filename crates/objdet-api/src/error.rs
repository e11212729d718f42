//! API error types.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use objdet_media::MediaError;
use objdet_storage::StorageError;
use serde::Serialize;
use thiserror::Error;

pub type ApiResult<T> = Result<T, ApiError>;

/// Plain-text body sent for rejected uploads.
pub const REJECTED_UPLOAD_BODY: &str = "Invalid file or format";

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Media(#[from] MediaError),
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn payload_too_large(msg: impl Into<String>) -> Self {
        Self::PayloadTooLarge(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Storage(e) => match e {
                StorageError::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
                StorageError::InvalidFilename(_) | StorageError::EmptyUpload => StatusCode::BAD_REQUEST,
                StorageError::NotFound(_) => StatusCode::NOT_FOUND,
                StorageError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::Media(e) => match e {
                MediaError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
                e if e.is_invocation_error() => StatusCode::SERVICE_UNAVAILABLE,
                MediaError::MalformedReport(_) => StatusCode::BAD_GATEWAY,
                MediaError::MalformedPredictionLine { .. } => StatusCode::UNPROCESSABLE_ENTITY,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    /// Stable machine-readable error kind.
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "bad_request",
            ApiError::NotFound(_) => "not_found",
            ApiError::PayloadTooLarge(_) => "payload_too_large",
            ApiError::Internal(_) => "internal",
            ApiError::Storage(e) => match e {
                StorageError::UnsupportedMediaType(_) => "unsupported_media_type",
                StorageError::InvalidFilename(_) => "invalid_filename",
                StorageError::EmptyUpload => "empty_upload",
                StorageError::NotFound(_) => "not_found",
                StorageError::Io(_) => "storage_error",
            },
            ApiError::Media(e) => match e {
                MediaError::Timeout(_) => "invocation_timeout",
                e if e.is_invocation_error() => "invocation_error",
                MediaError::MalformedReport(_) => "malformed_report",
                MediaError::MalformedPredictionLine { .. } => "malformed_prediction_line",
                _ => "internal",
            },
        }
    }

    /// Whether this is an upload rejected for its extension.
    pub fn is_rejected_upload(&self) -> bool {
        matches!(self, ApiError::Storage(StorageError::UnsupportedMediaType(_)))
    }

    /// Message safe to show to clients. Internal detail is hidden in production.
    pub fn public_detail(&self, production: bool) -> String {
        if production && self.status_code() == StatusCode::INTERNAL_SERVER_ERROR {
            return "An internal error occurred".to_string();
        }
        self.to_string()
    }

    /// Response for this error: plain text for rejected uploads, JSON otherwise.
    pub fn to_response(&self, production: bool) -> Response {
        let status = self.status_code();

        if self.is_rejected_upload() {
            return (status, REJECTED_UPLOAD_BODY).into_response();
        }

        let body = ErrorResponse {
            detail: self.public_detail(production),
            code: self.code(),
        };

        (status, Json(body)).into_response()
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    detail: String,
    code: &'static str,
}

/// Without access to the config, internal detail is always hidden.
impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        self.to_response(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_each_pipeline_error_kind_has_its_own_status() {
        let cases: Vec<(ApiError, StatusCode)> = vec![
            (
                StorageError::unsupported_media_type("a.gif").into(),
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ),
            (
                StorageError::Io(std::io::Error::other("disk full")).into(),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                MediaError::detector_failed("boom", None, Some(1)).into(),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (MediaError::Timeout(30).into(), StatusCode::GATEWAY_TIMEOUT),
            (MediaError::malformed_report("no header").into(), StatusCode::BAD_GATEWAY),
            (
                MediaError::malformed_line(2, "dog", "short").into(),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
        ];

        for (err, status) in cases {
            assert_eq!(err.status_code(), status, "{}", err);
        }
    }

    #[test]
    fn test_codes() {
        assert_eq!(ApiError::from(MediaError::EmptyOutput).code(), "invocation_error");
        assert_eq!(ApiError::from(MediaError::Timeout(1)).code(), "invocation_timeout");
        assert_eq!(ApiError::from(StorageError::EmptyUpload).code(), "empty_upload");
        assert_eq!(ApiError::bad_request("x").code(), "bad_request");
    }

    #[test]
    fn test_spawn_failure_is_invocation_error() {
        let err = ApiError::from(MediaError::detector_failed("Failed to start detector", None, None));
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(err.code(), "invocation_error");
        assert_eq!(ApiError::from(MediaError::preprocess("x")).code(), "internal");
    }

    #[test]
    fn test_internal_detail_hidden_in_production() {
        let err = ApiError::internal("disk layout /srv/objdet broken");
        assert_eq!(err.public_detail(true), "An internal error occurred");
        assert!(err.public_detail(false).contains("/srv/objdet"));

        let not_found = ApiError::not_found("a.jpg");
        assert_eq!(not_found.public_detail(true), not_found.to_string());
    }

    #[test]
    fn test_rejected_upload_detection() {
        assert!(ApiError::from(StorageError::unsupported_media_type("x")).is_rejected_upload());
        assert!(!ApiError::from(StorageError::EmptyUpload).is_rejected_upload());
    }
}
