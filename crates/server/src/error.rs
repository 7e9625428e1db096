//! API error types.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

/// API error response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling.
    pub code: String,
    /// Human-readable error message.
    pub message: String,
}

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("unsupported media type: {0}")]
    UnsupportedMediaType(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("too large: {0}")]
    TooLarge(String),

    #[error("gateway timeout: {0}")]
    GatewayTimeout(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("storage error: {0}")]
    Storage(#[from] darkroom_storage::StorageError),

    #[error("metadata error: {0}")]
    Metadata(#[from] darkroom_metadata::MetadataError),

    #[error("imaging error: {0}")]
    Imaging(#[from] darkroom_imaging::ImagingError),
}

impl ApiError {
    /// Get the error code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::InvalidRequest(_) => "invalid_request",
            Self::UnsupportedMediaType(_) => "unsupported_media_type",
            Self::Forbidden(_) => "forbidden",
            Self::TooLarge(_) => "too_large",
            Self::GatewayTimeout(_) => "gateway_timeout",
            Self::Internal(_) => "internal_error",
            Self::Storage(_) => "storage_error",
            Self::Metadata(_) => "metadata_error",
            Self::Imaging(e) => match e {
                darkroom_imaging::ImagingError::Timeout => "gateway_timeout",
                darkroom_imaging::ImagingError::TooLarge { .. } => "too_large",
                darkroom_imaging::ImagingError::UnrecognizedFormat => "unsupported_media_type",
                _ => "imaging_error",
            },
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::TooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            Self::GatewayTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Storage(e) => match e {
                darkroom_storage::StorageError::NotFound(_) => StatusCode::NOT_FOUND,
                darkroom_storage::StorageError::InvalidKey(_) => StatusCode::BAD_REQUEST,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Metadata(e) => match e {
                darkroom_metadata::MetadataError::NotFound(_) => StatusCode::NOT_FOUND,
                darkroom_metadata::MetadataError::AlreadyExists(_) => StatusCode::FORBIDDEN,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Imaging(e) => match e {
                darkroom_imaging::ImagingError::Timeout => StatusCode::GATEWAY_TIMEOUT,
                darkroom_imaging::ImagingError::TooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
                darkroom_imaging::ImagingError::UnrecognizedFormat => {
                    StatusCode::UNSUPPORTED_MEDIA_TYPE
                }
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            code: self.code().to_string(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// Result type for API handlers.
pub type ApiResult<T> = std::result::Result<T, ApiError>;
