//! # API Errors
//!
//! Every failure a request can end in, with its HTTP status and the
//! `{"error": "<message>"}` body returned to the client.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use crate::codec::CodecError;
use crate::store::StoreError;

/// Result type for request handling
pub type ApiResult<T> = Result<T, ApiError>;

/// Message returned in place of internal details
pub const INTERNAL_MESSAGE: &str = "internal server error";

/// Request failures
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    // ==================
    // Client Errors (4xx)
    // ==================
    /// Malformed body, missing field or wrong field shape
    #[error("{0}")]
    BadRequest(String),

    /// Reserved-key payload that does not decode
    #[error("{0}")]
    Codec(#[from] CodecError),

    /// Missing or wrong API key
    #[error("Forbidden: invalid API key")]
    Forbidden,

    /// `findOne` matched nothing
    #[error("No document found")]
    NotFound,

    // ==================
    // Server Errors (5xx)
    // ==================
    /// Failure reported by the backing store
    #[error("{0}")]
    Store(#[from] StoreError),

    /// Store call exceeded the request timeout
    #[error("operation timed out after {0}ms")]
    Timeout(u64),
}

impl ApiError {
    /// Get HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) | ApiError::Codec(_) => StatusCode::BAD_REQUEST,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Store(_) | ApiError::Timeout(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to show the client
    pub fn client_message(&self) -> String {
        match self {
            ApiError::Store(err) if err.is_internal() => INTERNAL_MESSAGE.to_string(),
            other => other.to_string(),
        }
    }
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl From<&ApiError> for ErrorResponse {
    fn from(err: &ApiError) -> Self {
        Self {
            error: err.client_message(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(ErrorResponse::from(&self));
        (status, body).into_response()
    }
}
