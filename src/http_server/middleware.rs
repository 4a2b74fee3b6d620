//! HTTP Middleware
//!
//! API-key check, request ids and per-request metrics with slow-request
//! logging.

use std::time::Instant;

use axum::{
    body::Body,
    extract::State,
    http::{HeaderName, HeaderValue, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use subtle::ConstantTimeEq;
use tracing::{warn, Instrument};
use uuid::Uuid;

use crate::dispatcher::{ApiError, OperationKind};
use crate::observability::metrics;

use super::routes::AppState;

/// Header carrying the shared secret
pub const API_KEY_HEADER: &str = "apikey";

/// Header echoing the request id
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Constant-time comparison of two strings
pub fn constant_time_str_eq(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

/// Reject requests whose `apiKey` header does not match the configured key
pub async fn auth_middleware(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    if let Some(expected) = state.api_key.as_deref() {
        let provided = req
            .headers()
            .get(API_KEY_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        if !constant_time_str_eq(provided, expected) {
            return ApiError::Forbidden.into_response();
        }
    }
    next.run(req).await
}

/// Tag each request with a UUID, in a span and in the response header
pub async fn request_id_middleware(req: Request<Body>, next: Next) -> Response {
    let request_id = Uuid::new_v4().to_string();
    let span = tracing::info_span!("request", request_id = %request_id);
    async move {
        let mut response = next.run(req).await;
        if let Ok(value) = HeaderValue::from_str(&request_id) {
            response
                .headers_mut()
                .insert(HeaderName::from_static(REQUEST_ID_HEADER), value);
        }
        response
    }
    .instrument(span)
    .await
}

/// Record metrics for operation routes and log slow or failed requests
pub async fn metrics_middleware(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let method = req.method().to_string();
    let path = req.uri().path().to_string();
    let start = Instant::now();

    let response = next.run(req).await;

    let elapsed = start.elapsed();
    let status = response.status();
    if OperationKind::from_path(&path).is_some() {
        metrics::record_request(&method, &path, status.as_u16(), elapsed);
    }
    if elapsed > state.slow_request_threshold || !status.is_success() {
        warn!(
            method = %method,
            path = %path,
            status = status.as_u16(),
            duration_ms = elapsed.as_millis() as u64,
            "slow or failed request"
        );
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_time_comparison() {
        assert!(constant_time_str_eq("hello", "hello"));
        assert!(!constant_time_str_eq("hello", "world"));
        assert!(!constant_time_str_eq("hello", "hello!"));
        assert!(!constant_time_str_eq("", "secret"));
    }
}
