//! Operation HTTP Routes
//!
//! `POST /api/<operation>` for the nine operations, plus `GET /api/health`
//! and `GET /metrics`.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::dispatcher::{ApiError, Dispatcher, OperationKind};

// ==================
// Shared State
// ==================

/// State shared across handlers and middleware
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    pub api_key: Option<Arc<str>>,
    pub slow_request_threshold: Duration,
    pub prometheus: PrometheusHandle,
}

impl AppState {
    pub fn new(dispatcher: Dispatcher, prometheus: PrometheusHandle) -> Self {
        Self {
            dispatcher: Arc::new(dispatcher),
            api_key: None,
            slow_request_threshold: Duration::from_millis(100),
            prometheus,
        }
    }

    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key.map(Arc::from);
        self
    }

    pub fn with_slow_request_threshold(mut self, threshold: Duration) -> Self {
        self.slow_request_threshold = threshold;
        self
    }
}

// ==================
// Response Types
// ==================

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

// ==================
// Routers
// ==================

/// One `POST /api/<operation>` route per operation kind
pub fn operation_routes() -> Router<AppState> {
    OperationKind::ALL
        .into_iter()
        .fold(Router::new(), |router, kind| {
            router.route(
                &kind.path(),
                post(move |State(state): State<AppState>, body: Bytes| async move {
                    operation_handler(state, kind, body).await
                }),
            )
        })
}

/// Health and metrics routes, never behind the API key
pub fn public_routes() -> Router<AppState> {
    Router::new()
        .route("/api/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
}

// ==================
// Handlers
// ==================

async fn operation_handler(state: AppState, kind: OperationKind, body: Bytes) -> Response {
    let parsed: JsonValue = match serde_json::from_slice(&body) {
        Ok(value) => value,
        Err(e) => return ApiError::BadRequest(format!("invalid JSON body: {}", e)).into_response(),
    };

    match state.dispatcher.dispatch(kind, parsed).await {
        Ok(body) => (StatusCode::OK, Json(body)).into_response(),
        Err(err) => err.into_response(),
    }
}

/// Health check handler
async fn health_handler() -> impl IntoResponse {
    let response = HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    };

    (StatusCode::OK, Json(response))
}

/// Prometheus text exposition
async fn metrics_handler(State(state): State<AppState>) -> String {
    state.prometheus.render()
}
