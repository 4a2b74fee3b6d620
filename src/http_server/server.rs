//! # HTTP Server
//!
//! Combines the operation, health and metrics routes with their middleware
//! and serves them until a shutdown signal arrives.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{middleware, Router};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::dispatcher::Dispatcher;
use crate::observability::metrics;
use crate::store::DocumentStore;

use super::config::HttpServerConfig;
use super::middleware::{auth_middleware, metrics_middleware, request_id_middleware};
use super::routes::{operation_routes, public_routes, AppState};

/// HTTP front end of the bridge
pub struct HttpServer {
    config: HttpServerConfig,
    router: Router,
}

impl HttpServer {
    /// Create a server over a store
    pub fn new(config: HttpServerConfig, store: Arc<dyn DocumentStore>) -> Self {
        let dispatcher = Dispatcher::new(store)
            .with_float_mode(config.float_mode)
            .with_timeout(config.request_timeout());
        let state = AppState::new(dispatcher, metrics::install_recorder())
            .with_api_key(config.api_key.clone())
            .with_slow_request_threshold(config.slow_request_threshold());
        let router = build_router(state);
        Self { config, router }
    }

    /// Get the socket address
    pub fn socket_addr(&self) -> String {
        self.config.socket_addr()
    }

    /// Serve until Ctrl-C or SIGTERM
    pub async fn start(self) -> Result<(), std::io::Error> {
        let addr: SocketAddr = self.config.socket_addr().parse().map_err(|e| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("invalid socket address {}: {}", self.config.socket_addr(), e),
            )
        })?;

        if self.config.api_key.is_none() {
            warn!("no API key configured, the API is open to every caller");
        }

        let listener = TcpListener::bind(addr).await?;
        info!(
            address = %addr,
            float_mode = %self.config.float_mode,
            "docbridge listening"
        );

        axum::serve(listener, self.router)
            .with_graceful_shutdown(wait_for_signal())
            .await?;

        info!("server stopped");
        Ok(())
    }
}

/// Build the router with all routes and middleware layers.
///
/// Middleware from outermost to innermost:
/// Trace, request id, metrics, then the API-key check on operation routes.
pub fn build_router(state: AppState) -> Router {
    let protected = operation_routes().route_layer(middleware::from_fn_with_state(
        state.clone(),
        auth_middleware,
    ));

    Router::new()
        .merge(public_routes())
        .merge(protected)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            metrics_middleware,
        ))
        .layer(middleware::from_fn(request_id_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {}", e);
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;

    #[test]
    fn test_socket_addr() {
        let server = HttpServer::new(
            HttpServerConfig::with_port(8081),
            Arc::new(InMemoryStore::new()),
        );
        assert_eq!(server.socket_addr(), "0.0.0.0:8081");
    }
}
