//! HTTP Server Configuration
//!
//! Bind address, API key and request-handling limits.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::codec::FloatMode;

/// HTTP server configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpServerConfig {
    /// Host to bind to (default: "0.0.0.0")
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to bind to (default: 3000)
    #[serde(default = "default_port")]
    pub port: u16,

    /// Shared secret expected in the `apiKey` header; `None` leaves the API open
    #[serde(default)]
    pub api_key: Option<String>,

    /// How floats are written in responses
    #[serde(default)]
    pub float_mode: FloatMode,

    /// Per-request store timeout in milliseconds (default: 10000)
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Requests slower than this are logged (default: 100)
    #[serde(default = "default_slow_request_ms")]
    pub slow_request_ms: u64,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

fn default_slow_request_ms() -> u64 {
    100
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            api_key: None,
            float_mode: FloatMode::default(),
            request_timeout_ms: default_request_timeout_ms(),
            slow_request_ms: default_slow_request_ms(),
        }
    }
}

impl HttpServerConfig {
    /// Create a new config with specified port
    pub fn with_port(port: u16) -> Self {
        Self {
            port,
            ..Default::default()
        }
    }

    /// Get the socket address string
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn slow_request_threshold(&self) -> Duration {
        Duration::from_millis(self.slow_request_ms)
    }
}
