//! CLI argument definitions using clap
//!
//! Every flag falls back to an environment variable:
//! - docbridge --port 3000 --api-key secret
//! - PORT=3000 API_KEY=secret docbridge

use clap::Parser;

use crate::observability::LogFormat;

/// docbridge - HTTP bridge to a document database speaking extended JSON
#[derive(Parser, Debug, Clone, PartialEq)]
#[command(name = "docbridge")]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Host to bind to
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to bind to
    #[arg(long, env = "PORT", default_value_t = 3000)]
    pub port: u16,

    /// Shared secret required in the `apiKey` header
    #[arg(long, env = "API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// MongoDB connection string; the in-memory store is used when absent
    #[arg(long, env = "MONGO_URI", hide_env_values = true)]
    pub mongo_uri: Option<String>,

    /// Float output mode: canonical or relaxed
    #[arg(long, env = "FLOAT_MODE", default_value = "canonical")]
    pub float_mode: String,

    /// Per-request store timeout in milliseconds
    #[arg(long, env = "REQUEST_TIMEOUT_MS", default_value_t = 10_000)]
    pub request_timeout_ms: u64,

    /// Requests slower than this many milliseconds are logged
    #[arg(long, env = "SLOW_REQUEST_MS", default_value_t = 100)]
    pub slow_request_ms: u64,

    /// Log output format
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Json)]
    pub log_format: LogFormat,
}

impl Args {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Args::parse()
    }
}
