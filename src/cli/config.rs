//! Validated start-up configuration

use crate::codec::FloatMode;
use crate::http_server::HttpServerConfig;
use crate::observability::LogFormat;

use super::args::Args;
use super::errors::{CliError, CliResult};

/// Which store backs the bridge
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreBackend {
    InMemory,
    Mongo { uri: String },
}

/// Everything the process needs to start
#[derive(Debug, Clone, PartialEq)]
pub struct BridgeConfig {
    pub server: HttpServerConfig,
    pub backend: StoreBackend,
    pub log_format: LogFormat,
}

impl BridgeConfig {
    /// Validate parsed arguments
    pub fn from_args(args: Args) -> CliResult<Self> {
        if args.port == 0 {
            return Err(CliError::config_error("port must be greater than 0"));
        }
        if args.request_timeout_ms == 0 {
            return Err(CliError::config_error(
                "request timeout must be greater than 0",
            ));
        }
        let float_mode: FloatMode = args.float_mode.parse().map_err(CliError::Config)?;

        // an empty key is the same as no key
        let api_key = args.api_key.filter(|key| !key.is_empty());

        let backend = match args.mongo_uri.filter(|uri| !uri.is_empty()) {
            None => StoreBackend::InMemory,
            Some(uri) if cfg!(feature = "mongodb-backend") => StoreBackend::Mongo { uri },
            Some(_) => {
                return Err(CliError::config_error(
                    "--mongo-uri needs a build with the mongodb-backend feature",
                ))
            }
        };

        Ok(Self {
            server: HttpServerConfig {
                host: args.host,
                port: args.port,
                api_key,
                float_mode,
                request_timeout_ms: args.request_timeout_ms,
                slow_request_ms: args.slow_request_ms,
            },
            backend,
            log_format: args.log_format,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn args(extra: &[&str]) -> Args {
        let mut argv = vec!["docbridge", "--host", "127.0.0.1"];
        argv.extend_from_slice(extra);
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_valid_config() {
        let config = BridgeConfig::from_args(args(&["--port", "3000", "--api-key", "k", "--float-mode", "relaxed"])).unwrap();
        assert_eq!(config.server.socket_addr(), "127.0.0.1:3000");
        assert_eq!(config.server.api_key.as_deref(), Some("k"));
        assert_eq!(config.server.float_mode, FloatMode::Relaxed);
    }

    #[test]
    fn test_invalid_values() {
        assert!(BridgeConfig::from_args(args(&["--port", "0"])).is_err());
        assert!(BridgeConfig::from_args(args(&["--request-timeout-ms", "0"])).is_err());
        assert!(BridgeConfig::from_args(args(&["--float-mode", "loose"])).is_err());
    }

    #[test]
    fn test_empty_api_key_means_open() {
        let config = BridgeConfig::from_args(args(&["--api-key", ""])).unwrap();
        assert_eq!(config.server.api_key, None);
    }

    #[cfg(not(feature = "mongodb-backend"))]
    #[test]
    fn test_mongo_uri_requires_feature() {
        let err = BridgeConfig::from_args(args(&["--mongo-uri", "mongodb://localhost:27017"])).unwrap_err();
        assert!(matches!(err, CliError::Config(_)));
    }

    #[cfg(feature = "mongodb-backend")]
    #[test]
    fn test_mongo_backend_selected() {
        let config = BridgeConfig::from_args(args(&["--mongo-uri", "mongodb://localhost:27017"])).unwrap();
        assert_eq!(
            config.backend,
            StoreBackend::Mongo {
                uri: "mongodb://localhost:27017".to_string()
            }
        );
    }
}
