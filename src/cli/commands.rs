//! CLI command implementations
//!
//! Start-up order: parse and validate configuration, install logging, open
//! the store, then serve until shutdown.

use std::sync::Arc;

use tracing::info;

use crate::http_server::HttpServer;
use crate::observability::init_logging;
use crate::store::{DocumentStore, InMemoryStore};

use super::args::Args;
use super::config::{BridgeConfig, StoreBackend};
use super::errors::{CliError, CliResult};

/// Parse arguments and run the server
pub fn run() -> CliResult<()> {
    let config = BridgeConfig::from_args(Args::parse_args())?;
    init_logging(config.log_format).map_err(CliError::Logging)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(serve(config))
}

/// Open the configured store and serve until a shutdown signal
pub async fn serve(config: BridgeConfig) -> CliResult<()> {
    let store = open_store(&config.backend).await?;
    HttpServer::new(config.server, store).start().await?;
    Ok(())
}

async fn open_store(backend: &StoreBackend) -> CliResult<Arc<dyn DocumentStore>> {
    match backend {
        StoreBackend::InMemory => {
            info!("using in-memory store");
            Ok(Arc::new(InMemoryStore::new()))
        }
        #[cfg(feature = "mongodb-backend")]
        StoreBackend::Mongo { uri } => {
            let store = crate::store::MongoStore::connect(uri).await?;
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "mongodb-backend"))]
        StoreBackend::Mongo { .. } => Err(CliError::config_error(
            "--mongo-uri needs a build with the mongodb-backend feature",
        )),
    }
}
