//! CLI-specific error types
//!
//! Every CLI error is fatal: it is printed to stderr and the process exits
//! with a non-zero status.

use std::io;

use thiserror::Error;

use crate::store::StoreError;

/// CLI error
#[derive(Debug, Error)]
pub enum CliError {
    /// Invalid flag or environment value
    #[error("configuration error: {0}")]
    Config(String),

    /// Logging could not be initialised
    #[error("logging error: {0}")]
    Logging(String),

    /// Backing store unavailable at start-up
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Runtime or socket failure
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl CliError {
    /// Config error
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Get the error code string
    pub fn code_str(&self) -> &'static str {
        match self {
            CliError::Config(_) => "DOCBRIDGE_CLI_CONFIG_ERROR",
            CliError::Logging(_) => "DOCBRIDGE_CLI_LOGGING_ERROR",
            CliError::Store(_) => "DOCBRIDGE_CLI_STORE_ERROR",
            CliError::Io(_) => "DOCBRIDGE_CLI_IO_ERROR",
        }
    }
}

/// CLI result type
pub type CliResult<T> = Result<T, CliError>;
