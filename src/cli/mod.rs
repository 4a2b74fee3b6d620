//! CLI module for docbridge
//!
//! Parses flags (with environment fallbacks), validates them into a
//! [`BridgeConfig`] and runs the server.

mod args;
mod commands;
mod config;
mod errors;

pub use args::Args;
pub use commands::{run, serve};
pub use config::{BridgeConfig, StoreBackend};
pub use errors::{CliError, CliResult};
