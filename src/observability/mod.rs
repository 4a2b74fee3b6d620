//! # Observability
//!
//! Structured logging through `tracing` and Prometheus metrics through the
//! `metrics` facade.
//!
//! ```ignore
//! use docbridge::observability::{init_logging, metrics, LogFormat};
//!
//! init_logging(LogFormat::Json)?;
//! let handle = metrics::install_recorder();
//! println!("{}", handle.render());
//! ```

mod logging;
pub mod metrics;

pub use logging::{init_logging, LogFormat, DEFAULT_FILTER};
