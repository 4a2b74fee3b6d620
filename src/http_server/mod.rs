//! # HTTP Server Module
//!
//! The axum front end of the bridge.
//!
//! # Endpoints
//!
//! - `POST /api/{insertOne,insertMany,findOne,find,updateOne,updateMany,deleteOne,deleteMany,aggregate}`
//! - `GET /api/health` - Health check
//! - `GET /metrics` - Prometheus metrics
//!
//! When an API key is configured, the operation routes require it in the
//! `apiKey` header.

pub mod config;
pub mod middleware;
pub mod routes;
pub mod server;

pub use config::HttpServerConfig;
pub use routes::AppState;
pub use server::{build_router, HttpServer};
