//! Request-processing pipeline for computation-heavy APIs.
//!
//! Fronts an opaque upstream HTTP service with rate limiting, response
//! caching, compression, payload-size admission control, request-timing
//! telemetry, and a supervised background-task registry for shutdown.

pub mod cache;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod middleware;
pub mod observability;

pub use config::schema::GatewayConfig;
pub use http::GatewayServer;
pub use lifecycle::{Shutdown, TaskSupervisor};
