//! HTTP surface of the gateway.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, pipeline layer order, graceful shutdown)
//!     → middleware stages (see crate::middleware)
//!     → upstream.rs (forward to the computation API)
//! ```

pub mod server;
pub mod upstream;

pub use server::GatewayServer;
