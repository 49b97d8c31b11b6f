//! Request-processing pipeline stages.
//!
//! # Data Flow
//! ```text
//! inbound request
//!     → compression.rs  (wraps everything below; compresses eligible bodies)
//!     → telemetry.rs    (timing capture, slow-request logging)
//!     → rate_limit.rs   (sliding-window admission per client identity)
//!     → size_limit.rs   (declared payload size ceiling)
//!     → cache.rs        (fingerprint-keyed TTL cache; hit short-circuits)
//!     → upstream handler
//! ```
//!
//! # Design Decisions
//! - Each stage is an independent axum middleware fn with its own state
//! - Admission denials (429/413) are the only user-visible stage failures;
//!   every other stage degrades by skipping itself
//! - Stage state is owned by the server and injected per layer, never global

pub mod cache;
pub mod compression;
pub mod identity;
pub mod rate_limit;
pub mod size_limit;
pub mod telemetry;
