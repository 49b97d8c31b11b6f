//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → GatewayConfig (validated, immutable)
//!     → scalar sections handed to each pipeline stage at construction
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a restart
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use schema::CacheConfig;
pub use schema::CompressionConfig;
pub use schema::GatewayConfig;
pub use schema::LimitsConfig;
pub use schema::RateLimitConfig;
pub use schema::TelemetryConfig;
