//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Upstream computation API the gateway fronts.
    pub upstream: UpstreamConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Sliding-window rate limiting configuration.
    pub rate_limit: RateLimitConfig,

    /// Response cache configuration.
    pub cache: CacheConfig,

    /// Response compression configuration.
    pub compression: CompressionConfig,

    /// Request payload limits.
    pub limits: LimitsConfig,

    /// Request timing telemetry.
    pub telemetry: TelemetryConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Upstream configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Upstream address (e.g., "127.0.0.1:3000").
    pub address: String,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:3000".to_string(),
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}

/// Sliding-window rate limiting configuration.
///
/// Both windows are evaluated independently; a request must pass both.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting.
    pub enabled: bool,

    /// Maximum requests per trailing 60 seconds, per client.
    pub requests_per_minute: u32,

    /// Maximum requests per trailing 3600 seconds, per client.
    pub requests_per_hour: u32,

    /// Paths that bypass rate limiting entirely.
    pub excluded_paths: Vec<String>,

    /// Retry-After hint attached to denials, in seconds.
    pub retry_after_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            requests_per_minute: 100,
            requests_per_hour: 2000,
            excluded_paths: vec!["/health".to_string(), "/".to_string()],
            retry_after_secs: 60,
        }
    }
}

/// Response cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Enable response caching.
    pub enabled: bool,

    /// Time-to-live for cached responses, in seconds.
    pub ttl_secs: u64,

    /// Paths that are never cached.
    pub excluded_paths: Vec<String>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: 300,
            excluded_paths: vec![
                "/health".to_string(),
                "/".to_string(),
                "/api/v4/now".to_string(),
            ],
        }
    }
}

/// Response compression configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CompressionConfig {
    /// Enable gzip response compression.
    pub enabled: bool,

    /// Bodies smaller than this are never compressed, in bytes.
    pub min_size: usize,

    /// Gzip compression level (0-9).
    pub level: u32,

    /// Content types eligible for compression (substring match).
    pub compressible_types: Vec<String>,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_size: 1024,
            level: 6,
            compressible_types: vec![
                "application/json".to_string(),
                "text/".to_string(),
                "application/javascript".to_string(),
                "application/xml".to_string(),
                "image/svg+xml".to_string(),
            ],
        }
    }
}

/// Request payload limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum declared request body size in bytes.
    pub max_body_size: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_body_size: 2 * 1024 * 1024, // 2MB
        }
    }
}

/// Request timing telemetry.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Requests slower than this are logged at warn level, in milliseconds.
    pub slow_request_threshold_ms: u64,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            slow_request_threshold_ms: 2000,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
