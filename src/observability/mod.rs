//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Pipeline stages produce:
//!     → tracing events (structured logs, one record per request)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → Log aggregation (stdout via tracing-subscriber, wired in main)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Metrics are cheap (atomic increments), safe to call on the hot path
//! - Recording never fails the request; a missing exporter is a no-op

pub mod metrics;
