//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_requests_total` (counter): requests by method, status
//! - `gateway_request_duration_seconds` (histogram): latency distribution
//! - `gateway_rate_limited_total` (counter): denials by window
//! - `gateway_cache_lookups_total` (counter): lookups by result
//! - `gateway_cache_entries` (gauge): current cache entry count

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter on its own listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter started"),
        Err(e) => tracing::error!(error = %e, "Failed to start metrics exporter"),
    }
}

/// Record a completed request.
pub fn record_request(method: &str, status: u16, start: Instant) {
    counter!(
        "gateway_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string(),
    )
    .increment(1);
    histogram!(
        "gateway_request_duration_seconds",
        "method" => method.to_string(),
    )
    .record(start.elapsed().as_secs_f64());
}

/// Record a rate-limit denial for the given window.
pub fn record_rate_limited(window: &'static str) {
    counter!("gateway_rate_limited_total", "window" => window).increment(1);
}

pub fn record_cache_hit() {
    counter!("gateway_cache_lookups_total", "result" => "hit").increment(1);
}

pub fn record_cache_miss() {
    counter!("gateway_cache_lookups_total", "result" => "miss").increment(1);
}

/// Update the cache entry-count gauge.
pub fn record_cache_size(entries: usize) {
    gauge!("gateway_cache_entries").set(entries as f64);
}
