//! Request timing telemetry.
//!
//! Purely observational: records elapsed wall time, stamps it on the
//! response, and logs every request (warn level when slow). Never alters
//! control flow and never discards the inner response.

use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::State,
    http::{HeaderValue, Request},
    middleware::Next,
    response::Response,
};

use crate::config::TelemetryConfig;
use crate::observability::metrics;

pub const PROCESS_TIME_HEADER: &str = "x-process-time";

/// State for the telemetry middleware.
#[derive(Clone)]
pub struct TelemetryState {
    slow_threshold: Duration,
}

impl TelemetryState {
    pub fn new(config: TelemetryConfig) -> Self {
        Self {
            slow_threshold: Duration::from_millis(config.slow_request_threshold_ms),
        }
    }
}

/// Middleware function recording per-request wall time.
pub async fn telemetry_middleware(
    State(state): State<TelemetryState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();
    let path = request.uri().path().to_string();

    let mut response = next.run(request).await;

    let elapsed = start.elapsed();
    let status = response.status().as_u16();

    // A header that fails to render is dropped, not fatal.
    if let Ok(value) = HeaderValue::from_str(&format!("{:.6}", elapsed.as_secs_f64())) {
        response.headers_mut().insert(PROCESS_TIME_HEADER, value);
    }

    if elapsed > state.slow_threshold {
        tracing::warn!(
            method = %method,
            path = %path,
            status,
            elapsed_ms = elapsed.as_millis() as u64,
            "Slow request detected"
        );
    }
    tracing::info!(
        method = %method,
        path = %path,
        status,
        elapsed_ms = elapsed.as_millis() as u64,
        "Request completed"
    );

    metrics::record_request(&method, status, start);

    response
}
