//! Content-negotiated gzip response compression.

use std::io::Write;
use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    extract::State,
    http::{header, HeaderValue, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::config::CompressionConfig;

const MAX_BUFFERED_BODY: usize = 32 * 1024 * 1024;

/// State for the compression middleware.
#[derive(Clone)]
pub struct CompressionState {
    pub config: Arc<CompressionConfig>,
}

impl CompressionState {
    pub fn new(config: CompressionConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }
}

/// Eligibility gates shared with the tests. All must pass.
fn should_compress(
    config: &CompressionConfig,
    accepts_gzip: bool,
    content_type: Option<&str>,
    already_encoded: bool,
    body_len: usize,
) -> bool {
    if !accepts_gzip || already_encoded {
        return false;
    }
    if body_len < config.min_size {
        return false;
    }
    let content_type = content_type.unwrap_or_default();
    config
        .compressible_types
        .iter()
        .any(|ct| content_type.contains(ct.as_str()))
}

fn gzip(body: &[u8], level: u32) -> std::io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::new(level));
    encoder.write_all(body)?;
    encoder.finish()
}

/// Merge `Accept-Encoding` into an existing Vary value.
///
/// Returns the merged value, or None when it is already present.
fn merge_vary(existing: Option<&str>) -> Option<String> {
    match existing {
        Some(vary) if vary.to_ascii_lowercase().contains("accept-encoding") => None,
        Some(vary) if !vary.is_empty() => Some(format!("{vary}, Accept-Encoding")),
        _ => Some("Accept-Encoding".to_string()),
    }
}

/// Middleware function compressing eligible response bodies.
///
/// Body, Content-Encoding, Content-Length and Vary change together on
/// success; on any failure the original response is forwarded untouched.
pub async fn compression_middleware(
    State(state): State<CompressionState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let accepts_gzip = request
        .headers()
        .get(header::ACCEPT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_ascii_lowercase().contains("gzip"))
        .unwrap_or(false);

    let response = next.run(request).await;

    if !state.config.enabled || !accepts_gzip {
        return response;
    }

    let (mut parts, body) = response.into_parts();
    let bytes = match to_bytes(body, MAX_BUFFERED_BODY).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::error!(error = %e, "Failed to buffer response body for compression");
            return (StatusCode::BAD_GATEWAY, "Upstream body read failed").into_response();
        }
    };

    let content_type = parts
        .headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let already_encoded = parts.headers.contains_key(header::CONTENT_ENCODING);

    if !should_compress(
        &state.config,
        accepts_gzip,
        content_type.as_deref(),
        already_encoded,
        bytes.len(),
    ) {
        return Response::from_parts(parts, Body::from(bytes));
    }

    match gzip(&bytes, state.config.level) {
        Ok(compressed) => {
            parts
                .headers
                .insert(header::CONTENT_ENCODING, HeaderValue::from_static("gzip"));
            parts
                .headers
                .insert(header::CONTENT_LENGTH, HeaderValue::from(compressed.len()));
            let existing = parts
                .headers
                .get(header::VARY)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            if let Some(merged) = merge_vary(existing.as_deref()) {
                if let Ok(value) = HeaderValue::from_str(&merged) {
                    parts.headers.insert(header::VARY, value);
                }
            }
            Response::from_parts(parts, Body::from(compressed))
        }
        Err(e) => {
            // Compression failure is never fatal to the request.
            tracing::warn!(error = %e, "Compression failed, forwarding uncompressed");
            Response::from_parts(parts, Body::from(bytes))
        }
    }
}
