//! Declared payload size admission control.
//!
//! A best-effort guard: it rejects on the declared Content-Length before
//! the body is read, and passes requests that declare nothing.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{header, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::config::LimitsConfig;

/// State for the size guard middleware.
#[derive(Clone)]
pub struct SizeLimitState {
    pub config: Arc<LimitsConfig>,
}

impl SizeLimitState {
    pub fn new(config: LimitsConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }
}

fn declared_length(request: &Request<Body>) -> Option<usize> {
    request
        .headers()
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
}

/// Middleware function rejecting oversized declared payloads.
pub async fn size_limit_middleware(
    State(state): State<SizeLimitState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if let Some(length) = declared_length(&request) {
        if length > state.config.max_body_size {
            tracing::warn!(
                declared = length,
                ceiling = state.config.max_body_size,
                "Request payload too large"
            );
            return (
                StatusCode::PAYLOAD_TOO_LARGE,
                Json(json!({
                    "status": "ERROR",
                    "message": format!(
                        "Request payload too large. Maximum size: {} bytes",
                        state.config.max_body_size
                    ),
                })),
            )
                .into_response();
        }
    }

    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn request_with_length(value: Option<&'static str>) -> Request<Body> {
        let mut request = Request::new(Body::empty());
        if let Some(value) = value {
            request
                .headers_mut()
                .insert(header::CONTENT_LENGTH, HeaderValue::from_static(value));
        }
        request
    }

    #[test]
    fn parses_declared_length() {
        assert_eq!(declared_length(&request_with_length(Some("1024"))), Some(1024));
        assert_eq!(declared_length(&request_with_length(None)), None);
        // Unparsable declarations pass through rather than reject.
        assert_eq!(declared_length(&request_with_length(Some("nonsense"))), None);
    }
}
