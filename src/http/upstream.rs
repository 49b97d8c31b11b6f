//! Forwarding to the upstream computation API.
//!
//! The pipeline treats the upstream as an opaque, possibly slow handler:
//! exactly one call per admitted, uncached request.

use std::str::FromStr;

use axum::{
    body::Body,
    extract::State,
    http::{
        header,
        uri::{Authority, Scheme},
        HeaderValue, Request, StatusCode, Uri,
    },
    response::{IntoResponse, Response},
};
use hyper_util::client::legacy::{connect::HttpConnector, Client};

/// Application state injected into the forwarding handler.
#[derive(Clone)]
pub struct AppState {
    pub client: Client<HttpConnector, Body>,
    pub upstream_address: String,
}

/// Forward the request to the configured upstream.
pub async fn upstream_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let (mut parts, body) = request.into_parts();

    // Rewrite the URI to target the upstream, keeping path and query.
    let mut uri_parts = parts.uri.clone().into_parts();
    uri_parts.scheme = Some(Scheme::HTTP);
    match Authority::from_str(&state.upstream_address) {
        Ok(authority) => uri_parts.authority = Some(authority),
        Err(e) => {
            tracing::error!(upstream = %state.upstream_address, error = %e, "Invalid upstream address");
            return (StatusCode::BAD_GATEWAY, "Invalid upstream address").into_response();
        }
    }
    let uri = Uri::from_parts(uri_parts).unwrap_or_else(|_| parts.uri.clone());

    // Ensure a request ID reaches the upstream for correlation.
    if !parts.headers.contains_key("x-request-id") {
        let id = uuid::Uuid::new_v4().to_string();
        if let Ok(value) = HeaderValue::from_str(&id) {
            parts.headers.insert("x-request-id", value);
        }
    }
    let request_id = parts
        .headers
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string();

    let mut builder = Request::builder()
        .method(parts.method.clone())
        .uri(uri)
        .version(parts.version);
    if let Some(headers) = builder.headers_mut() {
        for (name, value) in parts.headers.iter() {
            headers.insert(name.clone(), value.clone());
        }
        // Hop-by-hop; the client manages its own connections.
        headers.remove(header::CONNECTION);
    }
    let upstream_request = match builder.body(body) {
        Ok(request) => request,
        Err(e) => {
            tracing::error!(request_id = %request_id, error = %e, "Failed to build upstream request");
            return (StatusCode::BAD_GATEWAY, "Upstream request failed").into_response();
        }
    };

    match state.client.request(upstream_request).await {
        Ok(response) => {
            let (parts, body) = response.into_parts();
            Response::from_parts(parts, Body::new(body))
        }
        Err(e) => {
            tracing::error!(request_id = %request_id, error = %e, "Upstream error");
            (StatusCode::BAD_GATEWAY, "Upstream request failed").into_response()
        }
    }
}
