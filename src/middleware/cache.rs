//! Response caching middleware for idempotent reads.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::{to_bytes, Body, Bytes},
    extract::State,
    http::{header, HeaderValue, Method, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use sha2::{Digest, Sha256};

use crate::cache::{CacheStats, TtlCache};
use crate::config::CacheConfig;
use crate::observability::metrics;

/// Upper bound when buffering an upstream body for caching.
const MAX_BUFFERED_BODY: usize = 32 * 1024 * 1024;

pub const CACHE_STATUS_HEADER: &str = "x-cache";

/// A stored response, replayable for later hits.
#[derive(Debug, Clone)]
pub struct CachedResponse {
    pub status: u16,
    pub body: Bytes,
    pub content_type: Option<String>,
}

/// Fingerprint-keyed TTL cache of replayable responses.
///
/// Method-agnostic by itself; the middleware decides eligibility.
pub type ResponseCache = TtlCache<String, CachedResponse>;

/// Compute the cache key for a request.
///
/// Digest of method, path, normalized (sorted) query pairs, and an
/// identity-scoping fragment of the presented API key. Requests agreeing on
/// all four components share a key; differing callers never do.
pub fn cache_key(method: &Method, path: &str, query: Option<&str>, api_key: Option<&str>) -> String {
    let mut pairs: Vec<(String, String)> = query
        .map(|q| url::form_urlencoded::parse(q.as_bytes()).into_owned().collect())
        .unwrap_or_default();
    pairs.sort();

    let mut hasher = Sha256::new();
    hasher.update(method.as_str().as_bytes());
    hasher.update([0u8]);
    hasher.update(path.as_bytes());
    hasher.update([0u8]);
    for (k, v) in &pairs {
        hasher.update(k.as_bytes());
        hasher.update([0u8]);
        hasher.update(v.as_bytes());
        hasher.update([0u8]);
    }
    let scope = api_key.map(str::as_bytes).unwrap_or_default();
    hasher.update(&scope[..scope.len().min(8)]);

    format!("{:x}", hasher.finalize())
}

/// State for the caching middleware.
#[derive(Clone)]
pub struct CacheState {
    pub cache: Arc<ResponseCache>,
    pub config: Arc<CacheConfig>,
}

impl CacheState {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            cache: Arc::new(TtlCache::new(Duration::from_secs(config.ttl_secs))),
            config: Arc::new(config),
        }
    }

    /// Observability snapshot: entry count, payload bytes, oldest-entry age.
    pub fn stats(&self) -> CacheStats {
        self.cache.stats(|r| r.body.len())
    }
}

fn replay(hit: CachedResponse) -> Response {
    let mut builder = Response::builder()
        .status(StatusCode::from_u16(hit.status).unwrap_or(StatusCode::OK))
        .header(CACHE_STATUS_HEADER, "HIT");
    if let Some(ct) = &hit.content_type {
        builder = builder.header(header::CONTENT_TYPE, ct);
    }
    builder
        .body(Body::from(hit.body))
        .unwrap_or_else(|_| Response::new(Body::empty()))
}

/// Middleware function caching successful GET responses.
pub async fn cache_middleware(
    State(state): State<CacheState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    // Only idempotent reads are eligible.
    if !state.config.enabled || request.method() != Method::GET {
        return next.run(request).await;
    }
    let path = request.uri().path().to_string();
    if state.config.excluded_paths.iter().any(|p| *p == path) {
        return next.run(request).await;
    }

    let api_key = request
        .headers()
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let key = cache_key(
        request.method(),
        &path,
        request.uri().query(),
        api_key.as_deref(),
    );

    if let Some(hit) = state.cache.get(&key) {
        metrics::record_cache_hit();
        tracing::debug!(path = %path, "Cache hit");
        return replay(hit);
    }
    metrics::record_cache_miss();

    let response = next.run(request).await;

    let (mut parts, body) = response.into_parts();
    let bytes = match to_bytes(body, MAX_BUFFERED_BODY).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::error!(path = %path, error = %e, "Failed to buffer upstream body");
            return (StatusCode::BAD_GATEWAY, "Upstream body read failed").into_response();
        }
    };

    // Cache only successful responses whose bodies replay cleanly as JSON;
    // anything else passes through uncached.
    if parts.status == StatusCode::OK
        && serde_json::from_slice::<serde_json::Value>(&bytes).is_ok()
    {
        let content_type = parts
            .headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        state.cache.insert(
            key,
            CachedResponse {
                status: parts.status.as_u16(),
                body: bytes.clone(),
                content_type,
            },
            None,
        );
        parts
            .headers
            .insert(CACHE_STATUS_HEADER, HeaderValue::from_static("MISS"));
        metrics::record_cache_size(state.cache.len());
    }

    Response::from_parts(parts, Body::from(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn query_order_does_not_change_key() {
        let a = cache_key(&Method::GET, "/api/v4/chart", Some("lat=52&lon=13"), None);
        let b = cache_key(&Method::GET, "/api/v4/chart", Some("lon=13&lat=52"), None);
        assert_eq!(a, b);
    }

    #[test]
    fn caller_identity_scopes_the_key() {
        let a = cache_key(&Method::GET, "/api/v4/chart", Some("lat=52"), Some("key-one"));
        let b = cache_key(&Method::GET, "/api/v4/chart", Some("lat=52"), Some("key-two"));
        assert_ne!(a, b);
    }

    #[test]
    fn method_path_and_query_all_participate() {
        let base = cache_key(&Method::GET, "/a", Some("q=1"), None);
        assert_ne!(base, cache_key(&Method::HEAD, "/a", Some("q=1"), None));
        assert_ne!(base, cache_key(&Method::GET, "/b", Some("q=1"), None));
        assert_ne!(base, cache_key(&Method::GET, "/a", Some("q=2"), None));
        assert_ne!(base, cache_key(&Method::GET, "/a", None, None));
    }

    #[test]
    fn stored_responses_round_trip() {
        let state = CacheState::new(CacheConfig::default());
        let key = cache_key(&Method::GET, "/a", None, None);
        state.cache.insert_at(
            key.clone(),
            CachedResponse {
                status: 200,
                body: Bytes::from_static(b"{\"ok\":true}"),
                content_type: Some("application/json".to_string()),
            },
            None,
            Instant::now(),
        );

        let hit = state.cache.get(&key).expect("fresh entry");
        assert_eq!(hit.status, 200);

        let stats = state.stats();
        assert_eq!(stats.total_entries, 1);
        assert_eq!(stats.cache_size_bytes, 11);
    }
}
