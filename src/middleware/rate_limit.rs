//! Sliding-window rate limiting middleware.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{header, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use dashmap::DashMap;
use serde_json::json;

use crate::config::RateLimitConfig;
use crate::middleware::identity::client_identity;
use crate::observability::metrics;

const MINUTE_WINDOW: Duration = Duration::from_secs(60);
const HOUR_WINDOW: Duration = Duration::from_secs(3600);

/// Compaction runs at most this often, piggybacked on admission checks.
const COMPACTION_INTERVAL: Duration = Duration::from_secs(60);

/// Outcome of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allowed,
    Denied(DenyReason),
}

/// Which window was exhausted. The minute window is checked first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    PerMinute,
    PerHour,
}

impl DenyReason {
    pub fn message(&self) -> &'static str {
        match self {
            DenyReason::PerMinute => "Rate limit exceeded: too many requests per minute",
            DenyReason::PerHour => "Rate limit exceeded: too many requests per hour",
        }
    }

    fn label(&self) -> &'static str {
        match self {
            DenyReason::PerMinute => "per_minute",
            DenyReason::PerHour => "per_hour",
        }
    }
}

/// Request timestamps for one client, one deque per window scale.
#[derive(Debug, Default)]
struct ClientWindows {
    minute: VecDeque<Instant>,
    hour: VecDeque<Instant>,
}

fn prune(window: &mut VecDeque<Instant>, now: Instant, span: Duration) {
    while let Some(front) = window.front() {
        if now.duration_since(*front) >= span {
            window.pop_front();
        } else {
            break;
        }
    }
}

/// Per-client sliding-window admission control over two scales.
///
/// Read-then-append is atomic per identity: the check and the timestamp
/// append happen under the same map-entry lock, so two concurrent requests
/// from one client cannot both read a stale count. Clients whose windows
/// drain empty are evicted during compaction; `retain` takes the same shard
/// locks as admission, so eviction cannot interleave with a check.
pub struct RateLimiter {
    windows: DashMap<String, ClientWindows>,
    requests_per_minute: usize,
    requests_per_hour: usize,
    last_compaction: Mutex<Instant>,
}

impl RateLimiter {
    pub fn new(requests_per_minute: u32, requests_per_hour: u32) -> Self {
        Self {
            windows: DashMap::new(),
            requests_per_minute: requests_per_minute as usize,
            requests_per_hour: requests_per_hour as usize,
            last_compaction: Mutex::new(Instant::now()),
        }
    }

    /// Check whether a request from `identity` is admitted right now.
    ///
    /// Only admitted requests are recorded; a denial does not count against
    /// future windows.
    pub fn admit(&self, identity: &str) -> Decision {
        self.admit_at(identity, Instant::now())
    }

    pub(crate) fn admit_at(&self, identity: &str, now: Instant) -> Decision {
        self.maybe_compact(now);

        let mut entry = self.windows.entry(identity.to_string()).or_default();
        let windows = entry.value_mut();

        prune(&mut windows.minute, now, MINUTE_WINDOW);
        if windows.minute.len() >= self.requests_per_minute {
            return Decision::Denied(DenyReason::PerMinute);
        }

        prune(&mut windows.hour, now, HOUR_WINDOW);
        if windows.hour.len() >= self.requests_per_hour {
            return Decision::Denied(DenyReason::PerHour);
        }

        windows.minute.push_back(now);
        windows.hour.push_back(now);
        Decision::Allowed
    }

    fn maybe_compact(&self, now: Instant) {
        {
            let mut last = self
                .last_compaction
                .lock()
                .expect("rate limiter mutex poisoned");
            if now.duration_since(*last) < COMPACTION_INTERVAL {
                return;
            }
            *last = now;
        }

        self.windows.retain(|_, windows| {
            prune(&mut windows.minute, now, MINUTE_WINDOW);
            prune(&mut windows.hour, now, HOUR_WINDOW);
            !(windows.minute.is_empty() && windows.hour.is_empty())
        });
    }

    /// Number of client identities currently tracked.
    pub fn tracked_clients(&self) -> usize {
        self.windows.len()
    }
}

/// State for the rate limiting middleware.
#[derive(Clone)]
pub struct RateLimitState {
    pub limiter: Arc<RateLimiter>,
    pub config: Arc<RateLimitConfig>,
}

impl RateLimitState {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            limiter: Arc::new(RateLimiter::new(
                config.requests_per_minute,
                config.requests_per_hour,
            )),
            config: Arc::new(config),
        }
    }
}

/// Middleware function for sliding-window rate limiting.
pub async fn rate_limit_middleware(
    State(state): State<RateLimitState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if !state.config.enabled {
        return next.run(request).await;
    }

    let path = request.uri().path();
    if state.config.excluded_paths.iter().any(|p| p == path) {
        return next.run(request).await;
    }

    let identity = client_identity(request.headers(), addr);

    match state.limiter.admit(&identity) {
        Decision::Allowed => next.run(request).await,
        Decision::Denied(reason) => {
            tracing::warn!(client = %identity, reason = reason.label(), "Rate limit exceeded");
            metrics::record_rate_limited(reason.label());

            let mut response = (
                StatusCode::TOO_MANY_REQUESTS,
                Json(json!({
                    "status": "ERROR",
                    "message": reason.message(),
                })),
            )
                .into_response();
            if let Ok(hint) = state.config.retry_after_secs.to_string().parse() {
                response.headers_mut().insert(header::RETRY_AFTER, hint);
            }
            response
        }
    }
}
