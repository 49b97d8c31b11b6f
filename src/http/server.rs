//! HTTP server setup and pipeline assembly.
//!
//! # Responsibilities
//! - Create the Axum router with the fixed middleware order
//! - Wire each pipeline stage with its own state
//! - Serve with graceful shutdown
//! - Expose the built-in health endpoint with cache statistics

use std::time::Duration;

use axum::{
    extract::State,
    middleware,
    routing::{any, get},
    Json, Router,
};
use hyper_util::{client::legacy::Client, rt::TokioExecutor};
use hyper_util::client::legacy::connect::HttpConnector;
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::GatewayConfig;
use crate::http::upstream::{upstream_handler, AppState};
use crate::lifecycle::TaskSupervisor;
use crate::middleware::cache::{cache_middleware, CacheState};
use crate::middleware::compression::{compression_middleware, CompressionState};
use crate::middleware::rate_limit::{rate_limit_middleware, RateLimitState};
use crate::middleware::size_limit::{size_limit_middleware, SizeLimitState};
use crate::middleware::telemetry::{telemetry_middleware, TelemetryState};
use crate::observability::metrics;

/// How often the background sweep reclaims expired cache entries.
const CACHE_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// HTTP server for the gateway.
pub struct GatewayServer {
    router: Router,
}

impl GatewayServer {
    /// Create a new server with the given configuration.
    ///
    /// The periodic cache sweep is registered with the supervisor so it is
    /// cancelled with the rest of the background work at shutdown.
    pub fn new(config: GatewayConfig, supervisor: TaskSupervisor) -> Self {
        let client: Client<HttpConnector, axum::body::Body> =
            Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        let app_state = AppState {
            client,
            upstream_address: config.upstream.address.clone(),
        };

        let cache_state = CacheState::new(config.cache.clone());
        let rate_limit_state = RateLimitState::new(config.rate_limit.clone());
        let size_limit_state = SizeLimitState::new(config.limits.clone());
        let telemetry_state = TelemetryState::new(config.telemetry.clone());
        let compression_state = CompressionState::new(config.compression.clone());

        if config.cache.enabled {
            let cache = cache_state.cache.clone();
            supervisor.spawn(async move {
                let mut interval = tokio::time::interval(CACHE_SWEEP_INTERVAL);
                loop {
                    interval.tick().await;
                    let removed = cache.cleanup_expired();
                    if removed > 0 {
                        tracing::debug!(removed, "Swept expired cache entries");
                    }
                    metrics::record_cache_size(cache.len());
                }
            });
        }

        let router = Self::build_router(
            &config,
            app_state,
            cache_state,
            rate_limit_state,
            size_limit_state,
            telemetry_state,
            compression_state,
        );
        Self { router }
    }

    /// Build the Axum router with all pipeline layers.
    ///
    /// Layers apply innermost-first, so the request traverses, in order:
    /// trace → timeout → compression → telemetry → rate limit → size guard
    /// → cache → upstream handler.
    fn build_router(
        config: &GatewayConfig,
        app_state: AppState,
        cache_state: CacheState,
        rate_limit_state: RateLimitState,
        size_limit_state: SizeLimitState,
        telemetry_state: TelemetryState,
        compression_state: CompressionState,
    ) -> Router {
        let health = Router::new()
            .route("/health", get(health_handler))
            .with_state(cache_state.clone());

        Router::new()
            .route("/{*path}", any(upstream_handler))
            .route("/", any(upstream_handler))
            .with_state(app_state)
            .merge(health)
            .layer(middleware::from_fn_with_state(cache_state, cache_middleware))
            .layer(middleware::from_fn_with_state(
                size_limit_state,
                size_limit_middleware,
            ))
            .layer(middleware::from_fn_with_state(
                rate_limit_state,
                rate_limit_middleware,
            ))
            .layer(middleware::from_fn_with_state(
                telemetry_state,
                telemetry_middleware,
            ))
            .layer(middleware::from_fn_with_state(
                compression_state,
                compression_middleware,
            ))
            .layer(TimeoutLayer::new(Duration::from_secs(
                config.timeouts.request_secs,
            )))
            .layer(TraceLayer::new_for_http())
    }

    /// Run the server until the shutdown signal fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let app = self
            .router
            .into_make_service_with_connect_info::<std::net::SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Extended health check with cache statistics.
async fn health_handler(State(cache): State<CacheState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "cache_stats": cache.stats(),
        "performance": {
            "middleware_enabled": true,
        },
    }))
}
