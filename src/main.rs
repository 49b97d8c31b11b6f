//! compute-gateway
//!
//! A rate-limiting, caching front for computation-heavy HTTP APIs.
//!
//! # Architecture Overview
//!
//! ```text
//!                 ┌──────────────────────────────────────────────────────┐
//!                 │                  COMPUTE GATEWAY                      │
//!                 │                                                       │
//!  Client ───────▶│ compression ▶ telemetry ▶ rate limit ▶ size guard    │
//!                 │                                      ▶ cache ─────────┼──▶ Upstream
//!  Client ◀───────│ (hit short-circuits; miss forwards and stores)       │◀── (computation
//!                 │                                                       │     API)
//!                 │  Cross-cutting: config, observability, lifecycle      │
//!                 │  (shutdown coordinator + background task supervisor)  │
//!                 └──────────────────────────────────────────────────────┘
//! ```
//!
//! Per-request order: compression wraps telemetry wraps rate limiting wraps
//! the size guard wraps the cache wraps the upstream forward. The task
//! supervisor runs orthogonally and is drained at shutdown.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use compute_gateway::config::loader::load_config;
use compute_gateway::lifecycle::TaskSupervisor;
use compute_gateway::{GatewayConfig, GatewayServer, Shutdown};

#[derive(Parser)]
#[command(name = "compute-gateway", about = "Caching, rate-limiting gateway")]
struct Cli {
    /// Path to a TOML configuration file. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing subscriber
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "compute_gateway=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("compute-gateway v0.1.0 starting");

    let config = match cli.config {
        Some(path) => load_config(&path)?,
        None => GatewayConfig::default(),
    };

    tracing::info!(
        bind_address = %config.listener.bind_address,
        upstream = %config.upstream.address,
        requests_per_minute = config.rate_limit.requests_per_minute,
        cache_ttl_secs = config.cache.ttl_secs,
        "Configuration loaded"
    );

    // Bind TCP listener
    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    let local_addr = listener.local_addr()?;

    tracing::info!(address = %local_addr, "Listening for connections");

    if config.observability.metrics_enabled {
        if let Ok(addr) = config.observability.metrics_address.parse() {
            compute_gateway::observability::metrics::init_metrics(addr);
        } else {
            tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            );
        }
    }

    let shutdown = Shutdown::new();
    let supervisor = TaskSupervisor::new();

    // Translate Ctrl+C into the internal shutdown signal.
    {
        let shutdown_tx = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Shutdown signal received");
                shutdown_tx.trigger();
            }
        });
    }

    let server = GatewayServer::new(config, supervisor.clone());
    server.run(listener, shutdown.subscribe()).await?;

    // Drain background work before exiting. Connection pools held by the
    // server state are released when the server future returns.
    supervisor.await_all(Some(Duration::from_secs(5))).await;
    supervisor.cancel_all();

    tracing::info!("Shutdown complete");
    Ok(())
}
