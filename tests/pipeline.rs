//! End-to-end pipeline tests against a mock upstream.

use std::io::Read;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use compute_gateway::lifecycle::TaskSupervisor;
use compute_gateway::{GatewayConfig, GatewayServer, Shutdown};

mod common;

const LARGE_JSON_FIELD: usize = 4096;

async fn start_gateway(config: GatewayConfig) -> (SocketAddr, Shutdown) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let supervisor = TaskSupervisor::new();
    let server = GatewayServer::new(config, supervisor);
    let rx = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = server.run(listener, rx).await;
    });
    tokio::time::sleep(Duration::from_millis(200)).await;

    (addr, shutdown)
}

fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .no_gzip()
        .no_proxy()
        .build()
        .unwrap()
}

#[tokio::test]
async fn rate_limit_denies_third_request_with_retry_hint() {
    let backend = common::start_json_backend("{\"ok\":true}").await;

    let mut config = GatewayConfig::default();
    config.upstream.address = backend.to_string();
    config.rate_limit.requests_per_minute = 2;
    config.cache.enabled = false;

    let (addr, shutdown) = start_gateway(config).await;
    let client = client();
    let url = format!("http://{addr}/api/v4/chart");

    let first = client.get(&url).send().await.unwrap();
    assert_eq!(first.status(), 200);
    let second = client.get(&url).send().await.unwrap();
    assert_eq!(second.status(), 200);

    let third = client.get(&url).send().await.unwrap();
    assert_eq!(third.status(), 429);
    assert_eq!(third.headers().get("retry-after").unwrap(), "60");
    let body: serde_json::Value = third.json().await.unwrap();
    assert_eq!(body["status"], "ERROR");
    assert!(body["message"]
        .as_str()
        .unwrap()
        .contains("too many requests per minute"));

    shutdown.trigger();
}

#[tokio::test]
async fn identical_gets_hit_the_cache_once_upstream() {
    let calls = Arc::new(AtomicU32::new(0));
    let c = calls.clone();
    let backend = common::start_programmable_backend(move || {
        let c = c.clone();
        async move {
            c.fetch_add(1, Ordering::SeqCst);
            (200, "application/json", "{\"result\":42}".to_string())
        }
    })
    .await;

    let mut config = GatewayConfig::default();
    config.upstream.address = backend.to_string();

    let (addr, shutdown) = start_gateway(config).await;
    let client = client();
    let url = format!("http://{addr}/api/v4/chart?lat=52&lon=13");

    let first = client.get(&url).send().await.unwrap();
    assert_eq!(first.status(), 200);
    assert_eq!(first.headers().get("x-cache").unwrap(), "MISS");

    let second = client.get(&url).send().await.unwrap();
    assert_eq!(second.status(), 200);
    assert_eq!(second.headers().get("x-cache").unwrap(), "HIT");
    assert_eq!(second.text().await.unwrap(), "{\"result\":42}");

    assert_eq!(calls.load(Ordering::SeqCst), 1, "upstream called once");

    shutdown.trigger();
}

#[tokio::test]
async fn oversized_declared_payload_is_rejected_before_upstream() {
    let calls = Arc::new(AtomicU32::new(0));
    let c = calls.clone();
    let backend = common::start_programmable_backend(move || {
        let c = c.clone();
        async move {
            c.fetch_add(1, Ordering::SeqCst);
            (200, "application/json", "{}".to_string())
        }
    })
    .await;

    let mut config = GatewayConfig::default();
    config.upstream.address = backend.to_string();
    config.limits.max_body_size = 64;

    let (addr, shutdown) = start_gateway(config).await;
    let client = client();

    let response = client
        .post(format!("http://{addr}/api/v4/chart"))
        .body(vec![b'x'; 128])
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 413);
    let body: serde_json::Value = response.json().await.unwrap();
    assert!(body["message"].as_str().unwrap().contains("too large"));
    assert_eq!(calls.load(Ordering::SeqCst), 0, "upstream never called");

    shutdown.trigger();
}

#[tokio::test]
async fn large_json_is_gzipped_when_accepted() {
    let payload = format!("{{\"data\":\"{}\"}}", "a".repeat(LARGE_JSON_FIELD));
    let body: &'static str = Box::leak(payload.into_boxed_str());
    let backend = common::start_json_backend(body).await;

    let mut config = GatewayConfig::default();
    config.upstream.address = backend.to_string();
    config.cache.enabled = false;

    let (addr, shutdown) = start_gateway(config).await;
    let client = client();
    let url = format!("http://{addr}/api/v4/chart");

    let response = client
        .get(&url)
        .header("accept-encoding", "gzip")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.headers().get("content-encoding").unwrap(), "gzip");
    assert!(response
        .headers()
        .get("vary")
        .unwrap()
        .to_str()
        .unwrap()
        .contains("Accept-Encoding"));

    let compressed = response.bytes().await.unwrap();
    assert!(compressed.len() < body.len());
    let mut decoder = flate2::read::GzDecoder::new(compressed.as_ref());
    let mut decoded = String::new();
    decoder.read_to_string(&mut decoded).unwrap();
    assert_eq!(decoded, body);

    // Without the accept-encoding header the body is untouched.
    let plain = client.get(&url).send().await.unwrap();
    assert!(plain.headers().get("content-encoding").is_none());
    assert_eq!(plain.text().await.unwrap(), body);

    shutdown.trigger();
}

#[tokio::test]
async fn responses_carry_process_time_metadata() {
    let backend = common::start_json_backend("{\"ok\":true}").await;

    let mut config = GatewayConfig::default();
    config.upstream.address = backend.to_string();

    let (addr, shutdown) = start_gateway(config).await;
    let client = client();

    let response = client
        .get(format!("http://{addr}/api/v4/chart"))
        .send()
        .await
        .unwrap();
    let elapsed: f64 = response
        .headers()
        .get("x-process-time")
        .unwrap()
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert!(elapsed >= 0.0);

    shutdown.trigger();
}

#[tokio::test]
async fn health_endpoint_reports_cache_stats_and_bypasses_limits() {
    let backend = common::start_json_backend("{\"ok\":true}").await;

    let mut config = GatewayConfig::default();
    config.upstream.address = backend.to_string();
    config.rate_limit.requests_per_minute = 1;

    let (addr, shutdown) = start_gateway(config).await;
    let client = client();

    // Excluded path: repeated calls never hit the rate limiter.
    for _ in 0..5 {
        let response = client
            .get(format!("http://{addr}/health"))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        let body: serde_json::Value = response.json().await.unwrap();
        assert_eq!(body["status"], "healthy");
        assert!(body["cache_stats"]["total_entries"].is_number());
    }

    shutdown.trigger();
}

#[tokio::test]
async fn distinct_clients_have_independent_budgets() {
    let backend = common::start_json_backend("{\"ok\":true}").await;

    let mut config = GatewayConfig::default();
    config.upstream.address = backend.to_string();
    config.rate_limit.requests_per_minute = 1;
    config.cache.enabled = false;

    let (addr, shutdown) = start_gateway(config).await;
    let client = client();
    let url = format!("http://{addr}/api/v4/chart");

    // Two callers presenting different API keys are tracked separately.
    let a1 = client.get(&url).header("x-api-key", "key-a").send().await.unwrap();
    let b1 = client.get(&url).header("x-api-key", "key-b").send().await.unwrap();
    assert_eq!(a1.status(), 200);
    assert_eq!(b1.status(), 200);

    let a2 = client.get(&url).header("x-api-key", "key-a").send().await.unwrap();
    assert_eq!(a2.status(), 429);

    shutdown.trigger();
}
