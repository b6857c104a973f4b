//! The `/health`, `/ready` and `/stats` surface served over real sockets.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use integration_resilience::config::{HttpCheckConfig, ResilienceConfig};
use integration_resilience::health::HealthCheckResult;
use integration_resilience::lifecycle::startup;
use integration_resilience::{HealthServer, IntegrationError, ResilienceContext};
use serde_json::Value;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

mod common;
use common::MockReply;

async fn serve(ctx: ResilienceContext) -> (String, CancellationToken) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = CancellationToken::new();
    let server = HealthServer::new(ctx, &ResilienceConfig::default().server);
    let token = shutdown.clone();
    tokio::spawn(async move {
        server.run(listener, token).await.unwrap();
    });
    (format!("http://{}", addr), shutdown)
}

#[tokio::test]
async fn test_liveness_reports_version() {
    let (base, shutdown) = serve(ResilienceContext::new(ResilienceConfig::default())).await;

    let res = reqwest::get(format!("{}/health", base)).await.unwrap();
    assert_eq!(res.status(), 200);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));

    shutdown.cancel();
}

#[tokio::test]
async fn test_degraded_dependency_still_ready() {
    let ctx = ResilienceContext::new(ResilienceConfig::default());
    ctx.health().register_check("db", || async { HealthCheckResult::healthy() });
    ctx.health().register_check("crm", || async { HealthCheckResult::degraded("slow") });
    let (base, shutdown) = serve(ctx).await;

    let res = reqwest::get(format!("{}/ready", base)).await.unwrap();
    assert_eq!(res.status(), 200);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["checks"]["crm"]["error"], "slow");

    shutdown.cancel();
}

#[tokio::test]
async fn test_unhealthy_dependency_fails_readiness() {
    let ctx = ResilienceContext::new(ResilienceConfig::default());
    ctx.health().register_check("db", || async { HealthCheckResult::unhealthy("refused") });
    let (base, shutdown) = serve(ctx).await;

    let res = reqwest::get(format!("{}/ready", base)).await.unwrap();
    assert_eq!(res.status(), 503);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["unhealthy"], 1);

    shutdown.cancel();
}

#[tokio::test]
async fn test_concurrent_readiness_answers_match_their_own_run() {
    let ctx = ResilienceContext::new(ResilienceConfig::default());
    let flips = Arc::new(AtomicU32::new(0));
    let counter = flips.clone();
    ctx.health().register_check("flaky", move || {
        let n = counter.fetch_add(1, Ordering::SeqCst);
        async move {
            tokio::time::sleep(Duration::from_millis(if n % 2 == 0 { 30 } else { 1 })).await;
            if n % 2 == 0 {
                HealthCheckResult::unhealthy("down")
            } else {
                HealthCheckResult::healthy()
            }
        }
    });
    let (base, shutdown) = serve(ctx).await;

    let url = format!("{}/ready", base);
    let requests = (0..6).map(|_| {
        let url = url.clone();
        async move { reqwest::get(url).await.unwrap() }
    });
    for res in futures_util::future::join_all(requests).await {
        let status = res.status();
        let body: Value = res.json().await.unwrap();
        let expected: u16 = if body["unhealthy"] == 0 { 200 } else { 503 };
        assert_eq!(status, expected);
        assert_eq!(body["status"] == "unhealthy", status == 503);
    }
    assert_eq!(flips.load(Ordering::SeqCst), 6);

    shutdown.cancel();
}

#[tokio::test]
async fn test_configured_http_checks_probe_backends() {
    let up = common::start_mock_backend(MockReply::new(200, "ok")).await;
    let down = common::start_mock_backend(MockReply::new(500, "boom")).await;

    let mut config = ResilienceConfig::default();
    config.health.http_checks = vec![
        HttpCheckConfig { name: "crm".into(), url: format!("http://{}/health", up), timeout_ms: Some(2000) },
        HttpCheckConfig { name: "sms".into(), url: format!("http://{}/health", down), timeout_ms: None },
    ];
    let (base, shutdown) = serve(startup::build_context(config)).await;

    let res = reqwest::get(format!("{}/ready", base)).await.unwrap();
    assert_eq!(res.status(), 503);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["checks"]["crm"]["status"], "healthy");
    assert_eq!(body["checks"]["sms"]["status"], "unhealthy");

    shutdown.cancel();
}

#[tokio::test]
async fn test_stats_lists_measured_operations() {
    let ctx = ResilienceContext::new(ResilienceConfig::default());
    let perf = ctx.performance();
    let _ = perf.measure("crm.sync", async { Ok::<_, IntegrationError>(()) }).await;
    let _ = perf
        .measure("crm.sync", async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            Err::<(), _>(IntegrationError::connection("reset", "x"))
        })
        .await;
    let (base, shutdown) = serve(ctx).await;

    let body: Value = reqwest::get(format!("{}/stats", base)).await.unwrap().json().await.unwrap();
    assert_eq!(body["crm.sync"]["count"], 2);
    assert_eq!(body["crm.sync"]["success_rate"], 50.0);

    shutdown.cancel();
}
