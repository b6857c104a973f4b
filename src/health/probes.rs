//! Built-in probes.
//!
//! # Responsibilities
//! - Probe HTTP dependencies with a GET request
//! - Classify slow-but-successful responses as Degraded

use std::time::{Duration, Instant};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::Request;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};

use super::registry::HealthProbe;
use super::HealthCheckResult;

/// GET probe against an HTTP dependency.
///
/// 2xx within `degraded_after` is Healthy, slower 2xx is Degraded, anything
/// else (non-2xx, connection error) is Unhealthy. The deadline itself is
/// enforced by the registry.
pub struct HttpProbe {
    url: String,
    degraded_after: Duration,
    client: Client<HttpConnector, Body>,
}

impl HttpProbe {
    pub fn new(url: impl Into<String>, degraded_after: Duration) -> Self {
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        Self {
            url: url.into(),
            degraded_after,
            client,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl HealthProbe for HttpProbe {
    async fn check(&self) -> HealthCheckResult {
        let request = match Request::builder()
            .method("GET")
            .uri(self.url.as_str())
            .header("user-agent", "integration-resilience-health-check")
            .body(Body::empty())
        {
            Ok(req) => req,
            Err(e) => {
                tracing::error!(url = %self.url, error = %e, "Failed to build health check request");
                return HealthCheckResult::unhealthy(format!("invalid request: {}", e));
            }
        };

        let started = Instant::now();
        let response = self.client.request(request).await;
        let elapsed = started.elapsed();
        let elapsed_ms = elapsed.as_millis() as u64;

        match response {
            Ok(response) => {
                let status = response.status();
                if !status.is_success() {
                    tracing::warn!(url = %self.url, status = %status, "Health check failed: non-success status");
                    return HealthCheckResult::unhealthy(format!("unexpected status {}", status.as_u16()))
                        .with_response_time(elapsed_ms)
                        .with_metadata("status_code", status.as_u16());
                }
                let result = if elapsed > self.degraded_after {
                    tracing::warn!(url = %self.url, elapsed_ms, "Health check slow");
                    HealthCheckResult::degraded(format!("slow response: {}ms", elapsed_ms))
                } else {
                    HealthCheckResult::healthy()
                };
                result
                    .with_response_time(elapsed_ms)
                    .with_metadata("status_code", status.as_u16())
            }
            Err(e) => {
                tracing::warn!(url = %self.url, error = %e, "Health check failed: connection error");
                HealthCheckResult::unhealthy(format!("connection error: {}", e)).with_response_time(elapsed_ms)
            }
        }
    }
}
