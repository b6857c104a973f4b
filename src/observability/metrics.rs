//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define integration metrics (attempts, circuit state, throttling, latency)
//! - Expose a Prometheus-compatible scrape endpoint
//!
//! # Metrics
//! - `integration_attempts_total` (counter): attempts by context and outcome
//! - `integration_circuit_state` (gauge): 0=closed, 1=open, 2=half-open
//! - `integration_rate_limited_total` (counter): throttled calls by context
//! - `integration_operation_duration_seconds` (histogram): latency by operation, status
//! - `integration_health_status` (gauge): 1=healthy, 0.5=degraded, 0=unhealthy
//! - `integration_webhook_verifications_total` (counter): by result code
//!
//! # Design Decisions
//! - Recording without an installed exporter is a no-op
//! - Labels are bounded: context keys and operation names come from config/code

use std::net::SocketAddr;
use std::time::Duration;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::health::HealthStatus;
use crate::resilience::circuit_breaker::CircuitState;

/// Install the Prometheus exporter listening on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_attempt(context: &str, outcome: &'static str) {
    counter!("integration_attempts_total", "context" => context.to_string(), "outcome" => outcome).increment(1);
}

pub fn record_circuit_state(context: &str, state: CircuitState) {
    let value = match state {
        CircuitState::Closed => 0.0,
        CircuitState::Open => 1.0,
        CircuitState::HalfOpen => 2.0,
    };
    gauge!("integration_circuit_state", "context" => context.to_string()).set(value);
}

pub fn record_rate_limited(context: &str) {
    counter!("integration_rate_limited_total", "context" => context.to_string()).increment(1);
}

pub fn record_operation(operation: &str, duration: Duration, success: bool) {
    let status = if success { "success" } else { "error" };
    histogram!(
        "integration_operation_duration_seconds",
        "operation" => operation.to_string(),
        "status" => status
    )
    .record(duration.as_secs_f64());
}

pub fn record_health(check: &str, status: HealthStatus) {
    let value = match status {
        HealthStatus::Healthy => 1.0,
        HealthStatus::Degraded => 0.5,
        HealthStatus::Unhealthy => 0.0,
    };
    gauge!("integration_health_status", "check" => check.to_string()).set(value);
}

pub fn record_webhook_verification(result: &str) {
    counter!("integration_webhook_verifications_total", "result" => result.to_string()).increment(1);
}
