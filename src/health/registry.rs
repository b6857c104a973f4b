//! Named health probes and their aggregation.
//!
//! # Responsibilities
//! - Hold the registered probes, each with its own timeout
//! - Run every probe concurrently and record the outcome
//! - Answer liveness/readiness questions from the last run

use std::any::Any;
use std::collections::BTreeMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::join_all;
use futures_util::FutureExt;
use serde::Serialize;
use tokio::time::Instant;

use super::{HealthCheckResult, HealthStatus};
use crate::config::HealthConfig;
use crate::observability::metrics;
use crate::resilience::timeouts;

/// A single dependency check.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn check(&self) -> HealthCheckResult;
}

/// Adapter turning an async closure into a probe.
struct FnProbe<F>(F);

#[async_trait]
impl<F, Fut> HealthProbe for FnProbe<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = HealthCheckResult> + Send,
{
    async fn check(&self) -> HealthCheckResult {
        (self.0)().await
    }
}

struct RegisteredCheck {
    probe: Arc<dyn HealthProbe>,
    timeout: Duration,
}

/// Overall view over the last run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthReport {
    /// Worst status among the checks; Healthy when nothing is registered.
    pub status: HealthStatus,
    pub healthy: usize,
    pub degraded: usize,
    pub unhealthy: usize,
    pub checks: BTreeMap<String, HealthCheckResult>,
}

impl HealthReport {
    pub fn from_results(checks: BTreeMap<String, HealthCheckResult>) -> Self {
        let count = |status: HealthStatus| checks.values().filter(|r| r.status == status).count();
        Self {
            status: checks
                .values()
                .map(|r| r.status)
                .max()
                .unwrap_or(HealthStatus::Healthy),
            healthy: count(HealthStatus::Healthy),
            degraded: count(HealthStatus::Degraded),
            unhealthy: count(HealthStatus::Unhealthy),
            checks,
        }
    }

    /// Readiness: no check is Unhealthy (Degraded passes).
    pub fn is_ready(&self) -> bool {
        self.unhealthy == 0
    }
}

pub struct HealthRegistry {
    default_timeout: Duration,
    checks: RwLock<BTreeMap<String, RegisteredCheck>>,
    results: RwLock<BTreeMap<String, HealthCheckResult>>,
}

impl HealthRegistry {
    pub fn new(config: &HealthConfig) -> Self {
        Self {
            default_timeout: Duration::from_millis(config.default_timeout_ms),
            checks: RwLock::new(BTreeMap::new()),
            results: RwLock::new(BTreeMap::new()),
        }
    }

    /// Register (or replace) a closure probe under the default timeout.
    pub fn register_check<F, Fut>(&self, name: impl Into<String>, probe: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HealthCheckResult> + Send + 'static,
    {
        self.register_probe(name, Arc::new(FnProbe(probe)), self.default_timeout);
    }

    pub fn register_check_with_timeout<F, Fut>(&self, name: impl Into<String>, timeout: Duration, probe: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HealthCheckResult> + Send + 'static,
    {
        self.register_probe(name, Arc::new(FnProbe(probe)), timeout);
    }

    pub fn register_probe(&self, name: impl Into<String>, probe: Arc<dyn HealthProbe>, timeout: Duration) {
        let name = name.into();
        tracing::debug!(check = %name, timeout_ms = timeout.as_millis() as u64, "Health check registered");
        self.checks
            .write()
            .expect("health checks lock poisoned")
            .insert(name, RegisteredCheck { probe, timeout });
    }

    /// Run every probe concurrently, each bounded by its own timeout.
    ///
    /// A panicking probe is recorded as Unhealthy; the others still report.
    /// Probes that leave `response_time_ms` at zero get the measured time.
    pub async fn run_all_checks(&self) -> BTreeMap<String, HealthCheckResult> {
        let snapshot: Vec<(String, Arc<dyn HealthProbe>, Duration)> = self
            .checks
            .read()
            .expect("health checks lock poisoned")
            .iter()
            .map(|(name, check)| (name.clone(), check.probe.clone(), check.timeout))
            .collect();

        let runs = snapshot.into_iter().map(|(name, probe, timeout)| async move {
            let started = Instant::now();
            let guarded = AssertUnwindSafe(probe.check()).catch_unwind();
            let mut result = match timeouts::deadline(timeout, guarded).await {
                Some(Ok(result)) => result,
                Some(Err(panic)) => {
                    HealthCheckResult::unhealthy(format!("panicked: {}", panic_message(panic.as_ref())))
                }
                None => {
                    tracing::warn!(check = %name, timeout_ms = timeout.as_millis() as u64, "Health check timed out");
                    HealthCheckResult::unhealthy("timeout")
                        .with_response_time(started.elapsed().as_millis() as u64)
                        .with_metadata("timeout_ms", timeout.as_millis() as u64)
                }
            };
            if result.response_time_ms == 0 {
                result.response_time_ms = started.elapsed().as_millis() as u64;
            }
            if result.status == HealthStatus::Unhealthy {
                tracing::warn!(check = %name, error = ?result.error, "Health check failed");
            }
            metrics::record_health(&name, result.status);
            (name, result)
        });

        let results: BTreeMap<String, HealthCheckResult> = join_all(runs).await.into_iter().collect();
        *self.results.write().expect("health results lock poisoned") = results.clone();
        results
    }

    pub fn last_results(&self) -> BTreeMap<String, HealthCheckResult> {
        self.results.read().expect("health results lock poisoned").clone()
    }

    /// True iff every registered check last reported Healthy.
    /// A check that has not run yet does not count as Healthy.
    pub fn is_healthy(&self) -> bool {
        let checks = self.checks.read().expect("health checks lock poisoned");
        let results = self.results.read().expect("health results lock poisoned");
        checks
            .keys()
            .all(|name| matches!(results.get(name), Some(r) if r.status == HealthStatus::Healthy))
    }

    /// True iff no check last reported Unhealthy (Degraded passes).
    pub fn has_no_unhealthy(&self) -> bool {
        self.results
            .read()
            .expect("health results lock poisoned")
            .values()
            .all(|r| r.status != HealthStatus::Unhealthy)
    }

    pub fn report(&self) -> HealthReport {
        HealthReport::from_results(self.last_results())
    }

    pub fn clear_results(&self) {
        self.results.write().expect("health results lock poisoned").clear();
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.as_str()
    } else {
        "unknown panic"
    }
}
