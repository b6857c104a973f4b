//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Integration call:
//!     → circuit_breaker.rs (fail fast while the remote is considered down)
//!     → security/rate_limit.rs (fail fast while the quota is exhausted)
//!     → operation (optionally under timeouts.rs)
//!     → On failure: retries.rs (classify, feed breaker/quota, back off via backoff.rs)
//! ```
//!
//! # Design Decisions
//! - No ambient globals: all shared maps live in a `ResilienceContext`
//! - Time is injected through `clock.rs` so tests never really sleep
//! - Circuit breaker prevents cascading failures
//! - Breaker and quota state are per context key, never global

pub mod backoff;
pub mod circuit_breaker;
pub mod clock;
pub mod retries;
pub mod timeouts;

use std::future::Future;
use std::sync::Arc;

use crate::config::ResilienceConfig;
use crate::error::IntegrationError;
use crate::health::registry::HealthRegistry;
use crate::observability::performance::PerformanceRecorder;
use crate::security::rate_limit::RateLimitTracker;
use crate::security::webhook::WebhookVerifier;

use circuit_breaker::CircuitBreakerRegistry;
use clock::{Clock, SystemClock};
use retries::RetryExecutor;

/// Process-wide (or per-test) owner of every piece of shared resilience state.
#[derive(Clone)]
pub struct ResilienceContext {
    config: Arc<ResilienceConfig>,
    clock: Arc<dyn Clock>,
    breakers: Arc<CircuitBreakerRegistry>,
    rate_limits: Arc<RateLimitTracker>,
    health: Arc<HealthRegistry>,
    performance: Arc<PerformanceRecorder>,
    webhooks: Arc<WebhookVerifier>,
}

impl ResilienceContext {
    pub fn new(config: ResilienceConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: ResilienceConfig, clock: Arc<dyn Clock>) -> Self {
        let breakers = Arc::new(CircuitBreakerRegistry::new(
            config.circuit_breaker.clone(),
            clock.clone(),
        ));
        let rate_limits = Arc::new(RateLimitTracker::new(clock.clone()));
        let health = Arc::new(HealthRegistry::new(&config.health));
        let performance = Arc::new(PerformanceRecorder::new(
            config.performance.capacity,
            clock.clone(),
        ));
        let webhooks = Arc::new(WebhookVerifier::new(&config.webhook, clock.clone()));

        Self {
            config: Arc::new(config),
            clock,
            breakers,
            rate_limits,
            health,
            performance,
            webhooks,
        }
    }

    /// Executor sharing this context's breaker and quota maps.
    pub fn executor(&self) -> RetryExecutor {
        RetryExecutor::new(
            self.breakers.clone(),
            self.rate_limits.clone(),
            self.clock.clone(),
        )
    }

    /// Run `operation` under the configured default retry policy.
    pub async fn execute_with_retry<T, E, F, Fut>(
        &self,
        context_key: Option<&str>,
        operation: F,
    ) -> Result<T, IntegrationError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Into<IntegrationError>,
    {
        self.executor()
            .execute_with_retry(context_key, &self.config.retry, operation)
            .await
    }

    pub fn config(&self) -> &ResilienceConfig {
        &self.config
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn breakers(&self) -> &CircuitBreakerRegistry {
        &self.breakers
    }

    pub fn rate_limits(&self) -> &Arc<RateLimitTracker> {
        &self.rate_limits
    }

    pub fn health(&self) -> &HealthRegistry {
        &self.health
    }

    pub fn performance(&self) -> &PerformanceRecorder {
        &self.performance
    }

    pub fn webhooks(&self) -> &WebhookVerifier {
        &self.webhooks
    }

    /// Clear breaker, quota, performance and last health results.
    /// Registered probes are kept.
    pub fn reset(&self) {
        self.breakers.reset();
        self.rate_limits.reset();
        self.performance.reset();
        self.health.clear_results();
        tracing::debug!("Resilience state reset");
    }
}
