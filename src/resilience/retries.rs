//! Retry logic.
//!
//! # Responsibilities
//! - Run an integration call up to `max_attempts` times, strictly sequentially
//! - Consult the circuit breaker and rate-limit tracker before every attempt
//! - Classify failures and feed breaker and rate-limit state
//! - Wait with exponential backoff + jitter between attempts
//!
//! # Design Decisions
//! - Connection and rate-limit errors (and 5xx) retryable by default
//! - Circuit-open and local rate-limit rejections never invoke the operation
//! - A server `Retry-After` raises the next delay, never lowers it
//! - Cancellation is its own outcome and is never retried

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::config::RetryConfig;
use crate::error::{ErrorKind, IntegrationError};
use crate::normalize::response::RawResponse;
use crate::observability::metrics;
use crate::resilience::backoff;
use crate::resilience::circuit_breaker::CircuitBreakerRegistry;
use crate::resilience::clock::Clock;
use crate::security::rate_limit::{RateLimitInfo, RateLimitTracker};

/// Caller-supplied predicate deciding whether an error is worth retrying.
#[derive(Clone)]
pub struct RetryCondition(Arc<dyn Fn(&IntegrationError) -> bool + Send + Sync>);

impl RetryCondition {
    pub fn new<F>(condition: F) -> Self
    where
        F: Fn(&IntegrationError) -> bool + Send + Sync + 'static,
    {
        Self(Arc::new(condition))
    }

    pub fn should_retry(&self, error: &IntegrationError) -> bool {
        (self.0)(error)
    }
}

impl fmt::Debug for RetryCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RetryCondition(..)")
    }
}

impl RetryConfig {
    /// Apply `retry_condition`, defaulting to `error.is_retryable`.
    pub fn should_retry(&self, error: &IntegrationError) -> bool {
        match &self.retry_condition {
            Some(condition) => condition.should_retry(error),
            None => error.is_retryable,
        }
    }
}

/// Failure of a cancellable execution.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExecuteError {
    #[error(transparent)]
    Failed(#[from] IntegrationError),
    #[error("operation cancelled after {attempts} attempt(s)")]
    Cancelled { attempts: u32 },
}

impl ExecuteError {
    /// Fold cancellation into a non-retryable `IntegrationError` with code
    /// `cancelled`, for callers that only handle one error type.
    pub fn into_integration(self) -> IntegrationError {
        match self {
            ExecuteError::Failed(e) => e,
            ExecuteError::Cancelled { attempts } => {
                IntegrationError::generic("cancelled", "operation cancelled", false)
                    .with_metadata(crate::error::REASON_KEY, "cancelled")
                    .with_metadata("attempts", attempts)
            }
        }
    }
}

/// Runs operations under the shared breaker and rate-limit state.
#[derive(Clone)]
pub struct RetryExecutor {
    breakers: Arc<CircuitBreakerRegistry>,
    rate_limits: Arc<RateLimitTracker>,
    clock: Arc<dyn Clock>,
}

impl RetryExecutor {
    pub fn new(
        breakers: Arc<CircuitBreakerRegistry>,
        rate_limits: Arc<RateLimitTracker>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            breakers,
            rate_limits,
            clock,
        }
    }

    /// Execute `operation` with retries.
    ///
    /// `context_key` names the breaker and the rate-limit record consulted
    /// before each attempt; without it the call is only retried.
    pub async fn execute_with_retry<T, E, F, Fut>(
        &self,
        context_key: Option<&str>,
        config: &RetryConfig,
        operation: F,
    ) -> Result<T, IntegrationError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Into<IntegrationError>,
    {
        self.run(context_key, config, None, operation)
            .await
            .map_err(ExecuteError::into_integration)
    }

    /// Like `execute_with_retry`, but stops when `cancel` fires, whether the
    /// operation is in flight or the executor is waiting between attempts.
    pub async fn execute_cancellable<T, E, F, Fut>(
        &self,
        context_key: Option<&str>,
        config: &RetryConfig,
        cancel: &CancellationToken,
        operation: F,
    ) -> Result<T, ExecuteError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Into<IntegrationError>,
    {
        self.run(context_key, config, Some(cancel), operation).await
    }

    /// Execute an HTTP-shaped operation.
    ///
    /// Every response, successful or not, updates the rate-limit record from
    /// its headers; statuses outside `expected_statuses` are classified with
    /// [`IntegrationError::from_status`] and go through the normal retry flow.
    pub async fn execute_response<E, F, Fut>(
        &self,
        context_key: &str,
        config: &RetryConfig,
        expected_statuses: &[u16],
        mut operation: F,
    ) -> Result<RawResponse, IntegrationError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<RawResponse, E>>,
        E: Into<IntegrationError>,
    {
        let rate_limits = self.rate_limits.clone();
        self.execute_with_retry(Some(context_key), config, || {
            let call = operation();
            let rate_limits = rate_limits.clone();
            async move {
                let response = call.await.map_err(Into::into)?;
                if let Some(info) = RateLimitInfo::from_headers(&response.headers) {
                    rate_limits.update_limit(context_key, info);
                }
                if expected_statuses.contains(&response.status) {
                    Ok(response)
                } else {
                    Err(IntegrationError::from_status(
                        response.status,
                        &response.body_text(),
                        &response.headers,
                    ))
                }
            }
        })
        .await
    }

    async fn run<T, E, F, Fut>(
        &self,
        context_key: Option<&str>,
        config: &RetryConfig,
        cancel: Option<&CancellationToken>,
        mut operation: F,
    ) -> Result<T, ExecuteError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Into<IntegrationError>,
    {
        let max_attempts = config.max_attempts.max(1);
        let label = context_key.unwrap_or("-");

        for attempt in 1..=max_attempts {
            if let Some(key) = context_key {
                if let Err(open) = self.breakers.try_acquire(key) {
                    metrics::record_attempt(key, "circuit_open");
                    tracing::debug!(context = %key, attempt, "Circuit open, failing fast");
                    return Err(IntegrationError::circuit_open(key, open.retry_after).into());
                }
                if !self.rate_limits.can_make_request(key) {
                    self.breakers.release_trial(key);
                    let retry_after = self.rate_limits.get_retry_after_secs(key);
                    let limit = self.rate_limits.get(key).map(|r| r.limit);
                    metrics::record_rate_limited(key);
                    metrics::record_attempt(key, "rate_limited");
                    tracing::warn!(context = %key, retry_after_secs = retry_after, "Local rate limit reached");
                    return Err(IntegrationError::rate_limit(
                        format!("rate limit for '{}' exhausted", key),
                        Some(retry_after),
                        limit,
                    )
                    .into());
                }
            }

            let outcome = match with_cancel(cancel, operation()).await {
                Some(outcome) => outcome,
                None => {
                    if let Some(key) = context_key {
                        self.breakers.release_trial(key);
                    }
                    metrics::record_attempt(label, "cancelled");
                    return Err(ExecuteError::Cancelled { attempts: attempt });
                }
            };

            let error: IntegrationError = match outcome {
                Ok(value) => {
                    if let Some(key) = context_key {
                        self.breakers.record_success(key);
                    }
                    metrics::record_attempt(label, "success");
                    return Ok(value);
                }
                Err(e) => e.into(),
            };

            metrics::record_attempt(label, "failure");
            if let Some(key) = context_key {
                self.breakers.record_failure(key);
                if let ErrorKind::RateLimit { retry_after_secs: Some(secs), limit } = error.kind {
                    self.rate_limits.record_throttled(key, Duration::from_secs(secs), limit);
                }
            }

            if attempt == max_attempts || !config.should_retry(&error) {
                tracing::debug!(
                    context = %label,
                    attempt,
                    code = %error.code,
                    "Giving up on integration call"
                );
                return Err(error.into());
            }

            let mut delay = backoff::next_delay(attempt, config);
            if let Some(retry_after) = error.retry_after() {
                delay = delay.max(retry_after);
            }

            tracing::debug!(
                context = %label,
                attempt,
                delay_ms = delay.as_millis() as u64,
                code = %error.code,
                "Integration call failed, retrying"
            );

            if with_cancel(cancel, self.clock.sleep(delay)).await.is_none() {
                metrics::record_attempt(label, "cancelled");
                return Err(ExecuteError::Cancelled { attempts: attempt });
            }
        }

        unreachable!("loop returns on the final attempt")
    }
}

async fn with_cancel<F: Future>(cancel: Option<&CancellationToken>, future: F) -> Option<F::Output> {
    match cancel {
        Some(token) => tokio::select! {
            biased;
            _ = token.cancelled() => None,
            out = future => Some(out),
        },
        None => Some(future.await),
    }
}
