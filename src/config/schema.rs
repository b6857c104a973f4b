//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the
//! resilience layer and its health server. All types derive Serde traits for
//! deserialization from TOML files.

use serde::{Deserialize, Serialize};

use crate::resilience::retries::RetryCondition;

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ResilienceConfig {
    /// Default retry policy for integration calls.
    pub retry: RetryConfig,

    /// Per-context circuit breaker settings.
    pub circuit_breaker: CircuitBreakerConfig,

    /// Inbound webhook verification.
    pub webhook: WebhookConfig,

    /// Health registry and probes.
    pub health: HealthConfig,

    /// Performance recorder.
    pub performance: PerformanceConfig,

    /// Outbound batching.
    pub batch: BatchConfig,

    /// Health server listener.
    pub server: ServerConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total number of attempts, including the first.
    pub max_attempts: u32,

    /// Delay before the second attempt in milliseconds.
    pub initial_delay_ms: u64,

    /// Upper bound for any single delay in milliseconds.
    pub max_delay_ms: u64,

    /// Growth factor applied per attempt.
    pub backoff_multiplier: f64,

    /// Randomize delays into `[delay/2, delay]`.
    pub jitter: bool,

    /// Overrides `IntegrationError::is_retryable` when set.
    #[serde(skip)]
    pub retry_condition: Option<RetryCondition>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 1000,
            max_delay_ms: 30_000,
            backoff_multiplier: 2.0,
            jitter: true,
            retry_condition: None,
        }
    }
}

impl RetryConfig {
    /// Replace the default retry predicate.
    pub fn with_retry_condition<F>(mut self, condition: F) -> Self
    where
        F: Fn(&crate::IntegrationError) -> bool + Send + Sync + 'static,
    {
        self.retry_condition = Some(RetryCondition::new(condition));
        self
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit.
    pub failure_threshold: u32,

    /// Initial open period in milliseconds.
    pub cooldown_ms: u64,

    /// Cap for the cooldown, which doubles on every failed half-open trial.
    pub max_cooldown_ms: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown_ms: 30_000,
            max_cooldown_ms: 300_000,
        }
    }
}

/// What the webhook HMAC covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SignatureScheme {
    /// HMAC over the raw payload bytes.
    #[default]
    Payload,
    /// HMAC over `"{timestamp}.{payload}"`.
    Timestamped,
}

/// Webhook verification configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WebhookConfig {
    /// Replay window in milliseconds (inclusive).
    pub tolerance_ms: u64,

    /// Signing scheme expected from senders.
    pub scheme: SignatureScheme,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            tolerance_ms: 300_000,
            scheme: SignatureScheme::Payload,
        }
    }
}

/// Health registry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Timeout applied to probes registered without their own.
    pub default_timeout_ms: u64,

    /// HTTP probes slower than this report `Degraded`.
    pub degraded_threshold_ms: u64,

    /// HTTP dependencies probed by `/ready`.
    pub http_checks: Vec<HttpCheckConfig>,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: 5000,
            degraded_threshold_ms: 2000,
            http_checks: Vec::new(),
        }
    }
}

/// A single HTTP dependency check.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HttpCheckConfig {
    /// Check name reported by `/ready`.
    pub name: String,

    /// URL fetched with GET.
    pub url: String,

    /// Per-check timeout override in milliseconds.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

/// Performance recorder configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PerformanceConfig {
    /// Samples kept per operation name.
    pub capacity: usize,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self { capacity: 1000 }
    }
}

/// Batch processing configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Items per sequential chunk.
    pub batch_size: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self { batch_size: 10 }
    }
}

/// Health server listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            request_timeout_secs: 30,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable the Prometheus endpoint.
    pub metrics_enabled: bool,

    /// Prometheus endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
