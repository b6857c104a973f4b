//! Circuit breaker for integration protection.
//!
//! # States
//! - Closed: normal operation, calls pass through
//! - Open: remote assumed down, calls fail fast
//! - Half-Open: exactly one trial call is let through
//!
//! # State Transitions
//! ```text
//! Closed → Open: consecutive failures >= failure_threshold
//! Open → Half-Open: first evaluation after the cooldown elapsed
//! Half-Open → Closed: trial call succeeds (counters and cooldown reset)
//! Half-Open → Open: trial call fails (cooldown doubles, up to max_cooldown_ms)
//! ```
//!
//! # Design Decisions
//! - Per-context circuit breaker (not global)
//! - Fail fast in Open state (no waiting for timeout)
//! - Single probe in Half-Open (prevents hammering recovering remote)
//! - Per-key read-modify-write through DashMap entries; keys never contend

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde::Serialize;

use crate::config::CircuitBreakerConfig;
use crate::observability::metrics;
use crate::resilience::clock::Clock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

/// Breaker record for one context key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CircuitSnapshot {
    pub state: CircuitState,
    pub failure_count: u32,
    /// Epoch milliseconds of the last Open transition.
    pub opened_at: Option<u64>,
    pub cooldown_ms: u64,
    pub trial_in_flight: bool,
}

impl CircuitSnapshot {
    fn closed(cooldown_ms: u64) -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            opened_at: None,
            cooldown_ms,
            trial_in_flight: false,
        }
    }
}

/// Rejection from an open (or busy half-open) circuit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitOpen {
    pub retry_after: Duration,
}

/// Circuit breakers keyed by context.
pub struct CircuitBreakerRegistry {
    config: CircuitBreakerConfig,
    circuits: DashMap<String, CircuitSnapshot>,
    clock: Arc<dyn Clock>,
}

impl CircuitBreakerRegistry {
    pub fn new(config: CircuitBreakerConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            circuits: DashMap::new(),
            clock,
        }
    }

    /// Ask permission for one call on `key`.
    ///
    /// An elapsed Open circuit moves to Half-Open here and hands out the single
    /// trial slot; further callers are rejected until the trial settles.
    pub fn try_acquire(&self, key: &str) -> Result<(), CircuitOpen> {
        let Some(mut circuit) = self.circuits.get_mut(key) else {
            return Ok(());
        };
        let now = self.clock.now_millis();

        match circuit.state {
            CircuitState::Closed => Ok(()),
            CircuitState::Open => {
                let reopen_at = circuit.opened_at.unwrap_or(0).saturating_add(circuit.cooldown_ms);
                if now >= reopen_at {
                    circuit.state = CircuitState::HalfOpen;
                    circuit.trial_in_flight = true;
                    tracing::info!(context = %key, "Circuit half-open, allowing trial call");
                    metrics::record_circuit_state(key, CircuitState::HalfOpen);
                    Ok(())
                } else {
                    Err(CircuitOpen {
                        retry_after: Duration::from_millis(reopen_at - now),
                    })
                }
            }
            CircuitState::HalfOpen => {
                if circuit.trial_in_flight {
                    Err(CircuitOpen { retry_after: Duration::ZERO })
                } else {
                    circuit.trial_in_flight = true;
                    Ok(())
                }
            }
        }
    }

    /// Give back a trial slot that was acquired but never used.
    pub fn release_trial(&self, key: &str) {
        if let Some(mut circuit) = self.circuits.get_mut(key) {
            if circuit.state == CircuitState::HalfOpen {
                circuit.trial_in_flight = false;
            }
        }
    }

    pub fn record_success(&self, key: &str) {
        let Some(mut circuit) = self.circuits.get_mut(key) else {
            return;
        };
        if circuit.state != CircuitState::Closed {
            tracing::info!(context = %key, "Circuit closed after successful trial");
        }
        *circuit = CircuitSnapshot::closed(self.config.cooldown_ms);
        metrics::record_circuit_state(key, CircuitState::Closed);
    }

    pub fn record_failure(&self, key: &str) {
        let now = self.clock.now_millis();
        let mut circuit = self
            .circuits
            .entry(key.to_string())
            .or_insert_with(|| CircuitSnapshot::closed(self.config.cooldown_ms));

        circuit.failure_count = circuit.failure_count.saturating_add(1);

        match circuit.state {
            CircuitState::Closed => {
                if circuit.failure_count >= self.config.failure_threshold {
                    circuit.state = CircuitState::Open;
                    circuit.opened_at = Some(now);
                    tracing::warn!(
                        context = %key,
                        failures = circuit.failure_count,
                        cooldown_ms = circuit.cooldown_ms,
                        "Circuit opened due to failures"
                    );
                    metrics::record_circuit_state(key, CircuitState::Open);
                }
            }
            CircuitState::HalfOpen => {
                circuit.state = CircuitState::Open;
                circuit.opened_at = Some(now);
                circuit.trial_in_flight = false;
                circuit.cooldown_ms = circuit
                    .cooldown_ms
                    .saturating_mul(2)
                    .min(self.config.max_cooldown_ms);
                tracing::warn!(
                    context = %key,
                    cooldown_ms = circuit.cooldown_ms,
                    "Circuit reopened after half-open failure"
                );
                metrics::record_circuit_state(key, CircuitState::Open);
            }
            CircuitState::Open => {}
        }
    }

    /// Current state as stored (an elapsed Open circuit still reads Open
    /// until the next `try_acquire`).
    pub fn state(&self, key: &str) -> CircuitState {
        self.circuits
            .get(key)
            .map(|c| c.state)
            .unwrap_or(CircuitState::Closed)
    }

    pub fn snapshot(&self, key: &str) -> CircuitSnapshot {
        self.circuits
            .get(key)
            .map(|c| c.value().clone())
            .unwrap_or_else(|| CircuitSnapshot::closed(self.config.cooldown_ms))
    }

    /// Force the circuit open from now (for admin use and tests).
    pub fn force_open(&self, key: &str) {
        let now = self.clock.now_millis();
        let mut circuit = self
            .circuits
            .entry(key.to_string())
            .or_insert_with(|| CircuitSnapshot::closed(self.config.cooldown_ms));
        circuit.state = CircuitState::Open;
        circuit.opened_at = Some(now);
        circuit.trial_in_flight = false;
        metrics::record_circuit_state(key, CircuitState::Open);
    }

    pub fn force_close(&self, key: &str) {
        self.circuits
            .insert(key.to_string(), CircuitSnapshot::closed(self.config.cooldown_ms));
        metrics::record_circuit_state(key, CircuitState::Closed);
    }

    pub fn reset(&self) {
        self.circuits.clear();
    }
}
