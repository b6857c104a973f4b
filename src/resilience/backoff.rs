//! Exponential backoff with jitter.

use std::time::Duration;
use rand::Rng;

use crate::config::RetryConfig;

/// Deterministic delay before attempt `attempt + 1`, where `attempt` is the
/// 1-based number of the attempt that just failed.
///
/// `min(initial_delay_ms * backoff_multiplier^(attempt-1), max_delay_ms)`
pub fn calculate_backoff(attempt: u32, config: &RetryConfig) -> Duration {
    if attempt == 0 {
        return Duration::from_millis(0);
    }

    let exponent = (attempt - 1).min(i32::MAX as u32) as i32;
    let delay_ms = config.initial_delay_ms as f64 * config.backoff_multiplier.powi(exponent);
    let capped = if delay_ms.is_finite() {
        delay_ms.min(config.max_delay_ms as f64)
    } else {
        config.max_delay_ms as f64
    };

    Duration::from_millis(capped.round() as u64)
}

/// Scale `delay` into `[delay/2, delay]` so that synchronized callers spread
/// out while still keeping a floor.
pub fn apply_jitter(delay: Duration) -> Duration {
    let factor = 0.5 + rand::thread_rng().gen::<f64>() * 0.5;
    Duration::from_millis((delay.as_millis() as f64 * factor).round() as u64)
}

/// Delay actually waited before the next attempt.
pub fn next_delay(attempt: u32, config: &RetryConfig) -> Duration {
    let base = calculate_backoff(attempt, config);
    if config.jitter {
        apply_jitter(base)
    } else {
        base
    }
}
