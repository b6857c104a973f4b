//! Time source injected into every time-dependent component.
//!
//! Breaker cooldowns, rate-limit windows and webhook replay checks read
//! `now_millis`; the retry executor waits through `sleep`. Tests swap in a
//! [`ManualClock`] so no test ever sleeps for real.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;

/// Wall clock plus sleeper.
#[async_trait]
pub trait Clock: Send + Sync + 'static {
    /// Milliseconds since the UNIX epoch.
    fn now_millis(&self) -> u64;

    /// Suspend the caller for `duration`.
    async fn sleep(&self, duration: Duration);
}

/// Real time backed by the system clock and Tokio timers.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now_millis(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Virtual clock for deterministic tests.
///
/// `sleep` returns immediately after advancing virtual time by the requested
/// duration, and remembers every requested delay.
#[derive(Debug)]
pub struct ManualClock {
    now: AtomicU64,
    sleeps: Mutex<Vec<Duration>>,
}

impl ManualClock {
    /// Arbitrary but realistic starting point (2023-11-14T22:13:20Z).
    pub const DEFAULT_START_MS: u64 = 1_700_000_000_000;

    pub fn new() -> Self {
        Self::starting_at(Self::DEFAULT_START_MS)
    }

    pub fn starting_at(millis: u64) -> Self {
        Self {
            now: AtomicU64::new(millis),
            sleeps: Mutex::new(Vec::new()),
        }
    }

    /// Move virtual time forward without recording a sleep.
    pub fn advance(&self, duration: Duration) {
        self.now.fetch_add(duration.as_millis() as u64, Ordering::SeqCst);
    }

    /// Every delay passed to `sleep`, in call order.
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().expect("manual clock mutex poisoned").clone()
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now_millis(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }

    async fn sleep(&self, duration: Duration) {
        self.sleeps.lock().expect("manual clock mutex poisoned").push(duration);
        self.advance(duration);
        tokio::task::yield_now().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_manual_clock_sleep_advances_and_records() {
        let clock = ManualClock::starting_at(1_000);
        clock.sleep(Duration::from_millis(250)).await;
        clock.advance(Duration::from_millis(50));

        assert_eq!(clock.now_millis(), 1_300);
        assert_eq!(clock.sleeps(), vec![Duration::from_millis(250)]);
    }

    #[test]
    fn test_system_clock_is_epoch_based() {
        assert!(SystemClock.now_millis() > ManualClock::DEFAULT_START_MS);
    }
}
