//! Per-key remote quota tracking.
//!
//! Remote APIs announce their quota on every response
//! (`X-RateLimit-Limit` / `-Remaining` / `-Reset`). The tracker keeps the
//! latest announcement per endpoint or credential key and answers whether
//! another call may go out now.

use std::sync::Arc;
use std::time::Duration;

use axum::http::HeaderMap;
use dashmap::DashMap;
use serde::Serialize;

use crate::observability::metrics;
use crate::resilience::clock::Clock;

/// Reset values below this are read as "seconds from now", above as epoch seconds.
const EPOCH_SECONDS_THRESHOLD: u64 = 1_000_000_000;

/// Quota state parsed from a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RateLimitInfo {
    pub limit: Option<u64>,
    pub remaining: Option<u64>,
    /// Window reset, epoch seconds or seconds-from-now.
    pub reset: Option<u64>,
}

impl RateLimitInfo {
    /// Read `X-RateLimit-*` headers. Returns `None` when none are present.
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let read = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
        };

        let info = Self {
            limit: read("x-ratelimit-limit"),
            remaining: read("x-ratelimit-remaining"),
            reset: read("x-ratelimit-reset"),
        };

        if info == Self::default() {
            None
        } else {
            Some(info)
        }
    }

    fn reset_at_millis(&self, now_ms: u64) -> u64 {
        match self.reset {
            Some(reset) if reset >= EPOCH_SECONDS_THRESHOLD => reset.saturating_mul(1000),
            Some(delta) => now_ms.saturating_add(delta.saturating_mul(1000)),
            None => now_ms,
        }
    }
}

/// Stored quota for one key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RateLimitRecord {
    pub limit: u64,
    pub remaining: u64,
    /// Epoch milliseconds at which the window resets.
    pub reset_at: u64,
}

/// Tracks remote quotas keyed by endpoint or credential id.
pub struct RateLimitTracker {
    records: DashMap<String, RateLimitRecord>,
    clock: Arc<dyn Clock>,
}

impl RateLimitTracker {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            records: DashMap::new(),
            clock,
        }
    }

    /// True if no record exists, quota remains, or the window has reset.
    pub fn can_make_request(&self, key: &str) -> bool {
        match self.records.get(key) {
            None => true,
            Some(record) => record.remaining > 0 || self.clock.now_millis() >= record.reset_at,
        }
    }

    /// Overwrite the record for `key` with the latest response metadata.
    ///
    /// Missing fields fall back to the previous record (or to an unlimited
    /// default) so partial headers never fabricate an exhausted quota.
    pub fn update_limit(&self, key: &str, info: RateLimitInfo) {
        let now = self.clock.now_millis();
        let mut entry = self.records.entry(key.to_string()).or_insert(RateLimitRecord {
            limit: u64::MAX,
            remaining: u64::MAX,
            reset_at: now,
        });

        if let Some(limit) = info.limit {
            entry.limit = limit;
        }
        if let Some(remaining) = info.remaining {
            entry.remaining = remaining;
        }
        if info.reset.is_some() {
            entry.reset_at = info.reset_at_millis(now);
        }

        tracing::trace!(
            key = %key,
            limit = entry.limit,
            remaining = entry.remaining,
            reset_at = entry.reset_at,
            "Rate limit updated"
        );
    }

    /// Mark `key` as exhausted until `retry_after` from now.
    pub fn record_throttled(&self, key: &str, retry_after: Duration, limit: Option<u64>) {
        let now = self.clock.now_millis();
        let reset_at = now.saturating_add(retry_after.as_millis() as u64);
        let mut entry = self.records.entry(key.to_string()).or_insert(RateLimitRecord {
            limit: limit.unwrap_or(0),
            remaining: 0,
            reset_at,
        });
        entry.remaining = 0;
        entry.reset_at = entry.reset_at.max(reset_at);
        if let Some(limit) = limit {
            entry.limit = limit;
        }
        metrics::record_rate_limited(key);
    }

    /// Time until the window for `key` resets; zero when unknown or past.
    pub fn get_retry_after(&self, key: &str) -> Duration {
        match self.records.get(key) {
            Some(record) => Duration::from_millis(record.reset_at.saturating_sub(self.clock.now_millis())),
            None => Duration::ZERO,
        }
    }

    /// `get_retry_after` rounded up to whole seconds.
    pub fn get_retry_after_secs(&self, key: &str) -> u64 {
        let ms = self.get_retry_after(key).as_millis() as u64;
        ms.div_ceil(1000)
    }

    pub fn get(&self, key: &str) -> Option<RateLimitRecord> {
        self.records.get(key).map(|r| *r)
    }

    pub fn reset(&self) {
        self.records.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resilience::clock::ManualClock;
    use axum::http::HeaderValue;

    fn tracker() -> (Arc<ManualClock>, RateLimitTracker) {
        let clock = Arc::new(ManualClock::new());
        let tracker = RateLimitTracker::new(clock.clone());
        (clock, tracker)
    }

    fn info(limit: u64, remaining: u64, reset_delta_secs: u64) -> RateLimitInfo {
        RateLimitInfo {
            limit: Some(limit),
            remaining: Some(remaining),
            reset: Some(reset_delta_secs),
        }
    }

    #[test]
    fn test_unknown_key_is_allowed() {
        let (_, tracker) = tracker();
        assert!(tracker.can_make_request("crm"));
        assert_eq!(tracker.get_retry_after("crm"), Duration::ZERO);
    }

    #[test]
    fn test_exhausted_until_reset() {
        let (clock, tracker) = tracker();
        tracker.update_limit("crm", info(100, 0, 30));

        assert!(!tracker.can_make_request("crm"));
        assert_eq!(tracker.get_retry_after_secs("crm"), 30);

        clock.advance(Duration::from_millis(29_500));
        assert!(!tracker.can_make_request("crm"));
        assert_eq!(tracker.get_retry_after_secs("crm"), 1);

        clock.advance(Duration::from_millis(500));
        assert!(tracker.can_make_request("crm"));
        assert_eq!(tracker.get_retry_after("crm"), Duration::ZERO);
    }

    #[test]
    fn test_remaining_quota_allows() {
        let (_, tracker) = tracker();
        tracker.update_limit("crm", info(100, 1, 30));
        assert!(tracker.can_make_request("crm"));
    }

    #[test]
    fn test_epoch_reset_header() {
        let (clock, tracker) = tracker();
        let reset_epoch_secs = clock.now_millis() / 1000 + 10;
        tracker.update_limit(
            "sms",
            RateLimitInfo { limit: Some(5), remaining: Some(0), reset: Some(reset_epoch_secs) },
        );
        assert_eq!(tracker.get_retry_after_secs("sms"), 10);
    }

    #[test]
    fn test_keys_are_independent() {
        let (_, tracker) = tracker();
        tracker.update_limit("crm", info(10, 0, 60));
        assert!(!tracker.can_make_request("crm"));
        assert!(tracker.can_make_request("sms"));
    }

    #[test]
    fn test_partial_update_keeps_previous_fields() {
        let (_, tracker) = tracker();
        tracker.update_limit("crm", info(100, 50, 60));
        tracker.update_limit("crm", RateLimitInfo { remaining: Some(49), ..Default::default() });

        let record = tracker.get("crm").unwrap();
        assert_eq!(record.limit, 100);
        assert_eq!(record.remaining, 49);
    }

    #[test]
    fn test_record_throttled_blocks_for_retry_after() {
        let (clock, tracker) = tracker();
        tracker.record_throttled("crm", Duration::from_secs(5), Some(100));
        assert!(!tracker.can_make_request("crm"));
        assert_eq!(tracker.get("crm").unwrap().limit, 100);

        clock.advance(Duration::from_secs(5));
        assert!(tracker.can_make_request("crm"));
    }

    #[test]
    fn test_headers_parsing() {
        let mut headers = HeaderMap::new();
        assert_eq!(RateLimitInfo::from_headers(&headers), None);

        headers.insert("X-RateLimit-Limit", HeaderValue::from_static("60"));
        headers.insert("X-RateLimit-Remaining", HeaderValue::from_static(" 12 "));
        headers.insert("X-RateLimit-Reset", HeaderValue::from_static("garbage"));
        assert_eq!(
            RateLimitInfo::from_headers(&headers),
            Some(RateLimitInfo { limit: Some(60), remaining: Some(12), reset: None })
        );
    }

    #[test]
    fn test_reset_clears_records() {
        let (_, tracker) = tracker();
        tracker.update_limit("crm", info(1, 0, 60));
        tracker.reset();
        assert!(tracker.can_make_request("crm"));
    }
}
