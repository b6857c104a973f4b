//! Bounded per-operation performance history.
//!
//! Each operation name owns a ring buffer of at most `capacity` samples;
//! recording past capacity evicts the oldest sample. Aggregates are computed
//! over whatever the buffer currently holds.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use serde::Serialize;

use crate::error::Metadata;
use crate::observability::metrics;
use crate::resilience::clock::Clock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricStatus {
    Success,
    Error,
}

/// One recorded call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceMetric {
    pub operation: String,
    pub duration_ms: u64,
    /// Epoch milliseconds when the call finished.
    pub timestamp_ms: u64,
    pub status: MetricStatus,
    pub error: Option<String>,
    pub metadata: Option<Metadata>,
}

/// Aggregates over the current buffer of one operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperationStats {
    pub count: usize,
    pub average_ms: f64,
    pub min_ms: u64,
    pub max_ms: u64,
    pub p95_ms: u64,
    pub p99_ms: u64,
    /// Percentage of successful samples, 0-100.
    pub success_rate: f64,
}

pub struct PerformanceRecorder {
    capacity: usize,
    buffers: DashMap<String, VecDeque<PerformanceMetric>>,
    clock: Arc<dyn Clock>,
}

impl PerformanceRecorder {
    pub fn new(capacity: usize, clock: Arc<dyn Clock>) -> Self {
        Self {
            capacity: capacity.max(1),
            buffers: DashMap::new(),
            clock,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn record_metric(&self, metric: PerformanceMetric) {
        let mut buffer = self
            .buffers
            .entry(metric.operation.clone())
            .or_insert_with(|| VecDeque::with_capacity(self.capacity.min(64)));
        if buffer.len() >= self.capacity {
            buffer.pop_front();
        }
        buffer.push_back(metric);
    }

    /// Time `future` and record its outcome under `operation`.
    pub async fn measure<T, E, F>(&self, operation: &str, future: F) -> Result<T, E>
    where
        F: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let started = Instant::now();
        let result = future.await;
        let elapsed = started.elapsed();

        let (status, error) = match &result {
            Ok(_) => (MetricStatus::Success, None),
            Err(e) => (MetricStatus::Error, Some(e.to_string())),
        };
        metrics::record_operation(operation, elapsed, status == MetricStatus::Success);
        self.record_metric(PerformanceMetric {
            operation: operation.to_string(),
            duration_ms: elapsed.as_millis() as u64,
            timestamp_ms: self.clock.now_millis(),
            status,
            error,
            metadata: None,
        });
        result
    }

    pub fn get_average_duration(&self, operation: &str) -> Option<f64> {
        let buffer = self.buffers.get(operation)?;
        if buffer.is_empty() {
            return None;
        }
        let total: u64 = buffer.iter().map(|m| m.duration_ms).sum();
        Some(total as f64 / buffer.len() as f64)
    }

    /// Percentage (0-100) of successful samples in the current buffer.
    pub fn get_success_rate(&self, operation: &str) -> Option<f64> {
        let buffer = self.buffers.get(operation)?;
        if buffer.is_empty() {
            return None;
        }
        let ok = buffer.iter().filter(|m| m.status == MetricStatus::Success).count();
        Some(ok as f64 * 100.0 / buffer.len() as f64)
    }

    pub fn stats(&self, operation: &str) -> Option<OperationStats> {
        let buffer = self.buffers.get(operation)?;
        if buffer.is_empty() {
            return None;
        }

        let mut durations: Vec<u64> = buffer.iter().map(|m| m.duration_ms).collect();
        durations.sort_unstable();
        let count = durations.len();
        let ok = buffer.iter().filter(|m| m.status == MetricStatus::Success).count();

        Some(OperationStats {
            count,
            average_ms: durations.iter().sum::<u64>() as f64 / count as f64,
            min_ms: durations[0],
            max_ms: durations[count - 1],
            p95_ms: percentile(&durations, 95),
            p99_ms: percentile(&durations, 99),
            success_rate: ok as f64 * 100.0 / count as f64,
        })
    }

    /// Samples currently held for `operation`, oldest first.
    pub fn samples(&self, operation: &str) -> Vec<PerformanceMetric> {
        self.buffers
            .get(operation)
            .map(|b| b.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn operations(&self) -> Vec<String> {
        let mut names: Vec<String> = self.buffers.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    pub fn reset(&self) {
        self.buffers.clear();
    }
}

/// Nearest-rank percentile over sorted samples.
fn percentile(sorted: &[u64], pct: usize) -> u64 {
    let rank = (pct * sorted.len()).div_ceil(100).max(1);
    sorted[rank.min(sorted.len()) - 1]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resilience::clock::ManualClock;

    fn recorder(capacity: usize) -> PerformanceRecorder {
        PerformanceRecorder::new(capacity, Arc::new(ManualClock::new()))
    }

    fn metric(op: &str, duration_ms: u64, status: MetricStatus) -> PerformanceMetric {
        PerformanceMetric {
            operation: op.to_string(),
            duration_ms,
            timestamp_ms: 0,
            status,
            error: None,
            metadata: None,
        }
    }

    #[test]
    fn test_average_and_success_rate() {
        let r = recorder(10);
        r.record_metric(metric("crm.sync", 100, MetricStatus::Success));
        r.record_metric(metric("crm.sync", 300, MetricStatus::Error));
        r.record_metric(metric("crm.sync", 200, MetricStatus::Success));
        r.record_metric(metric("crm.sync", 400, MetricStatus::Success));

        assert_eq!(r.get_average_duration("crm.sync"), Some(250.0));
        assert_eq!(r.get_success_rate("crm.sync"), Some(75.0));
        assert_eq!(r.get_average_duration("sms.send"), None);
    }

    #[test]
    fn test_oldest_sample_evicted_at_capacity() {
        let r = recorder(3);
        for d in [10, 20, 30, 40, 50] {
            r.record_metric(metric("op", d, MetricStatus::Success));
        }
        let held: Vec<u64> = r.samples("op").iter().map(|m| m.duration_ms).collect();
        assert_eq!(held, vec![30, 40, 50]);
        assert_eq!(r.get_average_duration("op"), Some(40.0));
    }

    #[test]
    fn test_success_rate_reflects_only_buffer() {
        let r = recorder(2);
        r.record_metric(metric("op", 1, MetricStatus::Error));
        r.record_metric(metric("op", 1, MetricStatus::Success));
        r.record_metric(metric("op", 1, MetricStatus::Success));
        assert_eq!(r.get_success_rate("op"), Some(100.0));
    }

    #[test]
    fn test_stats_percentiles() {
        let r = recorder(1000);
        for d in 1..=100 {
            r.record_metric(metric("op", d, MetricStatus::Success));
        }
        let stats = r.stats("op").unwrap();
        assert_eq!(stats.count, 100);
        assert_eq!(stats.min_ms, 1);
        assert_eq!(stats.max_ms, 100);
        assert_eq!(stats.p95_ms, 95);
        assert_eq!(stats.p99_ms, 99);
        assert_eq!(stats.average_ms, 50.5);
    }

    #[test]
    fn test_single_sample_percentile() {
        assert_eq!(percentile(&[42], 99), 42);
    }

    #[tokio::test]
    async fn test_measure_records_outcome() {
        let r = recorder(10);
        let ok: Result<u8, String> = r.measure("op", async { Ok(1) }).await;
        let err: Result<u8, String> = r.measure("op", async { Err("boom".to_string()) }).await;

        assert_eq!(ok, Ok(1));
        assert!(err.is_err());
        let samples = r.samples("op");
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[1].error.as_deref(), Some("boom"));
        assert_eq!(samples[0].timestamp_ms, ManualClock::DEFAULT_START_MS);
        assert_eq!(r.get_success_rate("op"), Some(50.0));
    }

    #[test]
    fn test_reset_and_operations() {
        let r = recorder(10);
        r.record_metric(metric("b", 1, MetricStatus::Success));
        r.record_metric(metric("a", 1, MetricStatus::Success));
        assert_eq!(r.operations(), vec!["a".to_string(), "b".to_string()]);

        r.reset();
        assert!(r.operations().is_empty());
        assert_eq!(r.stats("a"), None);
    }
}
