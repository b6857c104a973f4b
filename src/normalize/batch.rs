//! Chunked outbound processing.
//!
//! # Responsibilities
//! - Split work into ordered chunks and settle each chunk before the next
//! - Keep per-item outcomes so one failure never sinks the batch
//! - Optionally gate every item on the remote's announced quota
//!
//! # Design Decisions
//! - No cross-chunk concurrency; chunk size bounds simultaneous calls
//! - Output order and length always match the input

use std::future::Future;

use futures_util::future::join_all;
use serde::Serialize;
use serde_json::Value;

use crate::error::IntegrationError;
use crate::security::rate_limit::RateLimitTracker;

/// Process `items` in chunks of `batch_size` (0 is treated as 1).
///
/// Items within a chunk run concurrently; every item of a chunk settles
/// before the next chunk starts.
pub async fn batch_process<T, R, E, F, Fut>(
    items: Vec<T>,
    batch_size: usize,
    process: F,
) -> Vec<Result<R, IntegrationError>>
where
    F: Fn(T) -> Fut,
    Fut: Future<Output = Result<R, E>>,
    E: Into<IntegrationError>,
{
    let batch_size = batch_size.max(1);
    let total = items.len();
    let mut results = Vec::with_capacity(total);
    let mut items = items.into_iter().peekable();
    let mut chunk_index = 0usize;

    while items.peek().is_some() {
        let chunk: Vec<T> = items.by_ref().take(batch_size).collect();
        tracing::debug!(chunk = chunk_index, size = chunk.len(), total, "Processing batch chunk");

        let settled = join_all(chunk.into_iter().map(|item| {
            let call = process(item);
            async move { call.await.map_err(Into::into) }
        }))
        .await;
        results.extend(settled);
        chunk_index += 1;
    }

    results
}

/// Like [`batch_process`], but every item first asks `tracker` whether
/// `key` may be called; a refused item fails with a `RateLimitError`
/// without being processed.
pub async fn batch_process_limited<T, R, E, F, Fut>(
    items: Vec<T>,
    batch_size: usize,
    tracker: &RateLimitTracker,
    key: &str,
    process: F,
) -> Vec<Result<R, IntegrationError>>
where
    F: Fn(T) -> Fut,
    Fut: Future<Output = Result<R, E>>,
    E: Into<IntegrationError>,
{
    let process = &process;
    batch_process(items, batch_size, |item| async move {
        if !tracker.can_make_request(key) {
            let retry_after = tracker.get_retry_after_secs(key);
            return Err(IntegrationError::rate_limit(
                format!("rate limit for '{}' exhausted", key),
                Some(retry_after),
                tracker.get(key).map(|r| r.limit),
            ));
        }
        process(item).await.map_err(Into::into)
    })
    .await
}

/// One item that could not be enriched.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnrichmentFailure {
    pub index: usize,
    pub error: IntegrationError,
}

/// Enriched items (failed ones left as they were) plus per-item failures.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnrichmentOutcome {
    pub items: Vec<Value>,
    pub failures: Vec<EnrichmentFailure>,
}

impl EnrichmentOutcome {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Merge `enricher(item)` into each object item, one item at a time.
///
/// Enrichment fields overwrite existing ones. A failing enricher, or an item
/// or enrichment that is not an object, is recorded and the item is kept
/// unchanged.
pub async fn enrich_data<F, Fut, E>(items: Vec<Value>, enricher: F) -> EnrichmentOutcome
where
    F: Fn(&Value) -> Fut,
    Fut: Future<Output = Result<Value, E>>,
    E: Into<IntegrationError>,
{
    let mut enriched = Vec::with_capacity(items.len());
    let mut failures = Vec::new();

    for (index, mut item) in items.into_iter().enumerate() {
        let outcome = match enricher(&item).await.map_err(Into::into) {
            Ok(Value::Object(extra)) if item.is_object() => {
                if let Some(target) = item.as_object_mut() {
                    target.extend(extra);
                }
                Ok(())
            }
            Ok(Value::Object(_)) => Err(IntegrationError::data_mapping(
                "only objects can be enriched",
                item.clone(),
                "object",
            )),
            Ok(other) => Err(IntegrationError::data_mapping(
                "enrichment must be an object",
                other,
                "object",
            )),
            Err(e) => Err(e),
        };

        if let Err(error) = outcome {
            tracing::debug!(index, code = %error.code, "Item enrichment failed");
            failures.push(EnrichmentFailure { index, error });
        }
        enriched.push(item);
    }

    EnrichmentOutcome {
        items: enriched,
        failures,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resilience::clock::ManualClock;
    use crate::security::rate_limit::RateLimitInfo;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    #[tokio::test]
    async fn test_chunks_preserve_order_with_failures() {
        let seen_chunks = Mutex::new(Vec::new());
        let in_flight = AtomicUsize::new(0);

        let results = batch_process((0..10).collect(), 3, |n: u32| {
            let seen_chunks = &seen_chunks;
            let in_flight = &in_flight;
            async move {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                tokio::task::yield_now().await;
                seen_chunks.lock().unwrap().push((n / 3, now));
                in_flight.fetch_sub(1, Ordering::SeqCst);
                if n % 4 == 0 {
                    Err(IntegrationError::connection("reset", format!("item {}", n)))
                } else {
                    Ok(n * 10)
                }
            }
        })
        .await;

        assert_eq!(results.len(), 10);
        for (i, r) in results.iter().enumerate() {
            if i % 4 == 0 {
                assert!(r.is_err());
            } else {
                assert_eq!(r.as_ref().unwrap(), &(i as u32 * 10));
            }
        }

        let seen = seen_chunks.into_inner().unwrap();
        let chunks: Vec<u32> = seen.iter().map(|(c, _)| *c).collect();
        assert!(chunks.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(chunks.iter().max(), Some(&3));
        assert!(seen.iter().all(|(_, concurrent)| *concurrent <= 3));
    }

    #[tokio::test]
    async fn test_zero_batch_size_processes_one_at_a_time() {
        let results = batch_process(vec![1, 2], 0, |n: i32| async move { Ok::<_, IntegrationError>(n) }).await;
        assert_eq!(results, vec![Ok(1), Ok(2)]);

        let empty = batch_process(Vec::<i32>::new(), 5, |n: i32| async move { Ok::<_, IntegrationError>(n) }).await;
        assert!(empty.is_empty());
    }

    #[tokio::test]
    async fn test_limited_batch_stops_calling_when_quota_exhausted() {
        let tracker = RateLimitTracker::new(Arc::new(ManualClock::new()));
        let calls = AtomicUsize::new(0);

        let results = batch_process_limited(vec!["a", "b", "c"], 1, &tracker, "sms", |item| {
            let calls = &calls;
            let tracker = &tracker;
            async move {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                tracker.update_limit(
                    "sms",
                    RateLimitInfo { limit: Some(2), remaining: Some(1 - n as u64), reset: Some(60) },
                );
                Ok::<_, IntegrationError>(item.to_uppercase())
            }
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(results[0], Ok("A".to_string()));
        assert_eq!(results[1], Ok("B".to_string()));
        let err = results[2].clone().unwrap_err();
        assert_eq!(err.code, "rate_limited");
        assert_eq!(err.retry_after(), Some(std::time::Duration::from_secs(60)));
    }

    #[tokio::test]
    async fn test_enrich_collects_partial_failures() {
        let items = vec![json!({"id": 1}), json!({"id": 2}), json!("bare"), json!({"id": 4})];

        let outcome = enrich_data(items, |item: &Value| {
            let id = item.get("id").and_then(Value::as_i64);
            async move {
                match id {
                    Some(2) => Err(IntegrationError::connection("reset", "lookup failed")),
                    Some(id) => {
                        let tier = if id > 2 { "gold" } else { "silver" };
                        Ok(json!({ "tier": tier }))
                    }
                    None => Ok(json!({"tier": "none"})),
                }
            }
        })
        .await;

        assert!(!outcome.is_complete());
        assert_eq!(outcome.items.len(), 4);
        assert_eq!(outcome.items[0], json!({"id": 1, "tier": "silver"}));
        assert_eq!(outcome.items[1], json!({"id": 2}));
        assert_eq!(outcome.items[2], json!("bare"));
        assert_eq!(outcome.items[3], json!({"id": 4, "tier": "gold"}));
        let failed: Vec<usize> = outcome.failures.iter().map(|f| f.index).collect();
        assert_eq!(failed, vec![1, 2]);
    }
}
