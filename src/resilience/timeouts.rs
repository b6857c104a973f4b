//! Timeout enforcement.
//!
//! # Responsibilities
//! - Wrap integration calls and health probes with a deadline
//! - Cancel operations cleanly on timeout (the future is dropped)
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities
//! - Timeout errors are `ConnectionError`s with code `timeout`, so they retry

use std::future::Future;
use std::time::Duration;

use crate::error::IntegrationError;

/// Await `future` for at most `limit`; `None` when the deadline passed.
pub async fn deadline<F: Future>(limit: Duration, future: F) -> Option<F::Output> {
    tokio::time::timeout(limit, future).await.ok()
}

/// Await a fallible call for at most `limit`, flattening the timeout into the
/// integration error taxonomy.
pub async fn with_timeout<T, E, F>(label: &str, limit: Duration, future: F) -> Result<T, IntegrationError>
where
    F: Future<Output = Result<T, E>>,
    E: Into<IntegrationError>,
{
    match deadline(limit, future).await {
        Some(result) => result.map_err(Into::into),
        None => {
            let timeout_ms = limit.as_millis() as u64;
            tracing::warn!(operation = %label, timeout_ms, "Call timed out");
            Err(IntegrationError::connection(
                "timeout",
                format!("{} timed out after {}ms", label, timeout_ms),
            )
            .with_metadata("timeout_ms", timeout_ms))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_slow_call_times_out_as_retryable() {
        let err = with_timeout("crm.fetch", Duration::from_millis(50), async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            Ok::<_, IntegrationError>(())
        })
        .await
        .unwrap_err();

        assert_eq!(err.code, "timeout");
        assert!(err.is_retryable);
        assert_eq!(err.metadata.get("timeout_ms"), Some(&serde_json::json!(50)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fast_call_passes_through() {
        let value = with_timeout("crm.fetch", Duration::from_secs(1), async {
            Ok::<_, IntegrationError>(5)
        })
        .await;
        assert_eq!(value, Ok(5));

        assert_eq!(deadline(Duration::from_millis(1), std::future::pending::<()>()).await, None);
    }
}
