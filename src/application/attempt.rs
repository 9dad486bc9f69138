use crate::error::{BookingError, Result};
use std::future::Future;
use std::time::Duration;

/// Bounds `attempt` by `limit`. A timed-out attempt is dropped together with
/// its unit of work, which discards its writes and releases its locks.
pub(crate) async fn bounded<T>(
    limit: Duration,
    attempt: impl Future<Output = Result<T>>,
) -> Result<T> {
    match tokio::time::timeout(limit, attempt).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(timeout = ?limit, "operation timed out");
            Err(BookingError::Busy)
        }
    }
}

/// Runs `attempt` a second time if the first failed with a store failure.
pub(crate) async fn retry_once<T, F, Fut>(operation: &'static str, attempt: F) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    match attempt().await {
        Err(BookingError::StoreFailure(reason)) => {
            tracing::warn!(operation, %reason, "store failure, retrying once");
            attempt().await
        }
        other => other,
    }
}
