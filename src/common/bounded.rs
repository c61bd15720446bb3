//! Bounded calls: every suspension point that leaves the process goes through here
//! so a hang turns into a typed `Timeout` instead of an indefinite block.

use crate::common::error::{PlayScannerError, Result};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Await `fut` for at most `limit`; elapsed time becomes `PlayScannerError::Timeout`.
pub async fn bounded<T, F>(operation: &str, limit: Duration, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => {
            warn!(operation, after_ms = limit.as_millis() as u64, "bounded call timed out");
            Err(PlayScannerError::Timeout {
                operation: operation.to_string(),
                after_ms: limit.as_millis() as u64,
            })
        }
    }
}

/// Like `bounded`, for liveness probes: any error or timeout reads as `false`.
pub async fn bounded_probe<F>(operation: &str, limit: Duration, fut: F) -> bool
where
    F: Future<Output = bool>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(alive) => alive,
        Err(_) => {
            warn!(operation, after_ms = limit.as_millis() as u64, "probe timed out");
            false
        }
    }
}
