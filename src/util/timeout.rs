//! Timeout wrapping for async operations that must never hang indefinitely.
//!
//! Every outward network call, lease wait, and background loop in this crate
//! carries an explicit timeout (see spec §5 "Cancellation & timeouts").

use anyhow::Result;
use std::future::Future;
use std::time::Duration;

/// Run `operation` with an explicit timeout, distinguishing timeout from
/// operation failure in the returned error.
pub async fn with_timeout<F, T>(operation: F, timeout: Duration, operation_name: &str) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(timeout, operation).await {
        Ok(result) => result,
        Err(_) => Err(anyhow::anyhow!(
            "{operation_name} timed out after {timeout:?}"
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn times_out_when_operation_is_slow() {
        let result = with_timeout(
            async {
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok(())
            },
            Duration::from_millis(5),
            "slow-op",
        )
        .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn returns_value_when_fast_enough() {
        let result = with_timeout(async { Ok(42) }, Duration::from_secs(1), "fast-op").await;
        assert_eq!(result.unwrap(), 42);
    }
}
