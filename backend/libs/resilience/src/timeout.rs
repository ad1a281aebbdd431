/// Timeout wrapper for long-running external work
use std::future::Future;
use std::time::Duration;
use tokio::time::timeout;

#[derive(Debug, thiserror::Error)]
pub enum TimeoutError<E> {
    #[error("operation timed out after {0:?}")]
    Elapsed(Duration),
    #[error("operation failed: {0}")]
    Failed(E),
}

/// Execute a fallible future with timeout, keeping the inner error intact
pub async fn with_timeout_result<F, T, E>(duration: Duration, future: F) -> Result<T, TimeoutError<E>>
where
    F: Future<Output = Result<T, E>>,
{
    match timeout(duration, future).await {
        Ok(Ok(result)) => Ok(result),
        Ok(Err(e)) => Err(TimeoutError::Failed(e)),
        Err(_) => Err(TimeoutError::Elapsed(duration)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_timeout_result_elapsed() {
        let result = with_timeout_result(Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            Ok::<_, &str>(42)
        })
        .await;

        assert!(matches!(result, Err(TimeoutError::Elapsed(_))));
    }

    #[tokio::test]
    async fn test_timeout_result_keeps_inner_error() {
        let result = with_timeout_result(Duration::from_secs(1), async {
            Err::<i32, _>("encoder crashed")
        })
        .await;

        match result {
            Err(TimeoutError::Failed(e)) => assert_eq!(e, "encoder crashed"),
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
