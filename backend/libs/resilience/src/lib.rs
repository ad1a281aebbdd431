/// Resilience patterns for calls into external collaborators
///
/// - **Retry**: bounded attempts with linear backoff
/// - **Timeout**: time limits for long-running external work (encodes, uploads)
///
/// # Example: object upload with linear backoff
///
/// ```rust,no_run
/// use resilience::{with_retry, RetryConfig};
/// use std::time::Duration;
///
/// #[tokio::main]
/// async fn main() {
///     // 3 attempts, waiting 1s then 2s between them
///     let config = RetryConfig::linear(3, Duration::from_secs(1));
///
///     let result = with_retry(&config, |attempt| async move {
///         // Your idempotent upload here
///         let _ = attempt;
///         Ok::<_, String>(())
///     })
///     .await;
/// }
/// ```

pub mod retry;
pub mod timeout;

pub use retry::{with_retry, RetryConfig, RetryError};
pub use timeout::{with_timeout_result, TimeoutError};
