//! Backoff for retryable provider errors.

use std::future::Future;
use std::time::Duration;
use tracing::warn;

use super::ProviderError;

/// Run `op` up to `max_attempts` times.
///
/// Only errors whose category allows a retry after backoff are retried;
/// the delay doubles after each attempt starting at `base_delay`.
pub async fn retry_with_backoff<T, F, Fut>(
    max_attempts: u32,
    base_delay: Duration,
    mut op: F,
) -> Result<T, ProviderError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
{
    let max_attempts = max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < max_attempts => {
                let delay = base_delay.saturating_mul(1 << (attempt - 1).min(16));
                warn!(
                    provider = %e.provider,
                    category = %e.category,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "Retrying provider call"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ErrorCategory;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    fn error(category: ErrorCategory) -> ProviderError {
        ProviderError::new("test", category, "failure", "api_error.mp4")
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_transient_errors_with_backoff() {
        let calls = AtomicU32::new(0);
        let start = Instant::now();

        let result = retry_with_backoff(4, Duration::from_millis(100), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(error(ErrorCategory::RateLimited))
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // 100ms + 200ms
        assert!(start.elapsed() >= Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminal_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = retry_with_backoff(5, Duration::from_millis(10), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(error(ErrorCategory::AuthInvalid)) }
        })
        .await;

        assert_eq!(result.unwrap_err().category, ErrorCategory::AuthInvalid);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = retry_with_backoff(3, Duration::from_millis(10), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(error(ErrorCategory::ServiceUnavailable)) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
