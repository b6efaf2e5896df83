use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::AppError;

/// Fixed-delay retry policy for network-layer faults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt; total attempts are `max_retries + 1`.
    pub max_retries: u32,
    /// Delay before every retry.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            delay: Duration::from_millis(5000),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, delay: Duration) -> Self {
        Self { max_retries, delay }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries + 1
    }
}

/// Runs `operation` until it succeeds, fails with a non-retryable error,
/// or exhausts the policy. The operation receives the zero-based attempt.
///
/// The inter-retry sleep races `cancel`; cancellation yields
/// [`AppError::Cancelled`]. After the last attempt the final error is
/// returned unchanged.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    context: &str,
    mut operation: F,
) -> Result<T, AppError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, AppError>>,
{
    let mut attempt = 0;
    loop {
        if cancel.is_cancelled() {
            return Err(AppError::Cancelled);
        }

        match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < policy.max_retries => {
                tracing::warn!(
                    %context,
                    attempt = attempt + 1,
                    max_attempts = policy.max_attempts(),
                    error = %e,
                    "Request failed, retrying in {}ms",
                    policy.delay.as_millis()
                );
                tokio::select! {
                    () = tokio::time::sleep(policy.delay) => {}
                    () = cancel.cancelled() => return Err(AppError::Cancelled),
                }
                attempt += 1;
            }
            Err(e) => {
                if e.is_retryable() {
                    tracing::error!(
                        %context,
                        attempts = attempt + 1,
                        category = %e.category(),
                        error = %e,
                        "Retries exhausted"
                    );
                }
                return Err(e);
            }
        }
    }
}
