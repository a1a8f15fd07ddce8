//! Fixed-backoff retry loop.
//!
//! Used wherever a startup dependency has to be reachable before the process
//! can make progress. The loop is explicit (no recursion), sleeps a fixed
//! delay between attempts and stops early when shutdown is requested.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::emit;
use crate::error::RetryError;
use crate::metrics::events::RetryAttempted;

/// Default delay between attempts.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(3);

/// Fixed delay retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedBackoff {
    /// Delay slept after each failed attempt.
    pub delay: Duration,
    /// Maximum number of attempts, `None` retries forever.
    pub max_attempts: Option<u32>,
}

impl Default for FixedBackoff {
    fn default() -> Self {
        Self {
            delay: DEFAULT_RETRY_DELAY,
            max_attempts: None,
        }
    }
}

impl FixedBackoff {
    /// Retry forever with the given delay.
    pub fn unbounded(delay: Duration) -> Self {
        Self {
            delay,
            max_attempts: None,
        }
    }

    /// Give up after `max_attempts` attempts.
    pub fn bounded(delay: Duration, max_attempts: u32) -> Self {
        Self {
            delay,
            max_attempts: Some(max_attempts),
        }
    }

    fn exhausted(&self, attempts: u32) -> bool {
        self.max_attempts.is_some_and(|max| attempts >= max)
    }
}

/// Successful outcome of [`retry_with_backoff`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Retried<T> {
    /// Value produced by the successful attempt.
    pub value: T,
    /// Number of attempts it took (1 means no retry was needed).
    pub attempts: u32,
}

impl<T> Retried<T> {
    /// Number of delays that were slept before success.
    pub fn delays(&self) -> u32 {
        self.attempts.saturating_sub(1)
    }
}

/// Run `attempt` until it succeeds, sleeping `policy.delay` after each failure.
///
/// Every failure is logged with the attempt number. Shutdown is honoured
/// both while an attempt is running and while waiting for the next one.
pub async fn retry_with_backoff<T, E, F, Fut>(
    operation: &str,
    policy: FixedBackoff,
    shutdown: &CancellationToken,
    mut attempt: F,
) -> Result<Retried<T>, RetryError<E>>
where
    E: std::error::Error + 'static,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempts = 0;

    loop {
        attempts += 1;

        let result = match shutdown.run_until_cancelled(attempt(attempts)).await {
            Some(result) => result,
            None => {
                return Err(RetryError::Cancelled {
                    operation: operation.to_string(),
                    attempts,
                });
            }
        };

        match result {
            Ok(value) => {
                debug!(operation, attempts, "Operation succeeded");
                return Ok(Retried { value, attempts });
            }
            Err(source) if policy.exhausted(attempts) => {
                return Err(RetryError::Exhausted {
                    operation: operation.to_string(),
                    attempts,
                    source,
                });
            }
            Err(e) => {
                error!(
                    operation,
                    attempt = attempts,
                    error = %e,
                    "Attempt failed, retrying in {}s",
                    policy.delay.as_secs_f64()
                );
                emit!(RetryAttempted {
                    operation: operation.to_string(),
                });
            }
        }

        if shutdown
            .run_until_cancelled(tokio::time::sleep(policy.delay))
            .await
            .is_none()
        {
            return Err(RetryError::Cancelled {
                operation: operation.to_string(),
                attempts,
            });
        }
    }
}
