//! Bounded exponential backoff for idempotent calls.
//!
//! Only calls that are safe to repeat go through [`retry_with_backoff`]:
//! report post-processing and opening the progress stream. Submissions,
//! login, chat and uploads are attempted exactly once.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// Tunable parameters for the backoff strategy.
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// Delay before the second attempt.
    pub initial_delay: Duration,
    /// Upper bound on the delay between attempts.
    pub max_delay: Duration,
    /// Factor by which the delay grows after each failure.
    pub multiplier: f64,
    /// Total attempts, including the first one.
    pub max_attempts: u32,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(5),
            multiplier: 2.0,
            max_attempts: 3,
        }
    }
}

/// Calculate the next backoff delay from the current delay and config.
///
/// The result is clamped to [`BackoffConfig::max_delay`].
pub fn next_delay(current: Duration, config: &BackoffConfig) -> Duration {
    let next_ms = (current.as_millis() as f64 * config.multiplier) as u64;
    Duration::from_millis(next_ms).min(config.max_delay)
}

/// Run `op` until it succeeds, fails permanently, or runs out of attempts.
///
/// `should_retry` decides whether an error is worth another attempt.
/// Returns `None` if `cancel` fires first; otherwise the last result.
pub async fn retry_with_backoff<T, E, F, Fut>(
    config: &BackoffConfig,
    cancel: &CancellationToken,
    operation: &str,
    should_retry: impl Fn(&E) -> bool,
    mut op: F,
) -> Option<Result<T, E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut delay = config.initial_delay;
    let mut attempt = 0u32;

    loop {
        attempt += 1;

        if cancel.is_cancelled() {
            tracing::debug!(operation, attempt, "Retry cancelled");
            return None;
        }

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!(operation, attempt, "Retry cancelled");
                return None;
            }
            result = op() => result,
        };

        match result {
            Ok(value) => {
                if attempt > 1 {
                    tracing::info!(operation, attempt, "Succeeded after retry");
                }
                return Some(Ok(value));
            }
            Err(e) if attempt >= config.max_attempts.max(1) || !should_retry(&e) => {
                return Some(Err(e));
            }
            Err(e) => {
                tracing::warn!(
                    operation,
                    error = %e,
                    delay_ms = delay.as_millis() as u64,
                    "Attempt {attempt} failed, retrying",
                );
            }
        }

        tokio::select! {
            _ = cancel.cancelled() => return None,
            _ = tokio::time::sleep(delay) => {}
        }

        delay = next_delay(delay, config);
    }
}
