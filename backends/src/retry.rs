use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};
use rand::Rng;

/// Configuration for retry behavior with exponential backoff
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts
    pub max_attempts: u32,
    /// Initial backoff duration
    pub initial_backoff: Duration,
    /// Maximum backoff duration
    pub max_backoff: Duration,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
    /// Add jitter to prevent thundering herd
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Calculate backoff duration for a given attempt
    fn backoff_duration(&self, attempt: u32) -> Duration {
        let base_duration = self.initial_backoff.as_millis() as f64
            * self.backoff_multiplier.powi(attempt as i32);

        let duration_ms = base_duration.min(self.max_backoff.as_millis() as f64) as u64;
        let mut duration = Duration::from_millis(duration_ms);

        // Add jitter: random value between 0% and 25% of duration
        if self.jitter {
            let jitter_ms = rand::thread_rng().gen_range(0..=(duration_ms / 4));
            duration += Duration::from_millis(jitter_ms);
        }

        duration
    }
}

/// Trait to determine if an error is retryable
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

impl Retryable for blockvault_core::Error {
    fn is_retryable(&self) -> bool {
        match self {
            // Network errors are generally retryable
            blockvault_core::Error::Io(_) => true,
            // Backend errors might be retryable (rate limits, temporary failures)
            blockvault_core::Error::Backend(msg) => {
                // Retry on common transient errors
                msg.contains("timeout")
                    || msg.contains("rate limit")
                    || msg.contains("throttle")
                    || msg.contains("temporarily unavailable")
                    || msg.contains("try again")
                    || msg.contains("503")
                    || msg.contains("429")
            }
            // Integrity and configuration errors won't fix themselves
            _ => false,
        }
    }
}

/// Retry a future operation with exponential backoff
pub async fn retry_with_backoff<F, Fut, T, E>(
    config: &RetryConfig,
    operation_name: &str,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable + std::fmt::Display,
{
    let mut last_error = None;

    for attempt in 0..config.max_attempts {
        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    debug!(
                        operation = operation_name,
                        attempt = attempt + 1,
                        "Operation succeeded after retry"
                    );
                }
                return Ok(result);
            }
            Err(error) => {
                if !error.is_retryable() {
                    debug!(
                        operation = operation_name,
                        error = %error,
                        "Error is not retryable, failing immediately"
                    );
                    return Err(error);
                }

                last_error = Some(error);

                // Don't sleep after the last attempt
                if attempt < config.max_attempts - 1 {
                    let backoff = config.backoff_duration(attempt);
                    warn!(
                        operation = operation_name,
                        attempt = attempt + 1,
                        max_attempts = config.max_attempts,
                        backoff_ms = backoff.as_millis(),
                        error = %last_error.as_ref().unwrap(),
                        "Operation failed, retrying after backoff"
                    );
                    sleep(backoff).await;
                }
            }
        }
    }

    // All attempts exhausted
    let error = last_error.expect("Should have at least one error");
    warn!(
        operation = operation_name,
        max_attempts = config.max_attempts,
        error = %error,
        "Operation failed after all retry attempts"
    );
    Err(error)
}
