// ABOUTME: Bounded exponential backoff for idempotent remote calls
// ABOUTME: Only errors classified as transient are retried, everything else surfaces immediately

use std::future::Future;
use std::time::Duration;

use crate::error::RunnerError;

/// Classifies errors as worth another attempt or not.
pub trait IsRetryable {
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for RunnerError {
    fn is_retryable(&self) -> bool {
        self.is_transient()
    }
}

/// Retry policy wrapped around a single labelled call.
///
/// `max_attempts` counts the first try, so the default of 3 means at most two
/// retries. The delay starts at `initial_delay` and is multiplied by `factor`
/// after every failed attempt.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub label: &'static str,
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub factor: f64,
}

impl RetryPolicy {
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            factor: 2.0,
        }
    }

    /// Delay slept after the given failed attempt (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        self.initial_delay.mul_f64(self.factor.powi(exponent))
    }

    pub async fn run<F, Fut, T, E>(&self, mut operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: IsRetryable + std::fmt::Display,
    {
        let mut attempt = 1;

        loop {
            match operation().await {
                Ok(result) => {
                    if attempt > 1 {
                        tracing::info!(
                            call = self.label,
                            attempts = attempt,
                            "Call succeeded after retry"
                        );
                    }
                    return Ok(result);
                }
                Err(e) if e.is_retryable() && attempt < self.max_attempts => {
                    let delay = self.delay_after(attempt);
                    tracing::warn!(
                        call = self.label,
                        error = %e,
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        "Call failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    if e.is_retryable() {
                        tracing::error!(
                            call = self.label,
                            error = %e,
                            attempts = attempt,
                            "Call failed after all retry attempts"
                        );
                    }
                    return Err(e);
                }
            }
        }
    }
}
