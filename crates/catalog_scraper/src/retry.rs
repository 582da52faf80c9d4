//! Bounded retry with exponential backoff and jitter.

use crate::config::RetryPolicy;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Errors that know whether trying again could help.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

impl Retryable for crate::catalog::ScrapeError {
    fn is_retryable(&self) -> bool {
        crate::catalog::ScrapeError::is_retryable(self)
    }
}

impl Retryable for crate::db::StorageError {
    fn is_retryable(&self) -> bool {
        crate::db::StorageError::is_retryable(self)
    }
}

impl RetryPolicy {
    /// Calculates the delay before retry `attempt` (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        // Exponential backoff: base * 2^min(attempt-1, 5)
        let exponential = self
            .base_delay_ms
            .saturating_mul(2u64.pow(attempt.saturating_sub(1).min(5)));
        let capped = exponential.min(self.max_delay_ms);
        // Add jitter: 0-20% of the delay
        let jitter = rand::thread_rng().gen_range(0..=(capped / 5));
        Duration::from_millis(capped + jitter)
    }

    /// Runs `op` until it succeeds, fails with a non-retryable error, or
    /// `retries` extra attempts are used up.
    pub async fn run<T, E, F, Fut>(&self, what: &str, retries: u32, mut op: F) -> Result<T, E>
    where
        E: Retryable + std::fmt::Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempt = 0u32;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < retries && e.is_retryable() => {
                    attempt += 1;
                    let delay = self.delay(attempt);
                    warn!(
                        what = %what,
                        attempt = attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Retrying after failure"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
