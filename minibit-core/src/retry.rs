//! Bounded retry with a fixed delay between attempts.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

/// Fixed-delay retry policy with a finite number of attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub attempts: u32,
    /// Pause between consecutive attempts
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(attempts: u32, delay: Duration) -> Self {
        Self { attempts, delay }
    }

    /// Runs `operation` until it succeeds or the attempts are exhausted.
    ///
    /// A policy with zero attempts still runs the operation once. Every
    /// failure is logged with the attempt counter.
    ///
    /// # Errors
    ///
    /// Returns the error of the last attempt when every attempt failed.
    pub async fn run<T, E, F, Fut>(&self, description: &str, mut operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let attempts = self.attempts.max(1);
        let mut attempt = 1;

        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < attempts => {
                    tracing::warn!(
                        "{} failed: {}. Retrying ({}/{})",
                        description,
                        e,
                        attempt,
                        attempts
                    );
                    attempt += 1;
                    tokio::time::sleep(self.delay).await;
                }
                Err(e) => {
                    tracing::warn!("{} failed after {} attempts: {}", description, attempts, e);
                    return Err(e);
                }
            }
        }
    }
}
