//! Bounded retry of idempotent CMDB requests.
//!
//! List, PATCH and DELETE requests are safe to repeat. POST is not: a
//! create whose response was lost may already have happened, so creates go
//! straight to the API without this wrapper.

use super::backoff::FibonacciBackoff;
use crate::constants::{DEFAULT_BACKOFF_MAX_MS, DEFAULT_BACKOFF_START_MS, DEFAULT_RETRY_ATTEMPTS};
use crate::error::CmdbError;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    pub backoff_start: Duration,
    pub backoff_max: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_RETRY_ATTEMPTS,
            backoff_start: Duration::from_millis(DEFAULT_BACKOFF_START_MS),
            backoff_max: Duration::from_millis(DEFAULT_BACKOFF_MAX_MS),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    #[must_use]
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Run `request`, repeating it on transient errors until it succeeds,
    /// fails permanently, or the attempts run out.
    ///
    /// # Errors
    ///
    /// Returns the first permanent error, or the last transient one.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut request: F) -> Result<T, CmdbError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, CmdbError>>,
    {
        let mut backoff = FibonacciBackoff::new(self.backoff_start, self.backoff_max);
        let mut attempt = 1;
        loop {
            match request().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt < self.max_attempts => {
                    let delay = backoff.next_backoff();
                    warn!(
                        operation,
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %err,
                        "Transient CMDB error, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
