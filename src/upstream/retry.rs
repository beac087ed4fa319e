//! Timeout and bounded-backoff handling for upstream calls.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::config::PipelineConfig;
use crate::types::QuerysmithError;

/// Wraps upstream calls with a per-attempt timeout and bounded exponential
/// backoff for retryable failures.
///
/// Only errors classified by [`QuerysmithError::is_retryable`] are retried;
/// caller errors and data-integrity errors surface immediately. A timed-out
/// attempt is safe to retry because providers perform no partial writes.
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    timeout: Duration,
    max_retries: u32,
    base_delay: Duration,
}

impl RetryPolicy {
    pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(200);
    pub const MAX_DELAY: Duration = Duration::from_secs(5);

    pub fn new(timeout: Duration, max_retries: u32) -> Self {
        Self {
            timeout,
            max_retries,
            base_delay: Self::DEFAULT_BASE_DELAY,
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(
            Duration::from_millis(config.request_timeout_ms),
            config.max_retries,
        )
    }

    #[must_use]
    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Runs `op`, retrying transient failures up to `max_retries` times.
    pub async fn run<T, F, Fut>(
        &self,
        operation: &str,
        mut op: F,
    ) -> Result<T, QuerysmithError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, QuerysmithError>>,
    {
        let mut attempt = 0u32;
        loop {
            let outcome = match tokio::time::timeout(self.timeout, op()).await {
                Ok(result) => result,
                Err(_) => Err(QuerysmithError::UpstreamTimeout {
                    operation: operation.to_string(),
                    timeout_ms: self.timeout.as_millis() as u64,
                }),
            };

            match outcome {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt < self.max_retries => {
                    let delay = self.backoff_delay(attempt);
                    warn!(
                        operation,
                        attempt = attempt + 1,
                        max_retries = self.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "retrying upstream call"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn backoff_delay(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base_delay
            .saturating_mul(factor)
            .min(Self::MAX_DELAY)
    }
}
