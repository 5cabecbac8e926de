//! Backoff policy for relay calls.

use std::future::Future;

use backon::{ExponentialBuilder, Retryable};
use keyway_core::{BundlerError, classify_bundler};
use tokio::time::Duration;
use tracing::info;

/// Exponential backoff around the submit and poll sequence.
///
/// The first attempt runs immediately. Attempt `n` (1-based, after the first)
/// waits `base_delay * 2^(n - 1)`, capped at `max_delay`.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, the first one included.
    pub max_attempts: usize,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
    /// Decides whether a failed attempt is worth repeating.
    pub is_retryable: fn(&BundlerError) -> bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            is_retryable,
        }
    }
}

/// Retry only what the classifier marks retryable.
pub fn is_retryable(err: &BundlerError) -> bool {
    classify_bundler(err).retryable
}

impl RetryPolicy {
    /// Policy that runs the operation exactly once.
    pub fn none() -> Self {
        Self { max_attempts: 1, ..Self::default() }
    }

    fn backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(self.base_delay)
            .with_max_delay(self.max_delay)
            .with_factor(2.0)
            .with_max_times(self.max_attempts.saturating_sub(1))
    }

    /// Runs `operation` until it succeeds, fails with a non-retryable error,
    /// or the attempt budget is spent. The last error is returned as is.
    pub async fn run<T, F, Fut>(&self, operation: F) -> Result<T, BundlerError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, BundlerError>>,
    {
        let mut attempt = 1usize;
        operation
            .retry(self.backoff())
            .when(|err: &BundlerError| (self.is_retryable)(err))
            .notify(|err: &BundlerError, delay: Duration| {
                attempt += 1;
                info!(
                    attempt,
                    max_attempts = self.max_attempts,
                    delay = ?delay,
                    error = %err,
                    "retrying relay request"
                );
            })
            .await
    }
}
