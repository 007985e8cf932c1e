//! Retry policy for tasks.
//!
//! Retries use linear backoff: the wait before retry `i` is `i × delay`.
//! The attempt counter is read from the [`ExecutionScope`]; the policy itself
//! holds no mutable state.

use std::time::Duration;

use super::scope::ExecutionScope;
use super::task::TaskError;

/// Retry policy for a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of retries, not including the initial attempt.
    /// `max_retries = 2` allows 3 attempts in total.
    pub max_retries: u32,

    /// Base delay; the wait before retry `i` is `i × delay`.
    pub delay: Duration,
}

impl RetryPolicy {
    /// Create a policy with no retries.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            delay: Duration::ZERO,
        }
    }

    /// Create a policy with linear backoff.
    ///
    /// # Arguments
    /// * `max_retries` - Maximum retries (not including the initial try)
    /// * `delay` - Base delay multiplied by the retry index
    pub fn linear(max_retries: u32, delay: Duration) -> Self {
        Self { max_retries, delay }
    }

    /// Check if retries are enabled.
    pub fn is_enabled(&self) -> bool {
        self.max_retries > 0
    }

    /// Delay before the attempt that follows `retries` started attempts.
    pub fn backoff(&self, retries: u32) -> Duration {
        self.delay.saturating_mul(retries)
    }

    /// Wait until the next attempt may start.
    ///
    /// Fails with [`TaskError::MaxRetriesExceeded`] once the scope's counter
    /// exceeds `max_retries`, and with [`TaskError::Cancelled`] if the scope
    /// is cancelled while sleeping.
    pub async fn wait_for_retry(&self, scope: &ExecutionScope) -> Result<(), TaskError> {
        let retries = scope.retries();
        if retries > self.max_retries {
            return Err(TaskError::MaxRetriesExceeded(self.max_retries));
        }

        let delay = self.backoff(retries);
        if delay.is_zero() {
            return Ok(());
        }

        tracing::debug!(retries, delay = ?delay, "waiting before retry");
        tokio::select! {
            _ = tokio::time::sleep(delay) => Ok(()),
            _ = scope.cancellation().cancelled() => Err(TaskError::Cancelled),
        }
    }
}

impl Default for RetryPolicy {
    /// Default policy: no retries.
    fn default() -> Self {
        Self::none()
    }
}
