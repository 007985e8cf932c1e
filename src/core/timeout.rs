//! Per-attempt deadline and cancellation.
//!
//! [`Timeout::apply`] derives an [`AttemptScope`] from the execution scope's
//! cancellation token: a child token plus an optional deadline. Every retry
//! gets a fresh window. [`Cancelable`] keeps the token of the in-flight
//! attempt so [`Cancelable::cancel`] can abort it from outside.

use std::future::Future;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::task::TaskError;

/// Optional per-attempt timeout. `None` or zero means no deadline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Timeout(Option<Duration>);

impl Timeout {
    /// Build from a configured duration; zero disables the deadline.
    pub fn new(duration: Option<Duration>) -> Self {
        Self(duration.filter(|d| !d.is_zero()))
    }

    /// Configured deadline length.
    pub fn duration(&self) -> Option<Duration> {
        self.0
    }

    /// Derive the scope of one attempt.
    pub fn apply(&self, parent: &CancellationToken) -> AttemptScope {
        AttemptScope {
            token: parent.child_token(),
            timeout: self.0,
            deadline: self.0.map(|d| Instant::now() + d),
        }
    }
}

/// Cancellation handle and optional deadline of one attempt.
#[derive(Debug, Clone)]
pub struct AttemptScope {
    token: CancellationToken,
    timeout: Option<Duration>,
    deadline: Option<Instant>,
}

impl AttemptScope {
    /// Cancellation token of this attempt.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Deadline of this attempt, if bounded.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Drive `fut` until it completes, the deadline passes or the attempt is
    /// cancelled. The future is dropped on timeout or cancellation.
    pub async fn run<F, T, E>(&self, fut: F) -> Result<T, TaskError>
    where
        F: Future<Output = Result<T, E>>,
        E: Into<TaskError>,
    {
        let deadline = async {
            match self.deadline {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            result = fut => result.map_err(Into::into),
            _ = deadline => {
                self.token.cancel();
                Err(TaskError::Timeout(self.timeout.unwrap_or_default()))
            }
            _ = self.token.cancelled() => Err(TaskError::Cancelled),
        }
    }
}

/// Holder of the in-flight attempt's cancellation token.
#[derive(Debug, Default)]
pub struct Cancelable {
    current: Mutex<Option<CancellationToken>>,
}

impl Cancelable {
    /// Create an empty holder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember the token of the attempt that is starting.
    pub fn set(&self, token: CancellationToken) {
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = Some(token);
    }

    /// Cancel the remembered attempt, if any.
    pub fn cancel(&self) {
        if let Some(token) = self
            .current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
        {
            token.cancel();
        }
    }
}
