//! Per-attempt execution scope.
//!
//! An [`ExecutionScope`] is threaded through every task invocation. It is
//! never mutated: advancing the retry counter or recording failed connections
//! produces a new scope, so concurrent firings of the same job never share
//! retry bookkeeping.

use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::event_data::EventData;
use super::types::{JobId, RunId};

/// Immutable carrier of retry count, failed connections and cancellation.
#[derive(Debug, Clone)]
pub struct ExecutionScope {
    job: Option<JobId>,
    run: RunId,
    event: Arc<EventData>,
    retries: u32,
    failed_connections: Option<Arc<[usize]>>,
    cancel: CancellationToken,
}

impl ExecutionScope {
    /// Root scope for one trigger notification.
    pub fn new(event: EventData) -> Self {
        Self {
            job: None,
            run: RunId::new(),
            event: Arc::new(event),
            retries: 0,
            failed_connections: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Builder: tag the scope with the owning job.
    pub fn with_job(mut self, job: JobId) -> Self {
        self.job = Some(job);
        self
    }

    /// Builder: derive cancellation from a parent token.
    pub fn with_parent(mut self, parent: &CancellationToken) -> Self {
        self.cancel = parent.child_token();
        self
    }

    /// Owning job, if any.
    pub fn job(&self) -> Option<&JobId> {
        self.job.as_ref()
    }

    /// Identifier of the task chain this scope belongs to.
    pub fn run(&self) -> RunId {
        self.run
    }

    /// Trigger payload.
    pub fn event(&self) -> &EventData {
        &self.event
    }

    /// Number of attempts already started.
    pub fn retries(&self) -> u32 {
        self.retries
    }

    /// Connections that failed on the previous attempt, as indices into the
    /// task's connection list. `None` before the first failure.
    pub fn failed_connections(&self) -> Option<&[usize]> {
        self.failed_connections.as_deref()
    }

    /// Cancellation handle of this scope.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// New scope with the attempt counter advanced by one.
    pub fn increase_retry(&self) -> Self {
        Self {
            retries: self.retries + 1,
            ..self.clone()
        }
    }

    /// New scope whose next attempt only targets `failed`.
    pub fn with_failed_connections(&self, failed: Vec<usize>) -> Self {
        Self {
            failed_connections: Some(failed.into()),
            ..self.clone()
        }
    }

    /// Scope handed to hooks: same job, event and cancellation, fresh retry
    /// bookkeeping.
    pub fn for_hook(&self) -> Self {
        Self {
            retries: 0,
            failed_connections: None,
            ..self.clone()
        }
    }
}
