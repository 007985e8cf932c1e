//! Testing utilities for users of the crontab library.
//!
//! - [`CountingTask`]: succeeds and counts how often it ran
//! - [`FailingTask`]: a task helper that fails N times then succeeds
//! - [`RecordingTask`]: keeps the event payload of every run

use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, PoisonError};

use crate::core::event_data::EventData;
use crate::core::retry::RetryPolicy;
use crate::core::scope::ExecutionScope;
use crate::core::task::{Task, TaskError};
use crate::core::types::TaskId;

/// A task that always succeeds and counts its executions.
///
/// ```
/// use crontab::testing::CountingTask;
///
/// let hook = CountingTask::new("notify");
/// assert_eq!(hook.count(), 0);
/// ```
#[derive(Debug)]
pub struct CountingTask {
    id: TaskId,
    count: AtomicU32,
}

impl CountingTask {
    /// Create a counter named `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: TaskId::new(name),
            count: AtomicU32::new(0),
        }
    }

    /// Number of executions so far.
    pub fn count(&self) -> u32 {
        self.count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Task for CountingTask {
    fn id(&self) -> &TaskId {
        &self.id
    }

    async fn execute(&self, _scope: ExecutionScope) -> Result<(), TaskError> {
        self.count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// A task that fails a fixed number of times, then succeeds.
///
/// ```
/// use crontab::testing::FailingTask;
///
/// // Fails 2 times, then succeeds on the 3rd call
/// let task = FailingTask::new("flaky_task", 2);
/// ```
#[derive(Debug)]
pub struct FailingTask {
    id: TaskId,
    state: Mutex<FailingTaskState>,
    error_message: String,
}

#[derive(Debug)]
struct FailingTaskState {
    failures_remaining: u32,
    call_count: u32,
}

impl FailingTask {
    /// Create a task that fails `fail_count` times then succeeds.
    pub fn new(name: impl Into<String>, fail_count: u32) -> Self {
        Self::with_error(name, fail_count, "intentional test failure")
    }

    /// Create a task that fails with a custom error message.
    pub fn with_error(name: impl Into<String>, fail_count: u32, message: impl Into<String>) -> Self {
        Self {
            id: TaskId::new(name),
            state: Mutex::new(FailingTaskState {
                failures_remaining: fail_count,
                call_count: 0,
            }),
            error_message: message.into(),
        }
    }

    /// Number of times this task has been called.
    pub fn call_count(&self) -> u32 {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .call_count
    }
}

#[async_trait]
impl Task for FailingTask {
    fn id(&self) -> &TaskId {
        &self.id
    }

    async fn execute(&self, _scope: ExecutionScope) -> Result<(), TaskError> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.call_count += 1;

        if state.failures_remaining > 0 {
            state.failures_remaining -= 1;
            Err(TaskError::ExecutionFailed(self.error_message.clone()))
        } else {
            Ok(())
        }
    }

    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::none()
    }
}

/// A task that stores the event of each run.
#[derive(Debug)]
pub struct RecordingTask {
    id: TaskId,
    seen: Mutex<Vec<EventData>>,
}

impl RecordingTask {
    /// Create a recorder named `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: TaskId::new(name),
            seen: Mutex::new(Vec::new()),
        }
    }

    /// Events received so far, oldest first.
    pub fn events(&self) -> Vec<EventData> {
        self.seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl Task for RecordingTask {
    fn id(&self) -> &TaskId {
        &self.id
    }

    async fn execute(&self, scope: ExecutionScope) -> Result<(), TaskError> {
        self.seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(scope.event().clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scope() -> ExecutionScope {
        ExecutionScope::new(EventData::new("init"))
    }

    #[tokio::test]
    async fn test_failing_task() {
        let task = FailingTask::new("flaky", 2);

        assert!(task.execute(scope()).await.is_err());
        assert!(task.execute(scope()).await.is_err());
        assert!(task.execute(scope()).await.is_ok());
        assert_eq!(task.call_count(), 3);
    }

    #[tokio::test]
    async fn test_counting_and_recording() {
        let counter = CountingTask::new("count");
        let recorder = RecordingTask::new("record");

        counter.execute(scope()).await.unwrap();
        counter.execute(scope()).await.unwrap();
        recorder
            .execute(ExecutionScope::new(EventData::new("web-event")))
            .await
            .unwrap();

        assert_eq!(counter.count(), 2);
        assert_eq!(recorder.events()[0].emitter(), "web-event");
    }
}
