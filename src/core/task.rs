//! Task trait and error types.
//!
//! A [`Task`] is a compiled, reusable executable: it is built once when a job
//! is initialised and invoked on every trigger. Retry state never lives on the
//! task itself; it travels through the [`ExecutionScope`] passed to
//! [`Task::execute`].

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use super::retry::RetryPolicy;
use super::scope::ExecutionScope;
use super::types::TaskId;
use crate::execution::ConnectionError;

/// Errors that can occur during task execution.
#[derive(Debug, Error)]
pub enum TaskError {
    /// Task execution failed with a message.
    #[error("execution failed: {0}")]
    ExecutionFailed(String),

    /// The attempt hit its deadline.
    #[error("task timed out after {0:?}")]
    Timeout(Duration),

    /// The attempt was cancelled from outside.
    #[error("task was cancelled")]
    Cancelled,

    /// HTTP transport or request construction failure.
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// HTTP response with a status code of 400 or above.
    #[error("http request to {url} answered with status {status}")]
    HttpStatus { status: u16, url: String },

    /// Every allowed attempt has been used.
    #[error("max retries exceeded (retries: {0})")]
    MaxRetriesExceeded(u32),

    /// A connection step failed.
    #[error(transparent)]
    Connection(#[from] ConnectionError),

}

/// A compiled executable unit: a command, an HTTP call, or a test double.
///
/// # Example
///
/// ```ignore
/// use crontab::{ExecutionScope, Task, TaskError, TaskId};
/// use async_trait::async_trait;
///
/// struct Noop(TaskId);
///
/// #[async_trait]
/// impl Task for Noop {
///     fn id(&self) -> &TaskId {
///         &self.0
///     }
///
///     async fn execute(&self, _scope: ExecutionScope) -> Result<(), TaskError> {
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Task: Send + Sync {
    /// Identity used for logging and metric labels.
    fn id(&self) -> &TaskId;

    /// Run the task, including its own retries and hooks.
    async fn execute(&self, scope: ExecutionScope) -> Result<(), TaskError>;

    /// Abort the in-flight attempt, if any.
    fn cancel(&self) {}

    /// Retry policy applied by [`Task::execute`].
    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::event_data::EventData;

    struct EchoRetries {
        id: TaskId,
    }

    #[async_trait]
    impl Task for EchoRetries {
        fn id(&self) -> &TaskId {
            &self.id
        }

        async fn execute(&self, scope: ExecutionScope) -> Result<(), TaskError> {
            if scope.retries() == 0 {
                Ok(())
            } else {
                Err(TaskError::ExecutionFailed(format!("retry {}", scope.retries())))
            }
        }
    }

    #[tokio::test]
    async fn test_task_reads_scope() {
        let task = EchoRetries {
            id: TaskId::new("echo"),
        };
        let scope = ExecutionScope::new(EventData::new("init"));

        assert!(task.execute(scope.clone()).await.is_ok());
        let err = task.execute(scope.increase_retry()).await.unwrap_err();
        assert_eq!(err.to_string(), "execution failed: retry 1");
        assert_eq!(task.retry_policy(), RetryPolicy::none());
    }

    #[test]
    fn test_error_messages() {
        let err = TaskError::from(ConnectionError::Exited {
            code: 1,
            output: "boom".into(),
        });
        assert!(err.to_string().contains("boom"));

        let err = TaskError::HttpStatus {
            status: 503,
            url: "http://localhost/health".into(),
        };
        assert!(err.to_string().contains("503"));
    }
}
