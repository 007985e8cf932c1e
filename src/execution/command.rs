//! Shell command task.
//!
//! [`CommandTask`] runs one command on every configured connection. An
//! attempt that fails on some connections is retried with an advanced scope
//! that lists only the failed connections, so a target that already
//! succeeded is not run again.
//!
//! Each connection goes through prepare, connect, execute and disconnect
//! inside its own attempt window. Disconnect is always called.
//!
//! ```ignore
//! use crontab::{CommandTask, RetryPolicy, TaskConfig};
//! use std::time::Duration;
//!
//! let task = CommandTask::builder(TaskConfig {
//!     command: Some("pg_dump app > /backup/app.sql".into()),
//!     ..TaskConfig::default()
//! })
//! .retry_policy(RetryPolicy::linear(2, Duration::from_secs(5)))
//! .timeout(Duration::from_secs(300))
//! .build();
//! ```

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use super::connection::{self, ConnectionError};
use super::shell::CommandContext;
use crate::config::{TaskConfig, TaskConnection};
use crate::core::hooked::Hooked;
use crate::core::retry::RetryPolicy;
use crate::core::scope::ExecutionScope;
use crate::core::task::{Task, TaskError};
use crate::core::timeout::{Cancelable, Timeout};
use crate::core::types::TaskId;
use crate::global::GlobalState;

/// Counter bumped once per started attempt of a task.
pub const TASK_ATTEMPTS_COUNTER: &str = "task_attempts";

/// A task that runs a shell command on one or more connections.
pub struct CommandTask {
    id: TaskId,
    config: TaskConfig,
    connections: Vec<TaskConnection>,
    retry_policy: RetryPolicy,
    timeout: Timeout,
    cancel: Cancelable,
    hooks: Hooked,
    state: Arc<GlobalState>,
}

impl CommandTask {
    /// Create a new builder for a command task.
    pub fn builder(config: TaskConfig) -> CommandTaskBuilder {
        CommandTaskBuilder::new(config)
    }

    /// Connections targeted by the first attempt.
    pub fn connections(&self) -> &[TaskConnection] {
        &self.connections
    }

    /// Per-attempt timeout.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout.duration()
    }

    async fn run_on(&self, index: usize, scope: &ExecutionScope) -> Result<(), TaskError> {
        let spec = &self.connections[index];
        let mut conn = connection::build(spec).ok_or_else(|| {
            ConnectionError::Prepare("cannot compile given task connection".to_string())
        })?;
        let kind = conn.kind();

        let attempt = self.timeout.apply(scope.cancellation());
        self.cancel.set(attempt.token().clone());
        let ctx = CommandContext::build(&self.config, scope.event(), self.state.shell());

        let result = attempt
            .run(async {
                conn.prepare(&ctx).await?;
                conn.connect().await?;
                conn.execute().await
            })
            .await;

        if let Err(e) = conn.disconnect().await {
            tracing::warn!(task = %self.id, connection = kind, error = %e, "error when tried to disconnect");
            return Err(e.into());
        }

        match result {
            Ok(output) => {
                for line in String::from_utf8_lossy(&output).lines() {
                    tracing::info!(task = %self.id, connection = kind, "{}", line);
                }
                Ok(())
            }
            Err(e) => {
                tracing::warn!(task = %self.id, connection = kind, error = %e, "command failed");
                Err(e)
            }
        }
    }
}

#[async_trait]
impl Task for CommandTask {
    fn id(&self) -> &TaskId {
        &self.id
    }

    async fn execute(&self, scope: ExecutionScope) -> Result<(), TaskError> {
        let mut scope = scope;
        loop {
            let attempt = scope.retries();
            if let Err(e) = self.retry_policy.wait_for_retry(&scope).await {
                tracing::warn!(task = %self.id, attempt, error = %e, "giving up on command");
                self.hooks.do_fail_hooks(&scope).await;
                return Err(e);
            }

            let mut labels = vec![("task", self.id.as_str())];
            if let Some(job) = scope.job() {
                labels.push(("job", job.as_str()));
            }
            self.state
                .counters()
                .increment(TASK_ATTEMPTS_COUNTER, labels, 1);

            let targets: Vec<usize> = match scope.failed_connections() {
                Some(failed) if !failed.is_empty() => failed.to_vec(),
                _ => (0..self.connections.len()).collect(),
            };
            tracing::debug!(task = %self.id, attempt, connections = targets.len(), "running command");

            let next = scope.increase_retry();
            let mut failed = Vec::new();
            for index in targets {
                if self.run_on(index, &next).await.is_err() {
                    failed.push(index);
                }
            }

            if failed.is_empty() {
                break;
            }
            tracing::debug!(task = %self.id, attempt, failed = failed.len(), "connections failed, retrying");
            scope = next.with_failed_connections(failed);
        }

        if !self.hooks.do_done_hooks(&scope).await.is_empty() {
            tracing::warn!(task = %self.id, "command finished successfully but its hooks failed");
        }
        Ok(())
    }

    fn cancel(&self) {
        tracing::debug!(task = %self.id, "canceling command");
        self.cancel.cancel();
    }

    fn retry_policy(&self) -> RetryPolicy {
        self.retry_policy.clone()
    }
}

impl std::fmt::Debug for CommandTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandTask")
            .field("id", &self.id)
            .field("connections", &self.connections.len())
            .field("retry_policy", &self.retry_policy)
            .field("timeout", &self.timeout)
            .field("hooks", &self.hooks)
            .finish()
    }
}

/// Builder for creating `CommandTask` instances.
pub struct CommandTaskBuilder {
    config: TaskConfig,
    retry_policy: RetryPolicy,
    timeout: Option<Duration>,
    hooks: Option<Hooked>,
    state: Option<Arc<GlobalState>>,
}

impl CommandTaskBuilder {
    /// Start from a task configuration; retry and timeout are taken from it.
    pub fn new(config: TaskConfig) -> Self {
        let retry_policy =
            RetryPolicy::linear(config.retries, config.retry_delay.unwrap_or_default());
        let timeout = config.timeout;
        Self {
            config,
            retry_policy,
            timeout,
            hooks: None,
            state: None,
        }
    }

    /// Set the retry policy.
    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Set the per-attempt timeout.
    pub fn timeout(mut self, duration: Duration) -> Self {
        self.timeout = Some(duration);
        self
    }

    /// Set the done and fail hooks.
    pub fn hooks(mut self, hooks: Hooked) -> Self {
        self.hooks = Some(hooks);
        self
    }

    /// Share process-wide state.
    pub fn state(mut self, state: Arc<GlobalState>) -> Self {
        self.state = Some(state);
        self
    }

    /// Build the `CommandTask`.
    pub fn build(self) -> CommandTask {
        let id = self.config.id();
        let state = self.state.unwrap_or_else(|| Arc::new(GlobalState::new()));
        let connections = if self.config.connections.is_empty() {
            tracing::debug!(task = %id, "no explicit connection provided, using local connection");
            vec![TaskConnection::local()]
        } else {
            self.config.connections.clone()
        };
        let hooks = self
            .hooks
            .unwrap_or_else(|| Hooked::new(id.clone(), Arc::clone(&state)));

        CommandTask {
            id,
            config: self.config,
            connections,
            retry_policy: self.retry_policy,
            timeout: Timeout::new(self.timeout),
            cancel: Cancelable::new(),
            hooks,
            state,
        }
    }
}
