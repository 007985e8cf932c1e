//! Done/fail hook lists attached to a task.
//!
//! Hooks run sequentially in configured order. A failing hook is logged and
//! collected; it never stops its siblings and never changes the result of the
//! task that triggered it.

use std::sync::Arc;

use super::scope::ExecutionScope;
use super::task::{Task, TaskError};
use super::types::TaskId;
use crate::global::GlobalState;

/// Counter bumped every time the done hooks of a task run.
pub const DONE_HOOKS_COUNTER: &str = "done_hooks";
/// Counter bumped every time the fail hooks of a task run.
pub const FAIL_HOOKS_COUNTER: &str = "fail_hooks";

/// Compiled done and fail hooks of one task, plus the counter identity.
pub struct Hooked {
    task: TaskId,
    done: Vec<Arc<dyn Task>>,
    fail: Vec<Arc<dyn Task>>,
    state: Arc<GlobalState>,
}

impl Hooked {
    /// Create an empty hook set for `task`.
    pub fn new(task: TaskId, state: Arc<GlobalState>) -> Self {
        Self {
            task,
            done: Vec::new(),
            fail: Vec::new(),
            state,
        }
    }

    /// Builder: set the hooks that run after success.
    pub fn with_done(mut self, hooks: Vec<Arc<dyn Task>>) -> Self {
        self.done = hooks;
        self
    }

    /// Builder: set the hooks that run after failure.
    pub fn with_fail(mut self, hooks: Vec<Arc<dyn Task>>) -> Self {
        self.fail = hooks;
        self
    }

    /// Hooks run after success.
    pub fn done_hooks(&self) -> &[Arc<dyn Task>] {
        &self.done
    }

    /// Hooks run after failure.
    pub fn fail_hooks(&self) -> &[Arc<dyn Task>] {
        &self.fail
    }

    /// Run every done hook and return the errors they produced.
    pub async fn do_done_hooks(&self, scope: &ExecutionScope) -> Vec<TaskError> {
        self.run(DONE_HOOKS_COUNTER, &self.done, scope).await
    }

    /// Run every fail hook and return the errors they produced.
    pub async fn do_fail_hooks(&self, scope: &ExecutionScope) -> Vec<TaskError> {
        self.run(FAIL_HOOKS_COUNTER, &self.fail, scope).await
    }

    async fn run(
        &self,
        counter: &str,
        hooks: &[Arc<dyn Task>],
        scope: &ExecutionScope,
    ) -> Vec<TaskError> {
        let mut labels = vec![("task", self.task.as_str())];
        if let Some(job) = scope.job() {
            labels.push(("job", job.as_str()));
        }
        self.state.counters().increment(counter, labels, 1);

        let mut errors = Vec::new();
        for hook in hooks {
            if let Err(e) = hook.execute(scope.for_hook()).await {
                tracing::error!(
                    task = %self.task,
                    hook = %hook.id(),
                    kind = counter,
                    error = %e,
                    "hook failed"
                );
                errors.push(e);
            }
        }
        errors
    }
}

impl std::fmt::Debug for Hooked {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hooked")
            .field("task", &self.task)
            .field("done", &self.done.len())
            .field("fail", &self.fail.len())
            .finish()
    }
}
