//! Compiled job: concurrency pool, task chain and job level hooks.
//!
//! A [`Job`] is built once from its [`JobConfig`] and shared by every
//! trigger. [`Job::run_chain`] runs the tasks strictly in order while holding
//! one pool slot; the slot is released however the chain ends.

use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use super::concurrency::{ConcurrentPool, PoolError};
use super::event_data::EventData;
use super::scope::ExecutionScope;
use super::task::Task;
use super::types::JobId;
use crate::config::JobConfig;
use crate::execution::compile_task;
use crate::global::GlobalState;

/// Errors that can occur while initialising a job.
#[derive(Debug, Error)]
pub enum JobError {
    /// A task matched none of the registered kinds.
    #[error("did not receive any executable action from given task: `{0}`")]
    UnknownTaskKind(String),

    /// A connection matched none of the registered kinds.
    #[error("cannot compile given task connection: {0}")]
    UnknownConnection(String),

    /// The concurrency pool could not be created.
    #[error(transparent)]
    Pool(#[from] PoolError),

    /// Disabled jobs are never compiled.
    #[error("job is disabled: {0}")]
    Disabled(String),
}

/// A job ready to be triggered.
pub struct Job {
    id: JobId,
    pool: Arc<ConcurrentPool>,
    tasks: Vec<Arc<dyn Task>>,
    done_hooks: Vec<Arc<dyn Task>>,
    fail_hooks: Vec<Arc<dyn Task>>,
}

impl Job {
    /// Compile `config`: pool, tasks and hooks.
    pub fn compile(config: &JobConfig, state: &Arc<GlobalState>) -> Result<Self, JobError> {
        if config.disabled {
            return Err(JobError::Disabled(config.name.clone()));
        }
        let id = JobId::new(config.name.clone());
        let compile = |tasks: &[crate::config::TaskConfig]| {
            tasks
                .iter()
                .map(|t| compile_task(t, Some(&id), state))
                .collect::<Result<Vec<_>, _>>()
        };

        let tasks = compile(&config.tasks)?;
        tracing::trace!(job = %id, "compiled tasks");
        let done_hooks = compile(&config.hooks.done)?;
        let fail_hooks = compile(&config.hooks.failed)?;
        tracing::trace!(job = %id, "compiled hooks");

        Ok(Self {
            pool: Arc::new(ConcurrentPool::new(config.concurrency())?),
            id,
            tasks,
            done_hooks,
            fail_hooks,
        })
    }

    /// Job identifier.
    pub fn id(&self) -> &JobId {
        &self.id
    }

    /// Concurrency pool bounding simultaneous chains.
    pub fn pool(&self) -> &Arc<ConcurrentPool> {
        &self.pool
    }

    /// Number of tasks in the chain.
    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    /// Run the task chain for one trigger.
    ///
    /// Returns the number of failed tasks. Job hooks run after each task,
    /// `done` on success and `failed` on failure; their errors are logged.
    pub async fn run_chain(&self, event: EventData, parent: &CancellationToken) -> usize {
        let _permit = Arc::clone(&self.pool).acquire_owned().await;
        let scope = ExecutionScope::new(event)
            .with_job(self.id.clone())
            .with_parent(parent);
        tracing::debug!(job = %self.id, run = %scope.run(), "running task chain");

        let mut failures = 0;
        for task in &self.tasks {
            let hooks = match task.execute(scope.clone()).await {
                Ok(()) => &self.done_hooks,
                Err(e) => {
                    failures += 1;
                    tracing::error!(job = %self.id, task = %task.id(), error = %e, "task failed");
                    &self.fail_hooks
                }
            };
            for hook in hooks {
                if let Err(e) = hook.execute(scope.for_hook()).await {
                    tracing::warn!(job = %self.id, hook = %hook.id(), error = %e, "job hook failed");
                }
            }
        }
        failures
    }
}

impl std::fmt::Debug for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Job")
            .field("id", &self.id)
            .field("concurrency", &self.pool.capacity())
            .field("tasks", &self.tasks.len())
            .field("done_hooks", &self.done_hooks.len())
            .field("fail_hooks", &self.fail_hooks.len())
            .finish()
    }
}
