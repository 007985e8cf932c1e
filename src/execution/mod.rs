//! Task execution engine.
//!
//! Task configurations are compiled once, at job initialisation, into
//! [`Task`] objects through the first-match [`TASK_REGISTRY`]. Hooks are
//! compiled recursively through the same path. Command tasks run on
//! [`connection`]s resolved per attempt.

mod command;
pub mod connection;
pub mod credential;
pub mod docker_client;
mod http;
pub mod shell;

pub use command::{CommandTask, CommandTaskBuilder, TASK_ATTEMPTS_COUNTER};
pub use connection::{Connection, ConnectionError};
pub use http::{HttpMethod, HttpTask};

use std::sync::{Arc, LazyLock};

use crate::config::TaskConfig;
use crate::core::hooked::Hooked;
use crate::core::job::JobError;
use crate::core::registry::Registry;
use crate::core::task::Task;
use crate::core::types::JobId;
use crate::global::GlobalState;

/// Input handed to every task factory: the configuration plus its already
/// compiled hooks.
#[derive(Clone)]
pub struct TaskInput {
    /// Task configuration.
    pub config: TaskConfig,
    /// Owning job, for logging.
    pub job: Option<JobId>,
    /// Process-wide state.
    pub state: Arc<GlobalState>,
    /// Compiled `on-done` hooks.
    pub on_done: Vec<Arc<dyn Task>>,
    /// Compiled `on-fail` hooks.
    pub on_fail: Vec<Arc<dyn Task>>,
}

impl TaskInput {
    fn hooks(&self) -> Hooked {
        Hooked::new(self.config.id(), Arc::clone(&self.state))
            .with_done(self.on_done.clone())
            .with_fail(self.on_fail.clone())
    }
}

/// Registry selecting a task kind from its configuration.
pub type TaskRegistry = Registry<TaskInput, Arc<dyn Task>>;

/// Built-in task kinds in match order: command, get, post.
pub static TASK_REGISTRY: LazyLock<TaskRegistry> = LazyLock::new(|| {
    Registry::new()
        .with(|input: &TaskInput| {
            input.config.command.as_deref().filter(|c| !c.is_empty())?;
            let task = CommandTask::builder(input.config.clone())
                .hooks(input.hooks())
                .state(Arc::clone(&input.state))
                .build();
            Some(Arc::new(task) as Arc<dyn Task>)
        })
        .with(|input: &TaskInput| {
            input.config.get.as_deref().filter(|g| !g.is_empty())?;
            HttpTask::from_config(&input.config, input.hooks(), Arc::clone(&input.state))
                .map(|t| Arc::new(t) as Arc<dyn Task>)
        })
        .with(|input: &TaskInput| {
            input.config.post.as_deref().filter(|p| !p.is_empty())?;
            HttpTask::from_config(&input.config, input.hooks(), Arc::clone(&input.state))
                .map(|t| Arc::new(t) as Arc<dyn Task>)
        })
});

/// Compile `config` and, recursively, its hooks.
///
/// Hooks are not checked for cycles.
pub fn compile_task(
    config: &TaskConfig,
    job: Option<&JobId>,
    state: &Arc<GlobalState>,
) -> Result<Arc<dyn Task>, JobError> {
    let compile_all = |hooks: &[TaskConfig]| {
        hooks
            .iter()
            .map(|hook| compile_task(hook, job, state))
            .collect::<Result<Vec<_>, _>>()
    };

    for spec in &config.connections {
        if connection::build(spec).is_none() {
            return Err(JobError::UnknownConnection(format!("{:?}", spec)));
        }
    }

    let input = TaskInput {
        config: config.clone(),
        job: job.cloned(),
        state: Arc::clone(state),
        on_done: compile_all(&config.on_done)?,
        on_fail: compile_all(&config.on_fail)?,
    };

    TASK_REGISTRY.get(&input).ok_or_else(|| {
        tracing::error!(?job, task = %config.id(), "did not receive any executable action from given task");
        JobError::UnknownTaskKind(config.id().to_string())
    })
}
