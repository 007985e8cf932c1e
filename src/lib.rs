pub mod api;
pub mod config;
pub mod core;
pub mod events;
pub mod execution;
pub mod global;
pub mod scheduler;
pub mod template;
pub mod testing;

pub use config::{Config, ConfigError, JobConfig, JobEvent, TaskConfig, TaskConnection, YamlLoader};
pub use crate::core::concurrency::{ConcurrentPool, PoolError};
pub use crate::core::event_data::EventData;
pub use crate::core::job::{Job, JobError};
pub use crate::core::registry::Registry;
pub use crate::core::retry::RetryPolicy;
pub use crate::core::scope::ExecutionScope;
pub use crate::core::task::{Task, TaskError};
pub use crate::core::types::{JobId, RunId, TaskId};
pub use events::{EventGenerator, EventStream};
pub use execution::{CommandTask, CommandTaskBuilder, HttpMethod, HttpTask, compile_task};
pub use global::{GlobalState, ShellDefaults};
pub use scheduler::{CronEngine, JobRunner, RunnerHandle};
