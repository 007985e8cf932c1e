//! Scheduling: the shared cron engine and the per-job dispatch loops.
//!
//! The [`CronEngine`] is the single timer loop behind every cron generator.
//! The [`JobRunner`] turns compiled jobs into running dispatch loops.

mod engine;
mod runner;

pub use engine::{CronEngine, EntryId};
pub use runner::{EVENTS_COUNTER, JobRunner, RunnerHandle};
