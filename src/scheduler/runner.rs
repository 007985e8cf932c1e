//! Job runner: one dispatch loop per enabled job.
//!
//! [`JobRunner::start`] builds every job's generators, merges their streams
//! and spawns a loop that hands each trigger to a fresh task chain. Chains
//! of one job overlap up to the job's concurrency limit; the limit is
//! enforced by the job's pool inside [`Job::run_chain`].

use futures::StreamExt;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::JobConfig;
use crate::core::job::{Job, JobError};
use crate::core::types::JobId;
use crate::events::{self, EventInput, EventStream};
use crate::global::GlobalState;

/// Counter bumped for every trigger notification a job receives.
pub const EVENTS_COUNTER: &str = "events";

struct Entry {
    job: Arc<Job>,
    config: JobConfig,
}

/// Owns the compiled jobs until they are started.
pub struct JobRunner {
    state: Arc<GlobalState>,
    shutdown: CancellationToken,
    entries: Vec<Entry>,
}

impl JobRunner {
    /// Create a runner with no jobs.
    pub fn new(state: Arc<GlobalState>) -> Self {
        Self {
            state,
            shutdown: CancellationToken::new(),
            entries: Vec::new(),
        }
    }

    /// Use an externally owned shutdown token.
    pub fn with_shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    /// Compile and register `config`.
    ///
    /// Disabled jobs are skipped and reported as `Ok(false)`.
    pub fn add(&mut self, config: &JobConfig) -> Result<bool, JobError> {
        if config.disabled {
            tracing::info!(job = %config.name, "job is disabled");
            return Ok(false);
        }
        let job = Job::compile(config, &self.state)?;
        tracing::debug!(job = %config.name, ?job, "job compiled");
        self.entries.push(Entry {
            job: Arc::new(job),
            config: config.clone(),
        });
        Ok(true)
    }

    /// Compile and register every job in `configs`.
    pub fn add_all<'a>(
        &mut self,
        configs: impl IntoIterator<Item = &'a JobConfig>,
    ) -> Result<usize, JobError> {
        let mut added = 0;
        for config in configs {
            if self.add(config)? {
                added += 1;
            }
        }
        Ok(added)
    }

    /// Number of registered jobs.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no jobs are registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Build the trigger streams and spawn one dispatch loop per job.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(self) -> RunnerHandle {
        let mut loops = Vec::with_capacity(self.entries.len());
        for entry in self.entries {
            let stream = triggers(&entry.config, &self.state);
            loops.push(tokio::spawn(dispatch(
                entry.job,
                stream,
                Arc::clone(&self.state),
                self.shutdown.clone(),
            )));
        }
        tracing::info!(jobs = loops.len(), "job runner started");
        RunnerHandle {
            shutdown: self.shutdown,
            loops,
        }
    }
}

impl std::fmt::Debug for JobRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobRunner")
            .field("jobs", &self.entries.len())
            .field("shutdown", &self.shutdown.is_cancelled())
            .finish()
    }
}

fn triggers(config: &JobConfig, state: &Arc<GlobalState>) -> EventStream {
    let streams = config
        .events
        .iter()
        .filter_map(|event| {
            events::build(&EventInput {
                config: event.clone(),
                state: Arc::clone(state),
                job: JobId::new(config.name.clone()),
            })
        })
        .map(|mut generator| generator.build_tick_channel())
        .collect();
    events::merge(streams)
}

async fn dispatch(
    job: Arc<Job>,
    mut stream: EventStream,
    state: Arc<GlobalState>,
    shutdown: CancellationToken,
) {
    tracing::debug!(job = %job.id(), "dispatch loop started");
    loop {
        let event = tokio::select! {
            _ = shutdown.cancelled() => break,
            event = stream.next() => match event {
                Some(event) => event,
                None => {
                    tracing::info!(job = %job.id(), "all event sources finished");
                    break;
                }
            },
        };

        state
            .counters()
            .increment(EVENTS_COUNTER, [("job", job.id().as_str())], 1);
        tracing::debug!(job = %job.id(), emitter = event.emitter(), "received event");

        let job = Arc::clone(&job);
        let parent = shutdown.clone();
        tokio::spawn(async move {
            let failures = job.run_chain(event, &parent).await;
            if failures > 0 {
                tracing::warn!(job = %job.id(), failures, "task chain finished with failures");
            } else {
                tracing::debug!(job = %job.id(), "task chain finished");
            }
        });
    }
}

/// Handle to the running dispatch loops.
#[derive(Debug)]
pub struct RunnerHandle {
    shutdown: CancellationToken,
    loops: Vec<JoinHandle<()>>,
}

impl RunnerHandle {
    /// Stop accepting triggers and cancel in-flight attempts.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Token cancelled by [`RunnerHandle::shutdown`].
    pub fn token(&self) -> &CancellationToken {
        &self.shutdown
    }

    /// Wait until every dispatch loop has ended.
    pub async fn join(self) {
        for handle in self.loops {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "dispatch loop panicked");
            }
        }
    }
}
