//! Process-wide state.
//!
//! [`GlobalState`] is created once at startup and shared as an
//! `Arc<GlobalState>` with the job runner, the event generators and the HTTP
//! surface. It owns the web-event listener map, the metric counters, the
//! shared cron engine and the default shell used by command tasks.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use crate::scheduler::CronEngine;

/// Prefix of every exported metric name.
pub const METRICS_NAMESPACE: &str = "crontab_go";

/// Callback invoked when a web event is dispatched.
pub type Listener = Arc<dyn Fn() + Send + Sync>;

/// Shell used to run commands when a task does not override it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellDefaults {
    /// Shell executable.
    pub shell: String,
    /// Arguments placed before the command, `:`-separated with `\:` escapes.
    pub shell_args: String,
}

impl Default for ShellDefaults {
    fn default() -> Self {
        Self {
            shell: "/bin/sh".to_string(),
            shell_args: "-c".to_string(),
        }
    }
}

/// Identity of a counter: metric name plus sorted labels.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CounterKey {
    name: String,
    labels: BTreeMap<String, String>,
}

impl CounterKey {
    /// Build a key from a name and label pairs.
    pub fn new<'a>(name: &str, labels: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        Self {
            name: name.to_string(),
            labels: labels
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    /// Metric name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Metric labels.
    pub fn labels(&self) -> &BTreeMap<String, String> {
        &self.labels
    }
}

impl fmt::Display for CounterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        for (k, v) in &self.labels {
            write!(f, ",{}={}", k, v)?;
        }
        Ok(())
    }
}

/// Guarded map of monotonically increasing counters.
///
/// Every increment is also forwarded to the [`metrics`] facade so an
/// installed Prometheus recorder can expose it.
#[derive(Debug, Default)]
pub struct MetricCounters {
    values: Mutex<HashMap<CounterKey, u64>>,
}

impl MetricCounters {
    /// Add `by` to the counter identified by `name` and `labels`.
    pub fn increment<'a>(
        &self,
        name: &str,
        labels: impl IntoIterator<Item = (&'a str, &'a str)>,
        by: u64,
    ) {
        let key = CounterKey::new(name, labels);
        let exported: Vec<metrics::Label> = key
            .labels()
            .iter()
            .map(|(k, v)| metrics::Label::new(k.clone(), v.clone()))
            .collect();
        metrics::counter!(format!("{}_{}", METRICS_NAMESPACE, name), exported).increment(by);

        let mut values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        *values.entry(key).or_insert(0) += by;
    }

    /// Current value of a counter, zero if it was never incremented.
    pub fn get<'a>(&self, name: &str, labels: impl IntoIterator<Item = (&'a str, &'a str)>) -> u64 {
        let key = CounterKey::new(name, labels);
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
            .copied()
            .unwrap_or(0)
    }

    /// Snapshot of every counter, sorted by key.
    pub fn snapshot(&self) -> Vec<(CounterKey, u64)> {
        let mut all: Vec<_> = self
            .values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect();
        all.sort();
        all
    }
}

/// Process-wide state shared by every job.
pub struct GlobalState {
    listeners: RwLock<HashMap<String, Vec<Listener>>>,
    counters: MetricCounters,
    cron: CronEngine,
    shell: ShellDefaults,
}

impl GlobalState {
    /// Create the state with the default shell.
    pub fn new() -> Self {
        Self::with_shell(ShellDefaults::default())
    }

    /// Create the state with an explicit default shell.
    pub fn with_shell(shell: ShellDefaults) -> Self {
        Self {
            listeners: RwLock::new(HashMap::new()),
            counters: MetricCounters::default(),
            cron: CronEngine::new(),
            shell,
        }
    }

    /// Register a listener for the web event `event`.
    pub fn add_event_listener(&self, event: impl Into<String>, listener: Listener) {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(event.into())
            .or_default()
            .push(listener);
    }

    /// Listeners registered for `event`.
    pub fn event_listeners(&self, event: &str) -> Vec<Listener> {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(event)
            .cloned()
            .unwrap_or_default()
    }

    /// Names of every event with at least one listener.
    pub fn event_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// Metric counters.
    pub fn counters(&self) -> &MetricCounters {
        &self.counters
    }

    /// Cron engine shared by every cron generator.
    pub fn cron_engine(&self) -> &CronEngine {
        &self.cron
    }

    /// Default shell for command tasks.
    pub fn shell(&self) -> &ShellDefaults {
        &self.shell
    }
}

impl Default for GlobalState {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for GlobalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GlobalState")
            .field("events", &self.event_names())
            .field("shell", &self.shell)
            .finish_non_exhaustive()
    }
}
