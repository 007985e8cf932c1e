//! YAML configuration model.
//!
//! Every key is kebab-case. Durations accept unit-suffixed strings (`1h30m`,
//! `250ms`) or a bare number of seconds.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::core::types::TaskId;

/// Root configuration document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Config {
    /// Minimum log level. `RUST_LOG` takes precedence when set.
    pub log_level: LogLevel,
    /// Log output format.
    pub log_format: LogFormat,
    /// Default shell for command tasks.
    pub shell: Option<String>,
    /// Default shell arguments, `:`-separated.
    pub shell_args: Option<String>,
    /// HTTP surface; absent means no web server.
    pub webserver: Option<WebServerConfig>,
    /// Job definitions.
    pub jobs: Vec<JobConfig>,
}

/// Log verbosity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
    Fatal,
    Panic,
}

impl LogLevel {
    /// Directive understood by `tracing_subscriber::EnvFilter`.
    pub fn as_directive(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error | LogLevel::Fatal | LogLevel::Panic => "error",
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human readable with colours.
    #[default]
    Ansi,
    /// Human readable without colours.
    Plain,
    /// One JSON object per line.
    Json,
}

/// HTTP surface configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct WebServerConfig {
    /// Address to bind to.
    #[serde(default = "default_address")]
    pub address: String,
    /// Port to bind to.
    pub port: u16,
    /// Basic auth user name.
    pub username: Option<String>,
    /// Basic auth password.
    pub password: Option<String>,
    /// Expose `/metrics`.
    #[serde(default)]
    pub metrics: bool,
}

fn default_address() -> String {
    "127.0.0.1".to_string()
}

impl WebServerConfig {
    /// Basic auth credentials when both halves are configured.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (&self.username, &self.password) {
            (Some(user), Some(pass)) if !user.is_empty() && !pass.is_empty() => {
                Some((user.as_str(), pass.as_str()))
            }
            _ => None,
        }
    }
}

/// One configured job.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct JobConfig {
    /// Unique job name.
    pub name: String,
    /// Optional description.
    #[serde(default)]
    pub description: Option<String>,
    /// Disabled jobs are neither validated nor started.
    #[serde(default)]
    pub disabled: bool,
    /// Maximum concurrent task chains. Defaults to 1.
    #[serde(default)]
    pub concurrency: Option<usize>,
    /// Triggers.
    #[serde(default)]
    pub events: Vec<JobEvent>,
    /// Tasks run in order on every trigger.
    #[serde(default)]
    pub tasks: Vec<TaskConfig>,
    /// Job level hooks.
    #[serde(default)]
    pub hooks: JobHooks,
}

impl JobConfig {
    /// Effective concurrency limit.
    pub fn concurrency(&self) -> usize {
        self.concurrency.unwrap_or(1)
    }
}

/// Job level done/fail hooks.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct JobHooks {
    /// Run after a task succeeds.
    pub done: Vec<TaskConfig>,
    /// Run after a task fails.
    pub failed: Vec<TaskConfig>,
}

/// Trigger specification. Exactly one variant field must be set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct JobEvent {
    /// Fire once at startup.
    pub on_init: bool,
    /// Fire every fixed duration.
    #[serde(with = "crate::core::duration::serde_opt_duration")]
    pub interval: Option<Duration>,
    /// Fire on a cron schedule.
    pub cron: Option<String>,
    /// Fire when the named web event is emitted.
    pub web_event: Option<String>,
    /// Fire on container runtime events.
    pub docker: Option<DockerEventConfig>,
    /// Fire on matching lines appended to this file.
    pub log_file: Option<String>,
    /// Line separator of the watched file. Defaults to `\n`.
    pub log_line_breaker: Option<String>,
    /// Regex a line must match. Defaults to `.`.
    pub log_matcher: Option<String>,
    /// Poll period of the watched file. Defaults to one second.
    #[serde(with = "crate::core::duration::serde_opt_duration")]
    pub log_check_cycle: Option<Duration>,
}

impl JobEvent {
    /// Names of the variant fields that are set.
    pub fn active_kinds(&self) -> Vec<&'static str> {
        let mut kinds = Vec::new();
        if self.on_init {
            kinds.push("on-init");
        }
        if self.interval.is_some() {
            kinds.push("interval");
        }
        if self.cron.as_deref().is_some_and(|c| !c.is_empty()) {
            kinds.push("cron");
        }
        if self.web_event.as_deref().is_some_and(|w| !w.is_empty()) {
            kinds.push("web-event");
        }
        if self.docker.is_some() {
            kinds.push("docker");
        }
        if self.log_file.as_deref().is_some_and(|f| !f.is_empty()) {
            kinds.push("log-file");
        }
        kinds
    }
}

impl fmt::Display for JobEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "(on-init: {}, interval: {:?}, cron: {:?}, web-event: {:?}, docker: {}, log-file: {:?})",
            self.on_init,
            self.interval,
            self.cron.as_deref().unwrap_or_default(),
            self.web_event.as_deref().unwrap_or_default(),
            self.docker.is_some(),
            self.log_file.as_deref().unwrap_or_default(),
        )
    }
}

/// Container runtime event filter.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct DockerEventConfig {
    /// Engine address. Defaults to the local unix socket.
    pub connection: Option<String>,
    /// Container name regex.
    pub name: Option<String>,
    /// Image regex.
    pub image: Option<String>,
    /// Accepted actions; empty accepts every action.
    pub actions: Vec<String>,
    /// Label name to value regex.
    pub labels: HashMap<String, String>,
    /// Consecutive errors tolerated before the policy applies.
    pub error_limit: Option<u32>,
    /// `give-up`, `kill` or `reconnect`.
    pub error_limit_policy: Option<String>,
    /// Pause after each stream error.
    #[serde(with = "crate::core::duration::serde_opt_duration")]
    pub error_throttle: Option<Duration>,
}

/// What the container event generator does once the error limit is hit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ErrorLimitPolicy {
    /// Close the stream.
    GiveUp,
    /// Terminate the process.
    Kill,
    /// Reconnect and keep forwarding into the same stream.
    #[default]
    Reconnect,
}

impl FromStr for ErrorLimitPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" | "reconnect" => Ok(ErrorLimitPolicy::Reconnect),
            "give-up" => Ok(ErrorLimitPolicy::GiveUp),
            "kill" => Ok(ErrorLimitPolicy::Kill),
            other => Err(format!(
                "given error limit policy: {:?} is not allowed, possible error policies are (give-up,kill,reconnect)",
                other
            )),
        }
    }
}

/// One action plus its execution parameters and hooks.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct TaskConfig {
    /// Shell command.
    pub command: Option<String>,
    /// URL for a GET request.
    pub get: Option<String>,
    /// URL for a POST request.
    pub post: Option<String>,
    /// JSON body of a POST request.
    pub data: Option<serde_json::Value>,
    /// HTTP headers.
    pub headers: Option<HashMap<String, String>>,
    /// Per-attempt timeout; zero or absent means none.
    #[serde(with = "crate::core::duration::serde_opt_duration")]
    pub timeout: Option<Duration>,
    /// Retries after the first attempt.
    pub retries: u32,
    /// Linear backoff base.
    #[serde(with = "crate::core::duration::serde_opt_duration")]
    pub retry_delay: Option<Duration>,
    /// Working directory of the command.
    pub working_dir: Option<String>,
    /// User to run the command as.
    pub user: Option<String>,
    /// Group to run the command as.
    pub group: Option<String>,
    /// Environment overlay for the command.
    pub env: HashMap<String, String>,
    /// Execution targets; empty means one local connection.
    pub connections: Vec<TaskConnection>,
    /// Hooks run after success.
    pub on_done: Vec<TaskConfig>,
    /// Hooks run after failure.
    pub on_fail: Vec<TaskConfig>,
}

impl TaskConfig {
    /// Names of the action fields that are set.
    pub fn active_actions(&self) -> Vec<&'static str> {
        let mut actions = Vec::new();
        if self.get.as_deref().is_some_and(|g| !g.is_empty()) {
            actions.push("get");
        }
        if self.post.as_deref().is_some_and(|p| !p.is_empty()) {
            actions.push("post");
        }
        if self.command.as_deref().is_some_and(|c| !c.is_empty()) {
            actions.push("command");
        }
        actions
    }

    /// Identity used in logs and metric labels: the action text.
    pub fn id(&self) -> TaskId {
        let text = self
            .command
            .as_deref()
            .or(self.get.as_deref())
            .or(self.post.as_deref())
            .unwrap_or_default();
        TaskId::new(text)
    }
}

/// Execution target of a command.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct TaskConnection {
    /// Run on the local host.
    pub local: bool,
    /// Name of a running container to exec into.
    pub container: Option<String>,
    /// Engine address. Defaults to the local unix socket.
    pub docker_connection: Option<String>,
    /// Image of an ephemeral container.
    pub image: Option<String>,
    /// `host:container` bind mounts of an ephemeral container.
    pub volumes: Vec<String>,
    /// Networks of an ephemeral container.
    pub networks: Vec<String>,
}

impl TaskConnection {
    /// A connection that runs on the local host.
    pub fn local() -> Self {
        Self {
            local: true,
            ..Self::default()
        }
    }

    /// Names of the kinds this connection selects.
    pub fn active_kinds(&self) -> Vec<&'static str> {
        let mut kinds = Vec::new();
        if self.local {
            kinds.push("local");
        }
        let has_image = self.image.as_deref().is_some_and(|i| !i.is_empty());
        if self.container.as_deref().is_some_and(|c| !c.is_empty()) && !has_image {
            kinds.push("container");
        }
        if has_image {
            kinds.push("image");
        }
        kinds
    }
}
