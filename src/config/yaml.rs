//! YAML configuration loading and validation.
//!
//! Parsing always validates. Disabled jobs are skipped by validation and
//! never started.

use regex::Regex;
use std::collections::HashSet;
use std::path::Path;

use super::error::ConfigError;
use super::types::{Config, DockerEventConfig, ErrorLimitPolicy, JobConfig, JobEvent, TaskConfig};
use crate::core::schedule::Schedule;
use crate::events::docker::ACCEPTED_ACTIONS;
use crate::execution::credential;

/// YAML configuration loader.
pub struct YamlLoader;

impl YamlLoader {
    /// Load and validate a configuration file.
    pub fn load_config(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::FileReadError {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse_config(&content)
    }

    /// Parse and validate a configuration document.
    pub fn parse_config(yaml: &str) -> Result<Config, ConfigError> {
        let config: Config = serde_yaml::from_str(yaml)?;
        Self::validate_config(&config)?;
        Ok(config)
    }

    /// Validate a whole configuration document.
    pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
        if let Some(web) = &config.webserver {
            if web.username.is_some() != web.password.is_some() {
                return Err(ConfigError::invalid(
                    "webserver username and password must be set together",
                ));
            }
        }

        let mut names = HashSet::new();
        for job in &config.jobs {
            if job.name.is_empty() {
                return Err(ConfigError::MissingField("name".into()));
            }
            if !names.insert(job.name.as_str()) {
                return Err(ConfigError::invalid(format!(
                    "duplicate job name: {}",
                    job.name
                )));
            }
            Self::validate_job(job)?;
        }
        Ok(())
    }

    /// Validate a single job. Disabled jobs always pass.
    pub fn validate_job(job: &JobConfig) -> Result<(), ConfigError> {
        tracing::trace!(job = %job.name, "validating job");
        if job.disabled {
            tracing::debug!(job = %job.name, "job is disabled, skipping validation");
            return Ok(());
        }

        if job.concurrency == Some(0) {
            return Err(ConfigError::invalid(format!(
                "job '{}': concurrency cannot be zero",
                job.name
            )));
        }

        let in_job = |e: ConfigError| match e {
            ConfigError::InvalidConfig(msg) => {
                ConfigError::InvalidConfig(format!("job '{}': {}", job.name, msg))
            }
            other => other,
        };

        for event in &job.events {
            Self::validate_event(event).map_err(in_job)?;
        }
        for task in job
            .tasks
            .iter()
            .chain(&job.hooks.done)
            .chain(&job.hooks.failed)
        {
            Self::validate_task(task).map_err(in_job)?;
        }
        Ok(())
    }

    /// Validate one trigger specification.
    pub fn validate_event(event: &JobEvent) -> Result<(), ConfigError> {
        let kinds = event.active_kinds();
        if kinds.len() != 1 {
            return Err(ConfigError::invalid(format!(
                "a single event must have one of (on-init: true, interval, cron, web-event, docker, log-file) field, received: {}",
                event
            )));
        }

        if event.interval.is_some_and(|d| d.is_zero()) {
            return Err(ConfigError::invalid("interval cannot be zero"));
        }
        if let Some(cron) = event.cron.as_deref().filter(|c| !c.is_empty()) {
            Schedule::parse(cron).map_err(|e| ConfigError::invalid(e.to_string()))?;
        }
        if let Some(docker) = &event.docker {
            Self::validate_docker(docker)?;
        }
        if let Some(matcher) = &event.log_matcher {
            compile(matcher, "log-matcher")?;
        }
        if let Some(breaker) = &event.log_line_breaker {
            if breaker.is_empty() {
                return Err(ConfigError::invalid("log-line-breaker cannot be empty"));
            }
        }
        Ok(())
    }

    fn validate_docker(docker: &DockerEventConfig) -> Result<(), ConfigError> {
        for (pattern, field) in [(&docker.name, "name"), (&docker.image, "image")] {
            if let Some(pattern) = pattern {
                compile(pattern, field)?;
            }
        }
        for (label, pattern) in &docker.labels {
            compile(pattern, &format!("label {}", label))?;
        }

        for action in &docker.actions {
            if !ACCEPTED_ACTIONS.contains(&action.as_str()) {
                return Err(ConfigError::invalid(format!(
                    "given action: {:?} is not allowed",
                    action
                )));
            }
        }

        docker
            .error_limit_policy
            .as_deref()
            .unwrap_or_default()
            .parse::<ErrorLimitPolicy>()
            .map_err(ConfigError::InvalidConfig)?;
        Ok(())
    }

    /// Validate one task and, recursively, its hooks.
    pub fn validate_task(task: &TaskConfig) -> Result<(), ConfigError> {
        if task.active_actions().len() != 1 {
            return Err(ConfigError::invalid(format!(
                "a single task should have one of (get, post, command) fields, received: (command: `{}`, get: `{}`, post: `{}`)",
                task.command.as_deref().unwrap_or_default(),
                task.get.as_deref().unwrap_or_default(),
                task.post.as_deref().unwrap_or_default(),
            )));
        }

        if let Err(e) = credential::validate(task.user.as_deref(), task.group.as_deref()) {
            tracing::warn!(
                error = %e,
                "be careful when using credentials, in local mode you can't use credentials unless running as root"
            );
        }

        if let Some(command) = &task.command {
            if task.data.is_some() || task.headers.is_some() {
                return Err(ConfigError::invalid(format!(
                    "command cannot have data or headers field, violating command: `{}`",
                    command
                )));
            }
        } else if !task.connections.is_empty() {
            return Err(ConfigError::invalid(
                "connections are only supported on command tasks",
            ));
        }

        if let Some(url) = &task.get {
            if task.data.is_some() {
                return Err(ConfigError::invalid(format!(
                    "GET request cannot have data field, violating GET URI: `{}`",
                    url
                )));
            }
        }

        for connection in &task.connections {
            let kinds = connection.active_kinds();
            if kinds.len() != 1 {
                return Err(ConfigError::invalid(format!(
                    "a connection must select exactly one of (local, container, image), received: {:?}",
                    kinds
                )));
            }
        }

        for hook in task.on_done.iter().chain(&task.on_fail) {
            Self::validate_task(hook).map_err(|e| {
                ConfigError::invalid(format!("hook: failed to validate: {}", unwrap_message(e)))
            })?;
        }
        Ok(())
    }
}

fn compile(pattern: &str, field: &str) -> Result<Regex, ConfigError> {
    Regex::new(pattern)
        .map_err(|e| ConfigError::invalid(format!("invalid regex in {}: {}", field, e)))
}

fn unwrap_message(e: ConfigError) -> String {
    match e {
        ConfigError::InvalidConfig(msg) => msg,
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn parse_err(yaml: &str) -> String {
        YamlLoader::parse_config(yaml).unwrap_err().to_string()
    }

    #[test]
    fn test_parse_valid_config() {
        let yaml = r#"
jobs:
  - name: hello
    events:
      - on-init: true
      - cron: "*/5 * * * *"
    tasks:
      - command: echo hello
        on-fail:
          - post: http://localhost/alert
            data: {msg: failed}
"#;
        let config = YamlLoader::parse_config(yaml).unwrap();
        assert_eq!(config.jobs.len(), 1);
        assert_eq!(config.jobs[0].tasks[0].on_fail.len(), 1);
    }

    #[test]
    fn test_event_with_no_kind_is_rejected() {
        let err = parse_err("jobs: [{name: a, events: [{}], tasks: []}]");
        assert!(err.contains("a single event must have one of"));
        assert!(err.contains("job 'a'"));
    }

    #[test]
    fn test_event_with_two_kinds_lists_fields() {
        let yaml = r#"
jobs:
  - name: a
    events:
      - on-init: true
        cron: "* * * * *"
"#;
        let err = parse_err(yaml);
        assert!(err.contains("on-init: true"));
        assert!(err.contains("cron: \"* * * * *\""));
    }

    #[test]
    fn test_zero_interval_is_rejected() {
        let err = parse_err("jobs: [{name: a, events: [{interval: 0s}]}]");
        assert!(err.contains("interval cannot be zero"));
    }

    #[test]
    fn test_negative_duration_is_rejected() {
        let err = parse_err("jobs: [{name: a, tasks: [{command: ls, timeout: -5s}]}]");
        assert!(err.contains("cannot be negative"));
    }

    #[test]
    fn test_bad_cron_is_rejected() {
        let err = parse_err("jobs: [{name: a, events: [{cron: not a cron}]}]");
        assert!(err.contains("invalid cron expression"));
    }

    #[test]
    fn test_docker_filters_are_validated() {
        let bad_action = r#"
jobs:
  - name: a
    events:
      - docker:
          actions: [explode]
"#;
        assert!(parse_err(bad_action).contains("given action: \"explode\" is not allowed"));

        let bad_policy = r#"
jobs:
  - name: a
    events:
      - docker:
          error-limit-policy: panic
"#;
        assert!(parse_err(bad_policy).contains("possible error policies are"));

        let bad_regex = r#"
jobs:
  - name: a
    events:
      - docker:
          labels: {role: "("}
"#;
        assert!(parse_err(bad_regex).contains("invalid regex in label role"));
    }

    #[test]
    fn test_task_needs_exactly_one_action() {
        let err = parse_err("jobs: [{name: a, tasks: [{command: ls, get: http://x}]}]");
        assert!(err.contains("a single task should have one of (get, post, command) fields"));

        let err = parse_err("jobs: [{name: a, tasks: [{retries: 1}]}]");
        assert!(err.contains("a single task should have one of"));
    }

    #[test]
    fn test_command_cannot_have_http_fields() {
        let err = parse_err("jobs: [{name: a, tasks: [{command: ls, headers: {A: b}}]}]");
        assert!(err.contains("command cannot have data or headers field"));

        let err = parse_err("jobs: [{name: a, tasks: [{get: http://x, data: {a: 1}}]}]");
        assert!(err.contains("GET request cannot have data field"));
    }

    #[test]
    fn test_connections_are_validated() {
        let err = parse_err("jobs: [{name: a, tasks: [{get: http://x, connections: [{local: true}]}]}]");
        assert!(err.contains("connections are only supported on command tasks"));

        let err = parse_err("jobs: [{name: a, tasks: [{command: ls, connections: [{}]}]}]");
        assert!(err.contains("exactly one of (local, container, image)"));
    }

    #[test]
    fn test_hook_errors_are_prefixed() {
        let yaml = r#"
jobs:
  - name: a
    tasks:
      - command: ls
        on-done:
          - get: http://x
            post: http://y
"#;
        let err = parse_err(yaml);
        assert!(err.contains("hook: failed to validate: a single task should have one of"));
    }

    #[test]
    fn test_job_level_rules() {
        assert!(parse_err("jobs: [{name: a, concurrency: 0}]").contains("concurrency cannot be zero"));
        assert!(parse_err("jobs: [{name: a}, {name: a}]").contains("duplicate job name: a"));
        assert!(parse_err("jobs: [{name: ''}]").contains("missing required field"));
    }

    #[test]
    fn test_disabled_jobs_skip_validation() {
        let yaml = "jobs: [{name: a, disabled: true, events: [{}], tasks: [{}]}]";
        assert!(YamlLoader::parse_config(yaml).is_ok());
    }

    #[test]
    fn test_load_config_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "jobs: [{{name: a, events: [{{on-init: true}}], tasks: [{{command: ls}}]}}]")
            .unwrap();

        let config = YamlLoader::load_config(file.path()).unwrap();
        assert_eq!(config.jobs[0].name, "a");

        let err = YamlLoader::load_config("/does/not/exist.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::FileReadError { .. }));
    }
}
