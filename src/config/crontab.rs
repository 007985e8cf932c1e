//! Import of classic crontab files.
//!
//! Each schedule line becomes a command task. Lines that share a timing
//! expression end up in one job named `FromCron: <timing>`, in file order.
//! `KEY=value` lines set environment variables for every task that follows
//! them. Full-line `#` comments and blank lines are ignored, and a trailing
//! `\` joins a line with the next one. `@reboot` maps to an `on-init` event.

use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;

use super::error::ConfigError;
use super::types::{Config, JobConfig, JobEvent, TaskConfig};

/// Timing expressions recognised by default: descriptors, `@every` and five
/// to seven numeric cron fields.
pub const DEFAULT_MATCHER: &str = r"(@(annually|yearly|monthly|weekly|daily|hourly|reboot))|(@every (\d+(ns|us|µs|ms|s|m|h))+)|((((\d+,)+\d+|(\d+(/|-)\d+)|\d+|\*|(\*/\d+))\s*){5,7})";

const JOB_PREFIX: &str = "FromCron: ";
const JOB_DESCRIPTION: &str = "Imported from cron file";

/// One parsed schedule line.
#[derive(Debug, Clone, PartialEq, Eq)]
struct CronSpec {
    timing: String,
    user: Option<String>,
    command: String,
    env: HashMap<String, String>,
}

/// Parser for crontab files.
#[derive(Debug, Clone)]
pub struct CrontabImport {
    line: Regex,
    env: Regex,
    has_user: bool,
}

impl CrontabImport {
    /// Build a parser around a timing `matcher`. With `has_user` every line
    /// carries a user name between the timing and the command, as in
    /// `/etc/crontab`.
    pub fn new(matcher: &str, has_user: bool) -> Result<Self, ConfigError> {
        let user = if has_user { r"(?P<user>\w+)\s+" } else { "" };
        let pattern = format!(r"^(?P<cron>{})\s+{}(?P<cmd>.*)$", matcher, user);
        let line = Regex::new(&pattern).map_err(|e| {
            ConfigError::invalid(format!("cannot compile cron matcher `{}`: {}", matcher, e))
        })?;
        let env = Regex::new(r"^(?P<key>\w+)=(?P<value>.*)$").map_err(|e| {
            ConfigError::invalid(format!("cannot compile environment matcher: {}", e))
        })?;
        Ok(Self {
            line,
            env,
            has_user,
        })
    }

    /// Whether lines carry a user field.
    pub fn has_user(&self) -> bool {
        self.has_user
    }

    /// Convert crontab `content` into a configuration.
    pub fn parse(&self, content: &str) -> Result<Config, ConfigError> {
        let mut config = Config::default();
        for spec in self.specs(content)? {
            add_spec(&mut config, spec);
        }
        Ok(config)
    }

    fn specs(&self, content: &str) -> Result<Vec<CronSpec>, ConfigError> {
        let mut env = HashMap::new();
        let mut specs = Vec::new();

        for line in sanitize(content) {
            if let Some(caps) = self.env.captures(&line) {
                let key = caps["key"].to_string();
                let value = caps["value"].to_string();
                if let Some(old) = env.insert(key.clone(), value.clone()) {
                    tracing::warn!(key = %key, old = %old, new = %value, "environment variable replaced");
                }
                continue;
            }

            let caps = self.line.captures(&line).ok_or_else(|| {
                ConfigError::invalid(format!(
                    "cannot parse this non-empty line as cron specification: {}",
                    line
                ))
            })?;
            specs.push(CronSpec {
                timing: caps["cron"].trim().to_string(),
                user: caps.name("user").map(|u| u.as_str().to_string()),
                command: caps["cmd"].trim().to_string(),
                env: env.clone(),
            });
        }
        Ok(specs)
    }
}

/// Normalise line endings, drop comments and blank lines, join continuations.
fn sanitize(content: &str) -> Vec<String> {
    let content = content.replace("\r\n", "\n");
    let mut lines = Vec::new();
    let mut pending = String::new();

    for raw in content.lines() {
        let trimmed = raw.trim();
        if pending.is_empty() && trimmed.starts_with('#') {
            continue;
        }
        match trimmed.strip_suffix('\\') {
            Some(head) => {
                pending.push_str(head.trim_end());
                pending.push(' ');
            }
            None => {
                pending.push_str(trimmed);
                let line = std::mem::take(&mut pending);
                if !line.trim().is_empty() {
                    lines.push(line.trim().to_string());
                }
            }
        }
    }
    if !pending.trim().is_empty() {
        lines.push(pending.trim().to_string());
    }
    lines
}

fn add_spec(config: &mut Config, spec: CronSpec) {
    let name = format!("{}{}", JOB_PREFIX, spec.timing);
    let task = TaskConfig {
        command: Some(spec.command),
        user: spec.user,
        env: spec.env,
        ..TaskConfig::default()
    };

    if let Some(job) = config.jobs.iter_mut().find(|j| j.name == name) {
        job.tasks.push(task);
        return;
    }

    let event = if spec.timing == "@reboot" {
        JobEvent {
            on_init: true,
            ..JobEvent::default()
        }
    } else {
        JobEvent {
            cron: Some(spec.timing),
            ..JobEvent::default()
        }
    };
    config.jobs.push(JobConfig {
        name,
        description: Some(JOB_DESCRIPTION.to_string()),
        events: vec![event],
        tasks: vec![task],
        ..JobConfig::default()
    });
}

/// Render the jobs of `config` as YAML, leaving out every empty or
/// default-false field.
pub fn to_yaml(config: &Config) -> Result<String, ConfigError> {
    let value = serde_json::to_value(&config.jobs)
        .map(|jobs| serde_json::json!({ "jobs": jobs }))
        .map_err(|e| ConfigError::invalid(format!("failed to serialize configuration: {}", e)))?;
    let value = prune(value).unwrap_or(Value::Null);
    Ok(serde_yaml::to_string(&value)?)
}

fn prune(value: Value) -> Option<Value> {
    match value {
        Value::Null | Value::Bool(false) => None,
        Value::String(s) if s.is_empty() => None,
        Value::Number(n) if n.as_u64() == Some(0) => None,
        Value::Array(items) => {
            let items: Vec<Value> = items.into_iter().filter_map(prune).collect();
            (!items.is_empty()).then_some(Value::Array(items))
        }
        Value::Object(map) => {
            let map: serde_json::Map<String, Value> = map
                .into_iter()
                .filter_map(|(k, v)| prune(v).map(|v| (k, v)))
                .collect();
            (!map.is_empty()).then_some(Value::Object(map))
        }
        other => Some(other),
    }
}
