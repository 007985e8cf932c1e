//! Shell, argument and environment resolution for command connections.
//!
//! The task environment overlays the defaults: a `SHELL` key (any case)
//! replaces the shell and a `SHELL_ARGS` key replaces the `:`-separated
//! arguments. Keys are upper-cased. Shell, command and every environment key
//! and value are rendered against the trigger's event data.
//!
//! `SHELL_ARG_COMPATIBILITY` selects how the event itself reaches the
//! command: `none` (the default) drops it, `args` appends
//! [`EventData::arguments`] after the command, and `env` exports them
//! `:`-joined in [`EVENT_ARGUMENTS_ENV`], with `:` escaped as `\:`.

use std::collections::BTreeMap;

use crate::config::TaskConfig;
use crate::core::event_data::EventData;
use crate::global::ShellDefaults;
use crate::template;

const ESCAPE: char = '\\';

/// Environment key carrying the event arguments in [`ArgPassing::Environ`] mode.
pub const EVENT_ARGUMENTS_ENV: &str = "CRONTAB_GO_EVENT_ARGUMENTS";

/// Environment key selecting the [`ArgPassing`] mode.
pub const ARG_PASSING_ENV: &str = "SHELL_ARG_COMPATIBILITY";

/// How event data is handed to a command.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ArgPassing {
    #[default]
    Omit,
    Args,
    Environ,
}

impl ArgPassing {
    /// Parse a mode name. Unknown names fall back to [`ArgPassing::Omit`]
    /// with a warning.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "" | "none" | "omit" => ArgPassing::Omit,
            "args" | "arguments" => ArgPassing::Args,
            "env" | "environ" | "environment" => ArgPassing::Environ,
            other => {
                tracing::warn!(mode = other, "event argument passing mode is not supported, omitting event arguments");
                ArgPassing::Omit
            }
        }
    }
}

/// Join `parts` with `:`, escaping any `:` inside a part.
pub fn escaped_join(parts: &[String], sep: char) -> String {
    let escaped = format!("{}{}", ESCAPE, sep);
    parts
        .iter()
        .map(|p| p.replace(sep, &escaped))
        .collect::<Vec<_>>()
        .join(&sep.to_string())
}

/// Split `s` on `sep`, honouring `\` escapes of the separator.
///
/// An escape followed by any other character is kept verbatim, as is a
/// trailing escape. An empty trailing segment is dropped.
pub fn escaped_split(s: &str, sep: char) -> Vec<String> {
    let mut parts = Vec::new();
    let mut buffer = String::new();
    let mut escaped = false;

    for c in s.chars() {
        match c {
            c if escaped && c == sep => {
                buffer.push(c);
                escaped = false;
            }
            c if escaped => {
                buffer.push(ESCAPE);
                buffer.push(c);
                escaped = false;
            }
            ESCAPE => escaped = true,
            c if c == sep => parts.push(std::mem::take(&mut buffer)),
            c => buffer.push(c),
        }
    }
    if escaped {
        buffer.push(ESCAPE);
    }
    if !buffer.is_empty() {
        parts.push(buffer);
    }
    parts
}

/// Fully resolved invocation of one command on one connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandContext {
    /// Shell executable.
    pub shell: String,
    /// Arguments placed before the command.
    pub shell_args: Vec<String>,
    /// Rendered command text.
    pub command: String,
    /// Event arguments placed after the command.
    pub event_args: Vec<String>,
    /// Rendered task environment, keys upper-cased.
    pub env: BTreeMap<String, String>,
    /// Working directory, if configured.
    pub working_dir: Option<String>,
    /// User to run as, if configured.
    pub user: Option<String>,
    /// Group to run as, if configured.
    pub group: Option<String>,
}

impl CommandContext {
    /// Resolve `task` against the trigger `event` and the process defaults.
    pub fn build(task: &TaskConfig, event: &EventData, defaults: &ShellDefaults) -> Self {
        let mut shell = defaults.shell.clone();
        let mut shell_args = defaults.shell_args.clone();
        let mut env = BTreeMap::new();
        let mut passing = ArgPassing::default();

        for (key, value) in &task.env {
            let key = template::render(key, event).to_uppercase();
            let value = template::render(value, event);
            match key.as_str() {
                "SHELL" => {
                    tracing::info!(shell = %value, "overriding the global shell from the task environment");
                    shell = value.clone();
                }
                "SHELL_ARGS" => {
                    tracing::info!(shell_args = %value, "overriding the global shell args from the task environment");
                    shell_args = value.clone();
                }
                ARG_PASSING_ENV => {
                    tracing::info!(mode = %value, "overriding the event argument passing mode from the task environment");
                    passing = ArgPassing::parse(&value);
                }
                _ => {}
            }
            env.insert(key, value);
        }

        let mut event_args = Vec::new();
        match passing {
            ArgPassing::Omit => {
                tracing::debug!("event arguments will not be passed to the command");
            }
            ArgPassing::Args => event_args = event.arguments(),
            ArgPassing::Environ => {
                env.insert(
                    EVENT_ARGUMENTS_ENV.to_string(),
                    escaped_join(&event.arguments(), ':'),
                );
            }
        }

        Self {
            shell: template::render(&shell, event),
            shell_args: escaped_split(&shell_args, ':'),
            command: template::render(task.command.as_deref().unwrap_or_default(), event),
            event_args,
            env,
            working_dir: task.working_dir.clone().filter(|d| !d.is_empty()),
            user: task.user.clone().filter(|u| !u.is_empty()),
            group: task.group.clone().filter(|g| !g.is_empty()),
        }
    }

    /// Shell followed by its arguments, the command and any event arguments.
    pub fn argv(&self) -> Vec<String> {
        let mut argv = Vec::with_capacity(self.shell_args.len() + self.event_args.len() + 2);
        argv.push(self.shell.clone());
        argv.extend(self.shell_args.iter().cloned());
        argv.push(self.command.clone());
        argv.extend(self.event_args.iter().cloned());
        argv
    }

    /// Environment as `KEY=value` pairs.
    pub fn env_pairs(&self) -> Vec<String> {
        self.env
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_escaped_split() {
        assert_eq!(escaped_split("-c", ':'), vec!["-c"]);
        assert_eq!(escaped_split("-e:-c", ':'), vec!["-e", "-c"]);
        assert_eq!(escaped_split(r"a\:b:c", ':'), vec!["a:b", "c"]);
        assert_eq!(escaped_split(r"a\nb", ':'), vec![r"a\nb"]);
        assert_eq!(escaped_split("a::b:", ':'), vec!["a", "", "b"]);
        assert_eq!(escaped_split(r"a\", ':'), vec![r"a\"]);
        assert!(escaped_split("", ':').is_empty());
    }

    #[test]
    fn test_defaults_apply() {
        let task = TaskConfig {
            command: Some("echo hi".into()),
            ..TaskConfig::default()
        };
        let ctx = CommandContext::build(&task, &EventData::new("init"), &ShellDefaults::default());

        assert_eq!(ctx.argv(), vec!["/bin/sh", "-c", "echo hi"]);
        assert!(ctx.env.is_empty());
        assert!(ctx.user.is_none());
    }

    #[test]
    fn test_env_overrides_shell_and_is_rendered() {
        let task = TaskConfig {
            command: Some("echo {{ emitter }}".into()),
            env: HashMap::from([
                ("shell".to_string(), "/bin/bash".to_string()),
                ("Shell_Args".to_string(), "-e:-c".to_string()),
                ("source".to_string(), "{{ emitter }}".to_string()),
            ]),
            ..TaskConfig::default()
        };
        let ctx = CommandContext::build(&task, &EventData::new("cron"), &ShellDefaults::default());

        assert_eq!(ctx.argv(), vec!["/bin/bash", "-e", "-c", "echo cron"]);
        assert_eq!(ctx.env["SOURCE"], "cron");
        assert!(ctx.env_pairs().contains(&"SHELL=/bin/bash".to_string()));
    }

    fn with_mode(mode: &str) -> TaskConfig {
        TaskConfig {
            command: Some("echo".into()),
            env: HashMap::from([("shell_arg_compatibility".to_string(), mode.to_string())]),
            ..TaskConfig::default()
        }
    }

    #[test]
    fn test_event_arguments_are_omitted_by_default() {
        let event = EventData::new("web-event").with("event", "deploy");

        let ctx = CommandContext::build(&with_mode("none"), &event, &ShellDefaults::default());
        assert_eq!(ctx.argv(), vec!["/bin/sh", "-c", "echo"]);
        assert!(!ctx.env.contains_key(EVENT_ARGUMENTS_ENV));

        let ctx = CommandContext::build(&with_mode("bogus"), &event, &ShellDefaults::default());
        assert!(ctx.event_args.is_empty());
    }

    #[test]
    fn test_event_arguments_as_args() {
        let event = EventData::new("web-event").with("event", "deploy");
        let ctx = CommandContext::build(&with_mode("args"), &event, &ShellDefaults::default());

        assert_eq!(
            ctx.argv(),
            vec!["/bin/sh", "-c", "echo", "web-event", "event=deploy"]
        );
    }

    #[test]
    fn test_event_arguments_as_environment() {
        let event = EventData::new("cron").with("cron", "@every 1m:30s");
        let ctx = CommandContext::build(&with_mode("env"), &event, &ShellDefaults::default());

        assert_eq!(ctx.env[EVENT_ARGUMENTS_ENV], r"cron:cron=@every 1m\:30s");
        assert_eq!(ctx.argv(), vec!["/bin/sh", "-c", "echo"]);
    }

    #[test]
    fn test_escaped_join_reverses_split() {
        let parts = vec!["a:b".to_string(), "c".to_string()];

        assert_eq!(escaped_join(&parts, ':'), r"a\:b:c");
        assert_eq!(escaped_split(&escaped_join(&parts, ':'), ':'), parts);
    }
}
