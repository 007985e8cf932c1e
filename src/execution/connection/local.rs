use async_trait::async_trait;
use std::process::Stdio;
use tokio::process::Command;

use super::{Connection, ConnectionError};
use crate::config::TaskConnection;
use crate::execution::credential::{self, Credentials};
use crate::execution::shell::CommandContext;

/// Runs the command as a child process of the daemon.
///
/// The child inherits the daemon's environment with the task environment
/// on top. It is killed if the attempt is dropped on timeout or cancel.
///
/// stdout and stderr are captured on separate pipes, so the returned output
/// is all of stdout followed by all of stderr, not their interleaving.
#[derive(Debug, Default)]
pub struct LocalConnection {
    command: Option<Command>,
}

impl LocalConnection {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn from_config(config: &TaskConnection) -> Option<Box<dyn Connection>> {
        config
            .local
            .then(|| Box::new(Self::new()) as Box<dyn Connection>)
    }
}

#[async_trait]
impl Connection for LocalConnection {
    fn kind(&self) -> &'static str {
        "local"
    }

    async fn prepare(&mut self, ctx: &CommandContext) -> Result<(), ConnectionError> {
        let mut command = Command::new(&ctx.shell);
        command
            .args(&ctx.shell_args)
            .arg(&ctx.command)
            .args(&ctx.event_args)
            .envs(&ctx.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(dir) = &ctx.working_dir {
            command.current_dir(dir);
        }

        let credentials = credential::resolve(ctx.user.as_deref(), ctx.group.as_deref())?;
        apply_credentials(&mut command, credentials);

        tracing::trace!(
            shell = %ctx.shell,
            shell_args = ?ctx.shell_args,
            working_dir = ?ctx.working_dir,
            "prepared local command"
        );
        self.command = Some(command);
        Ok(())
    }

    async fn connect(&mut self) -> Result<(), ConnectionError> {
        Ok(())
    }

    async fn execute(&mut self) -> Result<Vec<u8>, ConnectionError> {
        let command = self
            .command
            .as_mut()
            .ok_or(ConnectionError::NotReady("prepare"))?;
        let output = command
            .output()
            .await
            .map_err(|e| ConnectionError::Execute(e.to_string()))?;

        let mut combined = output.stdout;
        combined.extend_from_slice(&output.stderr);

        if output.status.success() {
            Ok(combined)
        } else {
            Err(ConnectionError::Exited {
                code: output.status.code().map(i64::from).unwrap_or(-1),
                output: String::from_utf8_lossy(&combined).trim().to_string(),
            })
        }
    }

    async fn disconnect(&mut self) -> Result<(), ConnectionError> {
        self.command = None;
        Ok(())
    }
}

#[cfg(unix)]
fn apply_credentials(command: &mut Command, credentials: Option<Credentials>) {
    if let Some(credentials) = credentials {
        command.uid(credentials.uid).gid(credentials.gid);
    }
}

#[cfg(not(unix))]
fn apply_credentials(_command: &mut Command, _credentials: Option<Credentials>) {}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::config::TaskConfig;
    use crate::core::event_data::EventData;
    use crate::global::ShellDefaults;
    use std::collections::HashMap;

    fn context(command: &str, env: &[(&str, &str)]) -> CommandContext {
        let task = TaskConfig {
            command: Some(command.to_string()),
            env: env
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<HashMap<_, _>>(),
            ..TaskConfig::default()
        };
        CommandContext::build(&task, &EventData::new("init"), &ShellDefaults::default())
    }

    #[tokio::test]
    async fn test_runs_command_with_env() {
        let mut conn = LocalConnection::new();
        conn.prepare(&context("echo $GREETING; echo oops >&2", &[("greeting", "hello")]))
            .await
            .unwrap();
        conn.connect().await.unwrap();

        let output = String::from_utf8(conn.execute().await.unwrap()).unwrap();
        assert_eq!(output, "hello\noops\n");
        conn.disconnect().await.unwrap();
    }

    #[tokio::test]
    async fn test_output_is_stdout_then_stderr() {
        let mut conn = LocalConnection::new();
        conn.prepare(&context("echo first >&2; sleep 0.1; echo second", &[]))
            .await
            .unwrap();

        let output = String::from_utf8(conn.execute().await.unwrap()).unwrap();
        assert_eq!(output, "second\nfirst\n");
    }

    #[tokio::test]
    async fn test_event_arguments_follow_the_command() {
        let task = TaskConfig {
            command: Some("echo \"$0 $1\"".to_string()),
            env: HashMap::from([("SHELL_ARG_COMPATIBILITY".to_string(), "args".to_string())]),
            ..TaskConfig::default()
        };
        let event = EventData::new("web-event").with("event", "deploy");
        let ctx = CommandContext::build(&task, &event, &ShellDefaults::default());

        let mut conn = LocalConnection::new();
        conn.prepare(&ctx).await.unwrap();
        let output = String::from_utf8(conn.execute().await.unwrap()).unwrap();
        assert_eq!(output.trim(), "web-event event=deploy");
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_an_error() {
        let mut conn = LocalConnection::new();
        conn.prepare(&context("echo broken; exit 3", &[])).await.unwrap();

        let err = conn.execute().await.unwrap_err();
        assert!(matches!(err, ConnectionError::Exited { code: 3, ref output } if output == "broken"));
    }

    #[tokio::test]
    async fn test_execute_before_prepare() {
        let mut conn = LocalConnection::new();
        assert!(matches!(
            conn.execute().await,
            Err(ConnectionError::NotReady("prepare"))
        ));
    }

    #[tokio::test]
    async fn test_working_dir() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = context("pwd", &[]);
        ctx.working_dir = Some(dir.path().display().to_string());

        let mut conn = LocalConnection::new();
        conn.prepare(&ctx).await.unwrap();
        let output = String::from_utf8(conn.execute().await.unwrap()).unwrap();
        let expected = dir.path().canonicalize().unwrap();
        assert_eq!(
            std::path::Path::new(output.trim()).canonicalize().unwrap(),
            expected
        );
    }
}
