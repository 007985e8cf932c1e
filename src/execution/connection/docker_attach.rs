use async_trait::async_trait;
use bollard::Docker;
use bollard::exec::{CreateExecOptions, StartExecResults};
use futures::StreamExt;

use super::{Connection, ConnectionError};
use crate::config::TaskConnection;
use crate::execution::docker_client::{self, DEFAULT_DOCKER_HOST};
use crate::execution::shell::CommandContext;

/// Runs the command through `exec` inside an existing, running container.
#[derive(Debug)]
pub struct DockerAttachConnection {
    address: String,
    container: String,
    exec: Option<CreateExecOptions<String>>,
    client: Option<Docker>,
}

impl DockerAttachConnection {
    /// Target `container` on the engine at `address`.
    pub fn new(address: impl Into<String>, container: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            container: container.into(),
            exec: None,
            client: None,
        }
    }

    pub(crate) fn from_config(config: &TaskConnection) -> Option<Box<dyn Connection>> {
        if config.image.as_deref().is_some_and(|i| !i.is_empty()) {
            return None;
        }
        let container = config.container.as_deref().filter(|c| !c.is_empty())?;
        let address = docker_client::address_or_default(config.docker_connection.as_deref());
        Some(Box::new(Self::new(address, container)))
    }
}

#[async_trait]
impl Connection for DockerAttachConnection {
    fn kind(&self) -> &'static str {
        "docker-attach"
    }

    async fn prepare(&mut self, ctx: &CommandContext) -> Result<(), ConnectionError> {
        self.exec = Some(CreateExecOptions {
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            privileged: Some(true),
            env: Some(ctx.env_pairs()),
            working_dir: ctx.working_dir.clone(),
            user: ctx.user.clone(),
            cmd: Some(ctx.argv()),
            ..CreateExecOptions::default()
        });
        Ok(())
    }

    async fn connect(&mut self) -> Result<(), ConnectionError> {
        if self.address == DEFAULT_DOCKER_HOST {
            tracing::debug!(
                "no explicit docker connection specified, using default: `{}`",
                DEFAULT_DOCKER_HOST
            );
        }
        let client = docker_client::connect(&self.address)
            .map_err(|e| ConnectionError::Connect(e.to_string()))?;
        self.client = Some(client);
        Ok(())
    }

    async fn execute(&mut self) -> Result<Vec<u8>, ConnectionError> {
        let client = self.client.as_ref().ok_or(ConnectionError::NotReady("connect"))?;
        let options = self.exec.clone().ok_or(ConnectionError::NotReady("prepare"))?;

        let exec = client.create_exec(&self.container, options).await?;
        tracing::debug!(container = %self.container, exec = %exec.id, "created exec instance");

        let mut combined = Vec::new();
        if let StartExecResults::Attached { mut output, .. } = client.start_exec(&exec.id, None).await? {
            while let Some(chunk) = output.next().await {
                combined.extend_from_slice(&chunk?.into_bytes());
            }
        }

        let inspect = client.inspect_exec(&exec.id).await?;
        match inspect.exit_code {
            Some(code) if code != 0 => Err(ConnectionError::Exited {
                code,
                output: String::from_utf8_lossy(&combined).trim().to_string(),
            }),
            _ => Ok(combined),
        }
    }

    async fn disconnect(&mut self) -> Result<(), ConnectionError> {
        self.client = None;
        Ok(())
    }
}
