use async_trait::async_trait;
use bollard::Docker;
use bollard::container::{
    Config, CreateContainerOptions, LogsOptions, NetworkingConfig, RemoveContainerOptions,
    StartContainerOptions, WaitContainerOptions,
};
use bollard::models::{EndpointSettings, HostConfig};
use futures::StreamExt;
use std::collections::HashMap;

use super::{Connection, ConnectionError};
use crate::config::TaskConnection;
use crate::execution::docker_client;
use crate::execution::shell::CommandContext;

/// Runs the command in a fresh container created from an image.
///
/// The container is created, started, waited on and its logs collected.
/// It is force-removed afterwards; if the attempt is dropped before that
/// happens, [`Connection::disconnect`] removes it.
#[derive(Debug)]
pub struct DockerCreateConnection {
    address: String,
    image: String,
    name: Option<String>,
    volumes: Vec<String>,
    networks: Vec<String>,
    config: Option<Config<String>>,
    client: Option<Docker>,
    container: Option<String>,
}

impl DockerCreateConnection {
    /// Containers from `image` on the engine at `address`.
    pub fn new(address: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            image: image.into(),
            name: None,
            volumes: Vec::new(),
            networks: Vec::new(),
            config: None,
            client: None,
            container: None,
        }
    }

    /// Builder: name the created container.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Builder: `host:container` bind mounts.
    pub fn with_volumes(mut self, volumes: Vec<String>) -> Self {
        self.volumes = volumes;
        self
    }

    /// Builder: networks to attach.
    pub fn with_networks(mut self, networks: Vec<String>) -> Self {
        self.networks = networks;
        self
    }

    pub(crate) fn from_config(config: &TaskConnection) -> Option<Box<dyn Connection>> {
        let image = config.image.as_deref().filter(|i| !i.is_empty())?;
        let address = docker_client::address_or_default(config.docker_connection.as_deref());

        let mut connection = Self::new(address, image)
            .with_volumes(config.volumes.clone())
            .with_networks(config.networks.clone());
        if let Some(name) = config.container.as_deref().filter(|c| !c.is_empty()) {
            connection = connection.with_name(name);
        }
        Some(Box::new(connection))
    }

    async fn remove(&mut self) -> Result<(), ConnectionError> {
        let (Some(client), Some(id)) = (self.client.as_ref(), self.container.take()) else {
            return Ok(());
        };
        let options = RemoveContainerOptions {
            force: true,
            ..RemoveContainerOptions::default()
        };
        client.remove_container(&id, Some(options)).await?;
        tracing::debug!(container = %id, "removed container");
        Ok(())
    }

    async fn run(&mut self) -> Result<Vec<u8>, ConnectionError> {
        let client = self.client.clone().ok_or(ConnectionError::NotReady("connect"))?;
        let config = self.config.clone().ok_or(ConnectionError::NotReady("prepare"))?;

        let options = self.name.clone().map(|name| CreateContainerOptions {
            name,
            ..CreateContainerOptions::default()
        });
        let created = client.create_container(options, config).await?;
        tracing::debug!(container = %created.id, warnings = ?created.warnings, "container created");
        self.container = Some(created.id.clone());

        client
            .start_container(&created.id, None::<StartContainerOptions<String>>)
            .await?;
        tracing::trace!(container = %created.id, "container started");

        let mut code = 0;
        let wait = client.wait_container(&created.id, None::<WaitContainerOptions<String>>);
        tokio::pin!(wait);
        while let Some(status) = wait.next().await {
            match status {
                Ok(response) => code = response.status_code,
                Err(bollard::errors::Error::DockerContainerWaitError { code: exit, .. }) => {
                    code = exit
                }
                Err(e) => return Err(e.into()),
            }
        }

        let mut combined = Vec::new();
        let logs = client.logs(
            &created.id,
            Some(LogsOptions::<String> {
                stdout: true,
                stderr: true,
                follow: false,
                ..LogsOptions::default()
            }),
        );
        tokio::pin!(logs);
        while let Some(chunk) = logs.next().await {
            combined.extend_from_slice(&chunk?.into_bytes());
        }

        if code != 0 {
            return Err(ConnectionError::Exited {
                code,
                output: String::from_utf8_lossy(&combined).trim().to_string(),
            });
        }
        Ok(combined)
    }
}

#[async_trait]
impl Connection for DockerCreateConnection {
    fn kind(&self) -> &'static str {
        "docker-create"
    }

    async fn prepare(&mut self, ctx: &CommandContext) -> Result<(), ConnectionError> {
        for volume in &self.volumes {
            if !volume.contains(':') {
                return Err(ConnectionError::Prepare(format!(
                    "volume `{}` must be in `host:container` form",
                    volume
                )));
            }
        }

        let endpoints: HashMap<String, EndpointSettings> = self
            .networks
            .iter()
            .map(|n| (n.clone(), EndpointSettings::default()))
            .collect();

        self.config = Some(Config {
            image: Some(self.image.clone()),
            cmd: Some(ctx.argv()),
            env: Some(ctx.env_pairs()),
            working_dir: ctx.working_dir.clone(),
            user: ctx.user.clone(),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            entrypoint: Some(Vec::new()),
            host_config: Some(HostConfig {
                binds: Some(self.volumes.clone()),
                ..HostConfig::default()
            }),
            networking_config: Some(NetworkingConfig {
                endpoints_config: endpoints,
            }),
            ..Config::default()
        });
        Ok(())
    }

    async fn connect(&mut self) -> Result<(), ConnectionError> {
        let client = docker_client::connect(&self.address)
            .map_err(|e| ConnectionError::Connect(e.to_string()))?;
        self.client = Some(client);
        Ok(())
    }

    async fn execute(&mut self) -> Result<Vec<u8>, ConnectionError> {
        let result = self.run().await;
        if let Err(e) = self.remove().await {
            tracing::warn!(error = %e, "cannot remove the container");
        }
        result
    }

    async fn disconnect(&mut self) -> Result<(), ConnectionError> {
        let removed = self.remove().await;
        self.client = None;
        removed
    }
}
