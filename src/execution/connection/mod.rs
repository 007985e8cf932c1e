//! Execution targets of command tasks.
//!
//! A [`Connection`] runs one rendered command somewhere: a local process, an
//! exec inside a running container, or a throwaway container. Connections
//! are resolved per attempt through [`CONNECTION_REGISTRY`]; the command
//! runner always calls [`Connection::disconnect`], even when an earlier step
//! failed or the attempt was cancelled.

mod docker_attach;
mod docker_create;
mod local;

pub use docker_attach::DockerAttachConnection;
pub use docker_create::DockerCreateConnection;
pub use local::LocalConnection;

use async_trait::async_trait;
use std::sync::LazyLock;
use thiserror::Error;

use super::credential::CredentialError;
use super::shell::CommandContext;
use crate::config::TaskConnection;
use crate::core::registry::Registry;

/// Errors raised by a connection step.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// The invocation could not be prepared.
    #[error("cannot prepare command: {0}")]
    Prepare(String),

    /// The target could not be reached.
    #[error("cannot connect: {0}")]
    Connect(String),

    /// The command could not be run.
    #[error("cannot execute command: {0}")]
    Execute(String),

    /// The command ran and exited with a non-zero code.
    #[error("command exited with code {code}: {output}")]
    Exited { code: i64, output: String },

    /// Container engine failure.
    #[error("docker: {0}")]
    Docker(#[from] bollard::errors::Error),

    /// Run-as credentials could not be applied.
    #[error(transparent)]
    Credential(#[from] CredentialError),

    /// A step was called out of order.
    #[error("connection used before {0}")]
    NotReady(&'static str),
}

/// One execution target, driven through prepare, connect, execute and
/// disconnect for a single attempt.
#[async_trait]
pub trait Connection: Send {
    /// Short name used in logs.
    fn kind(&self) -> &'static str;

    /// Build the invocation from the resolved command.
    async fn prepare(&mut self, ctx: &CommandContext) -> Result<(), ConnectionError>;

    /// Reach the target.
    async fn connect(&mut self) -> Result<(), ConnectionError>;

    /// Run the command and return its combined output.
    async fn execute(&mut self) -> Result<Vec<u8>, ConnectionError>;

    /// Release everything acquired by the previous steps.
    async fn disconnect(&mut self) -> Result<(), ConnectionError>;
}

/// Registry selecting a connection from its configuration.
pub type ConnectionRegistry = Registry<TaskConnection, Box<dyn Connection>>;

/// Built-in connections in match order: local, attach, create.
pub static CONNECTION_REGISTRY: LazyLock<ConnectionRegistry> = LazyLock::new(|| {
    Registry::new()
        .with(LocalConnection::from_config)
        .with(DockerAttachConnection::from_config)
        .with(DockerCreateConnection::from_config)
});

/// Build the connection described by `config`, if any kind matches.
pub fn build(config: &TaskConnection) -> Option<Box<dyn Connection>> {
    CONNECTION_REGISTRY.get(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selection_by_shape() {
        assert_eq!(build(&TaskConnection::local()).unwrap().kind(), "local");

        let attach = TaskConnection {
            container: Some("web".into()),
            ..TaskConnection::default()
        };
        assert_eq!(build(&attach).unwrap().kind(), "docker-attach");

        let create = TaskConnection {
            container: Some("named".into()),
            image: Some("alpine:3".into()),
            ..TaskConnection::default()
        };
        assert_eq!(build(&create).unwrap().kind(), "docker-create");

        assert!(build(&TaskConnection::default()).is_none());
        assert_eq!(CONNECTION_REGISTRY.len(), 3);
    }
}
