//! Container runtime event generator.
//!
//! Subscribes to the engine's event feed and forwards the events accepted by
//! a [`DockerFilter`]. Consecutive feed errors are counted; the count resets
//! on every received event. Once it reaches the configured limit the
//! [`ErrorLimitPolicy`] decides whether the generator gives up, kills the
//! process or reconnects into the same output stream.

use bollard::Docker;
use bollard::models::EventMessage;
use bollard::system::EventsOptions;
use futures::StreamExt;
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use super::{EventGenerator, EventInput, EventStream, already_built};
use crate::config::{DockerEventConfig, ErrorLimitPolicy};
use crate::core::event_data::EventData;
use crate::execution::docker_client;

/// Actions the engine reports and a filter may name.
pub const ACCEPTED_ACTIONS: &[&str] = &[
    "create",
    "start",
    "restart",
    "stop",
    "checkpoint",
    "pause",
    "unpause",
    "attach",
    "detach",
    "resize",
    "update",
    "rename",
    "kill",
    "die",
    "oom",
    "destroy",
    "remove",
    "commit",
    "top",
    "copy",
    "archive-path",
    "extract-to-dir",
    "export",
    "import",
    "save",
    "load",
    "tag",
    "untag",
    "push",
    "pull",
    "prune",
    "delete",
    "enable",
    "disable",
    "connect",
    "disconnect",
    "reload",
    "mount",
    "unmount",
    "exec_create",
    "exec_start",
    "exec_die",
    "exec_detach",
    "health_status",
    "health_status: running",
    "health_status: healthy",
    "health_status: unhealthy",
];

const DEFAULT_ERROR_LIMIT: u32 = 1;
const DEFAULT_ERROR_THROTTLE: Duration = Duration::from_secs(5);

/// Which engine events are forwarded.
#[derive(Debug, Clone, Default)]
pub struct DockerFilter {
    actions: Vec<String>,
    name: Option<Regex>,
    image: Option<Regex>,
    labels: Vec<(String, Regex)>,
}

impl DockerFilter {
    /// Compile the filter from its configuration.
    pub fn from_config(config: &DockerEventConfig) -> Result<Self, regex::Error> {
        let compile = |pattern: &Option<String>| pattern.as_deref().map(Regex::new).transpose();
        let labels = config
            .labels
            .iter()
            .map(|(k, v)| Ok::<_, regex::Error>((k.clone(), Regex::new(v)?)))
            .collect::<Result<Vec<_>, regex::Error>>()?;
        Ok(Self {
            actions: config.actions.clone(),
            name: compile(&config.name)?,
            image: compile(&config.image)?,
            labels,
        })
    }

    /// Returns true when an event with `action` and actor `attributes`
    /// passes every configured check. A label missing from the attributes is
    /// matched as the empty string.
    pub fn matches(&self, action: &str, attributes: &HashMap<String, String>) -> bool {
        if !self.actions.is_empty() && !self.actions.iter().any(|a| a == action) {
            return false;
        }

        let attribute = |key: &str| attributes.get(key).map(String::as_str).unwrap_or_default();
        if let Some(name) = &self.name {
            if !name.is_match(attribute("name")) {
                return false;
            }
        }
        if let Some(image) = &self.image {
            if !image.is_match(attribute("image")) {
                return false;
            }
        }
        self.labels
            .iter()
            .all(|(label, matcher)| matcher.is_match(attribute(label)))
    }
}

#[derive(Debug)]
struct Settings {
    connection: String,
    filter: DockerFilter,
    error_limit: u32,
    policy: ErrorLimitPolicy,
    throttle: Duration,
}

/// Forwards filtered container runtime events.
#[derive(Debug)]
pub struct DockerEventGenerator {
    settings: Arc<Settings>,
    built: bool,
}

enum Outcome {
    Closed,
    GiveUp,
    Reconnect,
}

impl DockerEventGenerator {
    /// Create the generator from its configuration.
    pub fn new(config: &DockerEventConfig) -> Result<Self, regex::Error> {
        let policy = config
            .error_limit_policy
            .as_deref()
            .unwrap_or_default()
            .parse::<ErrorLimitPolicy>()
            .unwrap_or_default();
        Ok(Self {
            settings: Arc::new(Settings {
                connection: docker_client::address_or_default(config.connection.as_deref())
                    .to_string(),
                filter: DockerFilter::from_config(config)?,
                error_limit: config
                    .error_limit
                    .filter(|l| *l > 0)
                    .unwrap_or(DEFAULT_ERROR_LIMIT),
                policy,
                throttle: config
                    .error_throttle
                    .filter(|t| !t.is_zero())
                    .unwrap_or(DEFAULT_ERROR_THROTTLE),
            }),
            built: false,
        })
    }

    pub(crate) fn from_input(input: &EventInput) -> Option<Box<dyn EventGenerator>> {
        let config = input.config.docker.as_ref()?;
        match Self::new(config) {
            Ok(generator) => Some(Box::new(generator)),
            Err(e) => {
                tracing::error!(job = %input.job, error = %e, "invalid docker event filter");
                None
            }
        }
    }
}

impl EventGenerator for DockerEventGenerator {
    fn build_tick_channel(&mut self) -> EventStream {
        if std::mem::replace(&mut self.built, true) {
            already_built();
        }

        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(listen(Arc::clone(&self.settings), tx));
        UnboundedReceiverStream::new(rx).boxed()
    }
}

async fn listen(settings: Arc<Settings>, tx: mpsc::UnboundedSender<EventData>) {
    loop {
        let docker = match docker_client::connect(&settings.connection) {
            Ok(docker) => docker,
            Err(e) => {
                tracing::warn!(connection = %settings.connection, error = %e, "failed to connect to docker");
                tokio::select! {
                    _ = tokio::time::sleep(settings.throttle) => continue,
                    _ = tx.closed() => return,
                }
            }
        };

        match forward(&settings, &docker, &tx).await {
            Outcome::Closed | Outcome::GiveUp => return,
            Outcome::Reconnect => continue,
        }
    }
}

async fn forward(
    settings: &Settings,
    docker: &Docker,
    tx: &mpsc::UnboundedSender<EventData>,
) -> Outcome {
    let feed = docker.events(None::<EventsOptions<String>>);
    tokio::pin!(feed);
    let mut errors: u32 = 0;

    loop {
        let item = tokio::select! {
            item = feed.next() => item,
            _ = tx.closed() => return Outcome::Closed,
        };

        let (error, feed_ended) = match item {
            Some(Ok(message)) => {
                errors = 0;
                tracing::trace!(?message, "received an event from docker");
                if let Some(event) = accept(&settings.filter, &message) {
                    if tx.send(event).is_err() {
                        return Outcome::Closed;
                    }
                }
                continue;
            }
            Some(Err(e)) => (e.to_string(), false),
            None => ("event feed closed".to_string(), true),
        };

        tracing::warn!(error = %error, "received an error from docker");
        errors += 1;
        if policy_applies(errors, settings.error_limit, feed_ended) {
            match settings.policy {
                ErrorLimitPolicy::GiveUp => {
                    tracing::warn!(
                        errors,
                        "too many consecutive errors from docker, giving up on this instance"
                    );
                    return Outcome::GiveUp;
                }
                ErrorLimitPolicy::Kill => {
                    tracing::error!(
                        errors,
                        "too many consecutive errors from docker, terminating the process"
                    );
                    std::process::exit(1);
                }
                ErrorLimitPolicy::Reconnect => {
                    tracing::warn!(
                        errors,
                        "too many consecutive errors from docker, reconnecting"
                    );
                    tokio::time::sleep(settings.throttle).await;
                    return Outcome::Reconnect;
                }
            }
        }
        tokio::time::sleep(settings.throttle).await;
    }
}

/// An ended feed yields nothing more, so the policy applies at once.
fn policy_applies(errors: u32, limit: u32, feed_ended: bool) -> bool {
    feed_ended || errors >= limit
}

fn accept(filter: &DockerFilter, message: &EventMessage) -> Option<EventData> {
    let action = message.action.as_deref().unwrap_or_default();
    let empty = HashMap::new();
    let actor = message.actor.as_ref();
    let attributes = actor
        .and_then(|a| a.attributes.as_ref())
        .unwrap_or(&empty);

    if !filter.matches(action, attributes) {
        return None;
    }

    let attributes: Map<String, Value> = attributes
        .iter()
        .map(|(k, v)| (k.clone(), Value::String(v.clone())))
        .collect();
    Some(
        EventData::new("docker")
            .with(
                "scope",
                message.scope.as_ref().map(|s| s.to_string()).unwrap_or_default(),
            )
            .with("action", action)
            .with(
                "actor",
                actor.and_then(|a| a.id.clone()).unwrap_or_default(),
            )
            .with("attributes", attributes),
    )
}
