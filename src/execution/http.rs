//! HTTP GET and POST tasks.
//!
//! Transport errors and responses with a status of 400 or above fail the
//! attempt and go through the same retry loop as commands. The
//! response body is only read when debug logging is enabled.

use async_trait::async_trait;
use reqwest::Client;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use super::command::TASK_ATTEMPTS_COUNTER;
use crate::config::TaskConfig;
use crate::core::hooked::Hooked;
use crate::core::retry::RetryPolicy;
use crate::core::scope::ExecutionScope;
use crate::core::task::{Task, TaskError};
use crate::core::timeout::{Cancelable, Timeout};
use crate::core::types::TaskId;
use crate::global::GlobalState;

/// Request method of an [`HttpTask`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HttpMethod::Get => write!(f, "get"),
            HttpMethod::Post => write!(f, "post"),
        }
    }
}

/// A task that sends one HTTP request per attempt.
pub struct HttpTask {
    id: TaskId,
    method: HttpMethod,
    url: String,
    headers: HashMap<String, String>,
    data: Option<serde_json::Value>,
    client: Client,
    retry_policy: RetryPolicy,
    timeout: Timeout,
    cancel: Cancelable,
    hooks: Hooked,
    state: Arc<GlobalState>,
}

impl HttpTask {
    /// Build a request task for `url`.
    pub fn new(method: HttpMethod, url: impl Into<String>, state: Arc<GlobalState>) -> Self {
        let url = url.into();
        let id = TaskId::new(url.clone());
        Self {
            hooks: Hooked::new(id.clone(), Arc::clone(&state)),
            id,
            method,
            url,
            headers: HashMap::new(),
            data: None,
            client: Client::new(),
            retry_policy: RetryPolicy::default(),
            timeout: Timeout::default(),
            cancel: Cancelable::new(),
            state,
        }
    }

    /// Build from a task configuration with a `get` or `post` field.
    pub fn from_config(config: &TaskConfig, hooks: Hooked, state: Arc<GlobalState>) -> Option<Self> {
        let (method, url) = match (&config.get, &config.post) {
            (Some(url), _) if !url.is_empty() => (HttpMethod::Get, url),
            (_, Some(url)) if !url.is_empty() => (HttpMethod::Post, url),
            _ => return None,
        };
        let mut task = Self::new(method, url.clone(), state)
            .with_hooks(hooks)
            .with_retry_policy(RetryPolicy::linear(
                config.retries,
                config.retry_delay.unwrap_or_default(),
            ))
            .with_timeout(config.timeout);
        task.headers = config.headers.clone().unwrap_or_default();
        task.data = config.data.clone();
        Some(task)
    }

    /// Builder: add a header.
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Builder: JSON body of a POST request.
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Builder: retry policy.
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Builder: per-attempt timeout.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = Timeout::new(timeout);
        self
    }

    /// Builder: done and fail hooks.
    pub fn with_hooks(mut self, hooks: Hooked) -> Self {
        self.hooks = hooks;
        self
    }

    /// Request method.
    pub fn method(&self) -> HttpMethod {
        self.method
    }

    async fn send(&self) -> Result<(), TaskError> {
        let mut request = match self.method {
            HttpMethod::Get => self.client.get(&self.url),
            HttpMethod::Post => self.client.post(&self.url),
        };
        for (key, value) in &self.headers {
            request = request.header(key, value);
        }
        if let (HttpMethod::Post, Some(data)) = (self.method, &self.data) {
            request = request.json(data);
        }

        tracing::debug!(task = %self.id, method = %self.method, "sending http request");
        let response = request.send().await?;
        let status = response.status();
        tracing::info!(task = %self.id, status = status.as_u16(), "received response");

        if tracing::enabled!(tracing::Level::DEBUG) {
            match response.text().await {
                Ok(body) => tracing::debug!(task = %self.id, body = %body, "response body"),
                Err(e) => tracing::debug!(task = %self.id, error = %e, "cannot read response body"),
            }
        }

        if status.as_u16() >= 400 {
            return Err(TaskError::HttpStatus {
                status: status.as_u16(),
                url: self.url.clone(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Task for HttpTask {
    fn id(&self) -> &TaskId {
        &self.id
    }

    async fn execute(&self, scope: ExecutionScope) -> Result<(), TaskError> {
        let mut scope = scope;
        loop {
            let attempt = scope.retries();
            if let Err(e) = self.retry_policy.wait_for_retry(&scope).await {
                tracing::warn!(task = %self.id, attempt, "maximum retry reached");
                self.hooks.do_fail_hooks(&scope).await;
                return Err(e);
            }

            let mut labels = vec![("task", self.id.as_str())];
            if let Some(job) = scope.job() {
                labels.push(("job", job.as_str()));
            }
            self.state
                .counters()
                .increment(TASK_ATTEMPTS_COUNTER, labels, 1);

            let next = scope.increase_retry();
            let window = self.timeout.apply(next.cancellation());
            self.cancel.set(window.token().clone());

            match window.run(self.send()).await {
                Ok(()) => break,
                Err(e) => {
                    tracing::warn!(task = %self.id, attempt, error = %e, "request failed");
                    scope = next;
                }
            }
        }

        if !self.hooks.do_done_hooks(&scope).await.is_empty() {
            tracing::warn!(task = %self.id, "request finished successfully but its hooks failed");
        }
        Ok(())
    }

    fn cancel(&self) {
        tracing::debug!(task = %self.id, method = %self.method, "canceling request");
        self.cancel.cancel();
    }

    fn retry_policy(&self) -> RetryPolicy {
        self.retry_policy.clone()
    }
}

impl fmt::Debug for HttpTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpTask")
            .field("method", &self.method)
            .field("url", &self.url)
            .field("retry_policy", &self.retry_policy)
            .field("timeout", &self.timeout)
            .finish()
    }
}
