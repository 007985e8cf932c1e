//! API request handlers.

use axum::{
    Json,
    extract::{Path, Request, State},
    http::header,
    middleware::Next,
    response::{IntoResponse, Response},
};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

use crate::global::GlobalState;

use super::errors::ApiError;
use super::responses::{CounterResponse, EventListResponse, HealthResponse};

/// Counter of emit requests per event name.
pub const WEBSERVER_EVENTS_COUNTER: &str = "webserver_events";
/// Counter of listeners invoked by emit requests per event name.
pub const WEBSERVER_LISTENERS_COUNTER: &str = "webserver_event_listeners_invoked";

/// Shared application state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub global: Arc<GlobalState>,
    pub metrics: Option<PrometheusHandle>,
    pub credentials: Option<(String, String)>,
}

impl ApiState {
    /// State without metrics or authentication.
    pub fn new(global: Arc<GlobalState>) -> Self {
        Self {
            global,
            metrics: None,
            credentials: None,
        }
    }

    /// Expose `/metrics` through `handle`.
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// Require HTTP basic auth.
    pub fn with_credentials(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials = Some((user.into(), password.into()));
        self
    }
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse::default())
}

/// Dispatch a named web event to every registered listener.
pub async fn emit(
    State(state): State<ApiState>,
    Path(event): Path<String>,
) -> Result<String, ApiError> {
    let listeners = state.global.event_listeners(&event);
    if listeners.is_empty() {
        tracing::warn!(event = %event, "event not found");
        return Err(ApiError::NotFound(format!("event: '{}' not found", event)));
    }

    let counters = state.global.counters();
    let labels = [("event_name", event.as_str())];
    counters.increment(WEBSERVER_EVENTS_COUNTER, labels, 1);
    counters.increment(WEBSERVER_LISTENERS_COUNTER, labels, listeners.len() as u64);

    let count = listeners.len();
    for listener in listeners {
        tokio::spawn(async move { listener() });
    }
    tracing::info!(event = %event, listeners = count, "event emitted");
    Ok(format!(
        "event: '{}' emitted, {} listeners where found",
        event, count
    ))
}

/// List the web events that have listeners.
pub async fn list_events(State(state): State<ApiState>) -> Json<EventListResponse> {
    Json(EventListResponse::from(state.global.event_names()))
}

/// Snapshot of every counter as JSON.
pub async fn list_counters(State(state): State<ApiState>) -> Json<Vec<CounterResponse>> {
    let counters = state
        .global
        .counters()
        .snapshot()
        .into_iter()
        .map(|(key, value)| CounterResponse {
            name: key.name().to_string(),
            labels: key.labels().clone(),
            value,
        })
        .collect();
    Json(counters)
}

/// Prometheus exposition of every counter.
pub async fn metrics(State(state): State<ApiState>) -> Result<String, ApiError> {
    match &state.metrics {
        Some(handle) => Ok(handle.render()),
        None => Err(ApiError::NotFound(
            "Metrics are disabled, please enable metrics using `webserver.metrics: true`"
                .to_string(),
        )),
    }
}

/// Reject requests without the configured basic auth credentials.
pub async fn basic_auth(
    State(state): State<ApiState>,
    request: Request,
    next: Next,
) -> Response {
    let Some((user, password)) = &state.credentials else {
        return next.run(request).await;
    };

    let provided = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Basic "))
        .and_then(|encoded| STANDARD.decode(encoded).ok())
        .and_then(|decoded| String::from_utf8(decoded).ok());

    let authorized = provided
        .as_deref()
        .and_then(|pair| pair.split_once(':'))
        .is_some_and(|(u, p)| u == user && p == password);

    if !authorized {
        tracing::debug!(path = %request.uri().path(), "rejected unauthenticated request");
        return ApiError::Unauthorized.into_response();
    }
    next.run(request).await
}
