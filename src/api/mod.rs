//! HTTP surface of the daemon.
//!
//! Lets an operator dispatch named web events and exposes health and
//! metrics endpoints. Basic auth is enforced on every route when configured.

mod errors;
mod handlers;
mod responses;

pub use errors::{ApiError, ErrorResponse};
pub use handlers::{ApiState, WEBSERVER_EVENTS_COUNTER, WEBSERVER_LISTENERS_COUNTER};
pub use responses::*;

use axum::{
    Router, middleware,
    routing::{any, get},
};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::WebServerConfig;

/// Build the API router with all endpoints.
pub fn build_router(state: ApiState) -> Router {
    if state.credentials.is_none() {
        tracing::warn!("webserver has no basic auth configured, every endpoint is public");
    }

    Router::new()
        .route("/health", get(handlers::health))
        .route("/metrics", get(handlers::metrics))
        .route("/events", get(handlers::list_events))
        .route("/events/{event}/emit", any(handlers::emit))
        .route("/counters", get(handlers::list_counters))
        // Middleware
        .layer(middleware::from_fn_with_state(
            state.clone(),
            handlers::basic_auth,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Install the process-wide Prometheus recorder.
///
/// Can only succeed once per process.
pub fn install_metrics() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}

/// Socket address of the configured server.
pub fn socket_addr(config: &WebServerConfig) -> std::io::Result<SocketAddr> {
    format!("{}:{}", config.address, config.port)
        .parse()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))
}

/// Start the API server.
///
/// The server runs until `shutdown` is cancelled.
pub async fn start_server(
    config: &WebServerConfig,
    state: ApiState,
    shutdown: CancellationToken,
) -> std::io::Result<tokio::task::JoinHandle<()>> {
    let router = build_router(state);
    let addr = socket_addr(config)?;

    let listener = TcpListener::bind(addr).await?;
    tracing::info!("API server listening on http://{}", listener.local_addr()?);

    let handle = tokio::spawn(async move {
        let served = axum::serve(listener, router)
            .with_graceful_shutdown(shutdown.cancelled_owned())
            .await;
        if let Err(e) = served {
            tracing::error!("API server error: {}", e);
        }
    });

    Ok(handle)
}
