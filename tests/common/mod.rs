//! Common test utilities shared across integration tests.

#![allow(dead_code)]

use axum::Router;
use crontab::{Config, GlobalState, JobRunner, RunnerHandle, YamlLoader};
use std::sync::Arc;
use std::time::Duration;

/// Parse a configuration document, panicking on invalid input.
pub fn config(yaml: &str) -> Config {
    YamlLoader::parse_config(yaml).unwrap()
}

/// Compile every job of `config` and start the runner.
pub fn start(config: &Config, state: &Arc<GlobalState>) -> RunnerHandle {
    let mut runner = JobRunner::new(Arc::clone(state));
    runner.add_all(&config.jobs).unwrap();
    runner.start()
}

/// Wait for a counter to reach at least `expected`, polling the state.
///
/// This is more reliable than fixed sleeps since execution time can vary.
///
/// # Panics
///
/// Panics if the timeout is reached before the counter gets there.
pub async fn wait_for_counter(
    state: &GlobalState,
    name: &str,
    labels: &[(&str, &str)],
    expected: u64,
    timeout: Duration,
) -> u64 {
    let start = tokio::time::Instant::now();
    loop {
        let value = state.counters().get(name, labels.iter().copied());
        if value >= expected {
            return value;
        }
        if start.elapsed() > timeout {
            panic!(
                "Timeout waiting for {}{:?} to reach {}, current value: {}",
                name, labels, expected, value
            );
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Serve `router` on an ephemeral local port and return its base URL.
pub async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, router).await.unwrap() });
    format!("http://{}", addr)
}
