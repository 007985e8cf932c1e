//! Container engine client construction.

use bollard::{API_DEFAULT_VERSION, Docker};

/// Engine address used when none is configured.
pub const DEFAULT_DOCKER_HOST: &str = "unix:///var/run/docker.sock";

/// Request timeout of the engine client, in seconds.
const CLIENT_TIMEOUT_SECS: u64 = 120;

/// Connect to the engine at `addr` (`unix://`, `tcp://` or `http://`).
pub fn connect(addr: &str) -> Result<Docker, bollard::errors::Error> {
    let addr = if addr.is_empty() {
        DEFAULT_DOCKER_HOST
    } else {
        addr
    };
    tracing::trace!(address = addr, "connecting to docker");

    if addr.starts_with("unix://") {
        return connect_unix(addr);
    }

    if addr.starts_with("tcp://") || addr.starts_with("http://") {
        return Docker::connect_with_http(addr, CLIENT_TIMEOUT_SECS, API_DEFAULT_VERSION);
    }

    Docker::connect_with_local_defaults()
}

#[cfg(unix)]
fn connect_unix(addr: &str) -> Result<Docker, bollard::errors::Error> {
    Docker::connect_with_unix(addr, CLIENT_TIMEOUT_SECS, API_DEFAULT_VERSION)
}

#[cfg(not(unix))]
fn connect_unix(_addr: &str) -> Result<Docker, bollard::errors::Error> {
    Docker::connect_with_local_defaults()
}

/// Configured engine address, or [`DEFAULT_DOCKER_HOST`] when unset or empty.
pub fn address_or_default(configured: Option<&str>) -> &str {
    configured
        .filter(|c| !c.is_empty())
        .unwrap_or(DEFAULT_DOCKER_HOST)
}
