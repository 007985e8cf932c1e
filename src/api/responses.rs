//! API response types.

use serde::Serialize;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self {
            status: "ok",
            version: env!("CARGO_PKG_VERSION"),
        }
    }
}

/// Registered web events.
#[derive(Debug, Serialize)]
pub struct EventListResponse {
    pub events: Vec<String>,
    pub total: usize,
}

impl From<Vec<String>> for EventListResponse {
    fn from(events: Vec<String>) -> Self {
        Self {
            total: events.len(),
            events,
        }
    }
}

/// One metric counter.
#[derive(Debug, Serialize)]
pub struct CounterResponse {
    pub name: String,
    pub labels: std::collections::BTreeMap<String, String>,
    pub value: u64,
}
