//! `/health` endpoint body.

use std::time::Instant;

use serde::Serialize;

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// `"ok"`, or `"shutting_down"` once shutdown has begun.
    pub status: &'static str,
    /// Seconds since the server started.
    pub uptime_secs: u64,
    /// Open relay connections.
    pub connections: usize,
    /// Live broker subscriptions across both roles.
    pub subscriptions: usize,
    /// Event store backend name.
    pub store_backend: &'static str,
}

/// Build a health response from live counters.
pub fn health_check(
    start_time: Instant,
    shutting_down: bool,
    connections: usize,
    subscriptions: usize,
    store_backend: &'static str,
) -> HealthResponse {
    HealthResponse {
        status: if shutting_down { "shutting_down" } else { "ok" },
        uptime_secs: start_time.elapsed().as_secs(),
        connections,
        subscriptions,
        store_backend,
    }
}
