//! Prometheus metrics recorder and metric names.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the Prometheus recorder as the global `metrics` recorder.
///
/// Returns the handle that renders `/metrics`. Call once at startup.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// WebSocket connections opened (counter, labels: role).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// Active WebSocket connections (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
/// WebSocket disconnections (counter, labels: role).
pub const WS_DISCONNECTIONS_TOTAL: &str = "ws_disconnections_total";
/// Connection lifetime (histogram).
pub const WS_CONNECTION_DURATION_SECONDS: &str = "ws_connection_duration_seconds";
/// Events appended to the store (counter, labels: role).
pub const RELAY_EVENTS_APPENDED_TOTAL: &str = "relay_events_appended_total";
/// Events written to subscriber sockets (counter, labels: role).
pub const RELAY_EVENTS_DELIVERED_TOTAL: &str = "relay_events_delivered_total";
/// Subscribers evicted for a full buffer (counter, labels: role).
pub const RELAY_SUBSCRIBERS_LAGGED_TOTAL: &str = "relay_subscribers_lagged_total";
/// Events served from the store rather than live fan-out (counter).
pub const RELAY_REPLAYED_EVENTS_TOTAL: &str = "relay_replayed_events_total";
/// Failed store operations (counter).
pub const RELAY_STORE_ERRORS_TOTAL: &str = "relay_store_errors_total";
/// Failed webhook notifications (counter).
pub const RELAY_WEBHOOK_FAILURES_TOTAL: &str = "relay_webhook_failures_total";
/// Sessions that became linked (counter).
pub const RELAY_SESSIONS_LINKED_TOTAL: &str = "relay_sessions_linked_total";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_without_global_install() {
        let handle = PrometheusBuilder::new().build_recorder().handle();
        let output = handle.render();
        assert!(output.is_empty() || output.contains('\n'));
    }

    #[test]
    fn metric_names_are_snake_case() {
        let names = [
            WS_CONNECTIONS_TOTAL,
            WS_CONNECTIONS_ACTIVE,
            WS_DISCONNECTIONS_TOTAL,
            WS_CONNECTION_DURATION_SECONDS,
            RELAY_EVENTS_APPENDED_TOTAL,
            RELAY_EVENTS_DELIVERED_TOTAL,
            RELAY_SUBSCRIBERS_LAGGED_TOTAL,
            RELAY_REPLAYED_EVENTS_TOTAL,
            RELAY_STORE_ERRORS_TOTAL,
            RELAY_WEBHOOK_FAILURES_TOTAL,
            RELAY_SESSIONS_LINKED_TOTAL,
        ];
        for name in names {
            assert!(
                name.chars().all(|c| c.is_ascii_lowercase() || c == '_'),
                "{name}"
            );
        }
    }
}
