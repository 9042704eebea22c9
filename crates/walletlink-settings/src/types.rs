//! Settings tree for the relay daemon.
//!
//! Serialized as camelCase JSON. Every struct carries `#[serde(default)]` so a
//! partial settings file only needs the keys it overrides.

use serde::{Deserialize, Serialize};
use walletlink_core::logging::LogFormat;

/// Root settings object.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RelaySettings {
    /// HTTP / WebSocket listener settings.
    pub server: ServerSettings,
    /// Event store backend settings.
    pub store: StoreSettings,
    /// Linking webhook settings.
    pub webhook: WebhookSettings,
    /// Log output settings.
    pub logging: LoggingSettings,
}

/// Listener, transport, and broker settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Listen port.
    pub port: u16,
    /// Public URL of this server, reported to the webhook.
    pub server_url: String,
    /// Origins allowed by CORS. `"*"` allows any origin.
    pub allowed_origins: Vec<String>,
    /// Redirect plain-HTTP requests (per `X-Forwarded-Proto`) to HTTPS.
    pub force_ssl: bool,
    /// Directory of static assets served for unmatched paths.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub web_root: Option<String>,
    /// Largest accepted WebSocket message in bytes.
    pub max_message_size: usize,
    /// Seconds between server pings.
    pub heartbeat_interval_secs: u64,
    /// Seconds of silence after which a connection is closed.
    pub heartbeat_timeout_secs: u64,
    /// Per-subscriber broker buffer, in events.
    pub subscriber_buffer: usize,
    /// Upper bound on graceful shutdown, in seconds.
    pub shutdown_timeout_secs: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            server_url: "http://localhost:8080".to_string(),
            allowed_origins: vec!["*".to_string()],
            force_ssl: false,
            web_root: None,
            max_message_size: 1024 * 1024,
            heartbeat_interval_secs: 30,
            heartbeat_timeout_secs: 60,
            subscriber_buffer: 256,
            shutdown_timeout_secs: 10,
        }
    }
}

/// Which event store implementation to construct.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Process-local, lost on restart.
    #[default]
    Memory,
    /// `SQLite` file.
    Sqlite,
}

impl StoreBackend {
    /// Parse a backend name (case-insensitive).
    pub fn parse(val: &str) -> Option<Self> {
        match val.to_ascii_lowercase().as_str() {
            "memory" | "mem" => Some(Self::Memory),
            "sqlite" => Some(Self::Sqlite),
            _ => None,
        }
    }
}

/// Event store settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StoreSettings {
    /// Backend selection.
    pub backend: StoreBackend,
    /// `SQLite` database path (sqlite backend only).
    pub path: String,
    /// Connection pool size (sqlite backend only).
    pub pool_size: u32,
    /// Sessions idle longer than this lose their stored events. `0` disables expiry.
    pub session_ttl_secs: u64,
    /// Seconds between expiry sweeps.
    pub expiry_interval_secs: u64,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            path: "walletlink.db".to_string(),
            pool_size: 8,
            session_ttl_secs: 0,
            expiry_interval_secs: 300,
        }
    }
}

/// Linking webhook settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WebhookSettings {
    /// Endpoint notified when a session becomes linked. Absent disables it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Request timeout in milliseconds.
    pub timeout_ms: u64,
}

impl Default for WebhookSettings {
    fn default() -> Self {
        Self {
            url: None,
            timeout_ms: 5_000,
        }
    }
}

/// Log output settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default filter directive (overridden by `RUST_LOG`).
    pub level: String,
    /// Line format.
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let s = RelaySettings::default();
        assert_eq!(s.server.port, 8080);
        assert_eq!(s.server.allowed_origins, vec!["*".to_string()]);
        assert!(!s.server.force_ssl);
        assert_eq!(s.store.backend, StoreBackend::Memory);
        assert_eq!(s.store.session_ttl_secs, 0);
        assert!(s.webhook.url.is_none());
        assert_eq!(s.logging.level, "info");
    }

    #[test]
    fn serializes_camel_case() {
        let json = serde_json::to_value(RelaySettings::default()).unwrap();
        assert!(json["server"]["serverUrl"].is_string());
        assert!(json["server"]["maxMessageSize"].is_number());
        assert_eq!(json["store"]["backend"], "memory");
        assert!(json["webhook"].get("url").is_none());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let s: RelaySettings =
            serde_json::from_str(r#"{"store": {"backend": "sqlite"}}"#).unwrap();
        assert_eq!(s.store.backend, StoreBackend::Sqlite);
        assert_eq!(s.store.pool_size, 8);
        assert_eq!(s.server.port, 8080);
    }

    #[test]
    fn backend_parse() {
        assert_eq!(StoreBackend::parse("SQLite"), Some(StoreBackend::Sqlite));
        assert_eq!(StoreBackend::parse("memory"), Some(StoreBackend::Memory));
        assert_eq!(StoreBackend::parse("postgres"), None);
    }
}
