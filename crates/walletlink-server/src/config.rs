//! Server configuration.

use std::time::Duration;

use walletlink_settings::ServerSettings;

/// Runtime configuration for [`RelayServer`](crate::server::RelayServer).
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// Public URL reported to the linking webhook.
    pub server_url: String,
    /// CORS origins; `"*"` allows any.
    pub allowed_origins: Vec<String>,
    /// Redirect plain-HTTP requests to HTTPS.
    pub force_ssl: bool,
    /// Static asset directory served for unmatched paths.
    pub web_root: Option<String>,
    /// Max WebSocket message size in bytes.
    pub max_message_size: usize,
    /// Interval between server pings.
    pub heartbeat_interval: Duration,
    /// Close a connection silent for this long.
    pub heartbeat_timeout: Duration,
    /// Per-subscriber broker buffer.
    pub subscriber_buffer: usize,
    /// Upper bound on graceful shutdown.
    pub shutdown_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            server_url: "http://localhost".into(),
            allowed_origins: vec!["*".into()],
            force_ssl: false,
            web_root: None,
            max_message_size: 1024 * 1024,
            heartbeat_interval: Duration::from_secs(30),
            heartbeat_timeout: Duration::from_secs(60),
            subscriber_buffer: 256,
            shutdown_timeout: Duration::from_secs(10),
        }
    }
}

impl From<&ServerSettings> for ServerConfig {
    fn from(s: &ServerSettings) -> Self {
        Self {
            host: s.host.clone(),
            port: s.port,
            server_url: s.server_url.clone(),
            allowed_origins: s.allowed_origins.clone(),
            force_ssl: s.force_ssl,
            web_root: s.web_root.clone(),
            max_message_size: s.max_message_size,
            heartbeat_interval: Duration::from_secs(s.heartbeat_interval_secs),
            heartbeat_timeout: Duration::from_secs(s.heartbeat_timeout_secs),
            subscriber_buffer: s.subscriber_buffer.max(1),
            shutdown_timeout: Duration::from_secs(s.shutdown_timeout_secs),
        }
    }
}
