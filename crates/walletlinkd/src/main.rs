//! # walletlinkd
//!
//! WalletLink relay daemon: loads settings, builds the event store and the
//! linking webhook, and serves the relay until ctrl-c or SIGTERM.

#![deny(unsafe_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use walletlink_core::logging::init_subscriber;
use walletlink_events::sqlite::ConnectionConfig;
use walletlink_events::{EventStore, MemoryEventStore, SqliteEventStore};
use walletlink_server::metrics::install_recorder;
use walletlink_server::{HttpWebhook, NoopWebhook, RelayServer, ServerConfig, Webhook};
use walletlink_settings::{
    RelaySettings, StoreBackend, StoreSettings, WebhookSettings, load_settings_from_path,
};

/// WalletLink relay server.
#[derive(Parser, Debug)]
#[command(name = "walletlinkd", version, about = "WalletLink relay server")]
struct Cli {
    /// JSON settings file, merged over the defaults.
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Host to bind.
    #[arg(long)]
    host: Option<String>,

    /// Port to bind (0 for auto-assign).
    #[arg(long)]
    port: Option<u16>,

    /// Event store backend: `memory` or `sqlite`.
    #[arg(long, value_parser = parse_backend)]
    store: Option<StoreBackend>,

    /// Path to the `SQLite` database.
    #[arg(long)]
    db_path: Option<PathBuf>,
}

fn parse_backend(val: &str) -> std::result::Result<StoreBackend, String> {
    StoreBackend::parse(val).ok_or_else(|| format!("unknown store backend {val:?}"))
}

/// CLI flags win over the settings file and the environment.
fn apply_cli(settings: &mut RelaySettings, cli: &Cli) {
    if let Some(host) = &cli.host {
        settings.server.host.clone_from(host);
    }
    if let Some(port) = cli.port {
        settings.server.port = port;
    }
    if let Some(backend) = cli.store {
        settings.store.backend = backend;
    }
    if let Some(path) = &cli.db_path {
        settings.store.path = path.to_string_lossy().into_owned();
    }
}

fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    Ok(())
}

fn build_store(settings: &StoreSettings) -> Result<Arc<dyn EventStore>> {
    match settings.backend {
        StoreBackend::Memory => {
            warn!("using in-memory event store; sessions are lost on restart");
            Ok(Arc::new(MemoryEventStore::new()))
        }
        StoreBackend::Sqlite => {
            let path = PathBuf::from(&settings.path);
            ensure_parent_dir(&path)?;
            let config = ConnectionConfig {
                pool_size: settings.pool_size.max(1),
                ..ConnectionConfig::default()
            };
            let store = SqliteEventStore::open(&path, &config)
                .with_context(|| format!("Failed to open event store: {}", path.display()))?;
            info!(path = %path.display(), pool_size = config.pool_size, "sqlite event store ready");
            Ok(Arc::new(store))
        }
    }
}

fn build_webhook(settings: &WebhookSettings) -> Result<Arc<dyn Webhook>> {
    match &settings.url {
        Some(url) => {
            let webhook = HttpWebhook::new(url.clone(), Duration::from_millis(settings.timeout_ms))
                .context("Failed to build webhook client")?;
            info!(url = %url, "linking webhook enabled");
            Ok(Arc::new(webhook))
        }
        None => Ok(Arc::new(NoopWebhook)),
    }
}

/// `(ttl, interval)` for the expiry sweep, or `None` when expiry is off.
fn janitor_schedule(settings: &StoreSettings) -> Option<(Duration, Duration)> {
    (settings.session_ttl_secs > 0).then(|| {
        (
            Duration::from_secs(settings.session_ttl_secs),
            Duration::from_secs(settings.expiry_interval_secs.max(1)),
        )
    })
}

/// Expire sessions idle longer than `ttl` every `every` until `token` fires.
async fn run_janitor(
    store: Arc<dyn EventStore>,
    ttl: Duration,
    every: Duration,
    token: CancellationToken,
) {
    let mut tick = tokio::time::interval(every);
    loop {
        tokio::select! {
            () = token.cancelled() => break,
            _ = tick.tick() => match store.purge_expired(ttl).await {
                Ok(0) => {}
                Ok(purged) => info!(purged, "expired idle sessions"),
                Err(e) => warn!(error = %e, "session expiry sweep failed"),
            },
        }
    }
}

async fn shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let mut term = signal(SignalKind::terminate()).context("Failed to listen for SIGTERM")?;
        tokio::select! {
            r = tokio::signal::ctrl_c() => r.context("Failed to listen for ctrl-c")?,
            _ = term.recv() => {}
        }
    }
    #[cfg(not(unix))]
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut settings =
        load_settings_from_path(cli.config.as_deref()).context("Failed to load settings")?;
    apply_cli(&mut settings, &cli);

    init_subscriber(&settings.logging.level, settings.logging.format);

    let store = build_store(&settings.store)?;
    let webhook = build_webhook(&settings.webhook)?;

    let config = ServerConfig::from(&settings.server);
    let mut server = RelayServer::new(config, store.clone(), webhook);
    match install_recorder() {
        Ok(handle) => server = server.with_metrics(handle),
        Err(e) => warn!(error = %e, "metrics disabled"),
    }

    let (addr, handle) = server.listen().await.context("Failed to bind server")?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        store = store.backend(),
        "WalletLink relay listening on http://{addr}"
    );

    if let Some((ttl, every)) = janitor_schedule(&settings.store) {
        let shutdown = server.shutdown();
        shutdown.spawn(run_janitor(store.clone(), ttl, every, shutdown.token()));
    }

    shutdown_signal().await?;

    info!("Shutting down...");
    if !server.shutdown_gracefully().await {
        warn!("some connections did not close in time");
    }
    let _ = handle.await;

    info!("Shutdown complete");
    Ok(())
}
