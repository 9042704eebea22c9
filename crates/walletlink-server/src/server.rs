//! `RelayServer`: axum HTTP + WebSocket server.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::rejection::QueryRejection;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::{Query, Request, State};
use axum::http::{HeaderValue, StatusCode, header};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Json, Redirect, Response};
use axum::routing::get;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};
use walletlink_core::{RelayError, Role};
use walletlink_events::EventStore;

use crate::config::ServerConfig;
use crate::health::{self, HealthResponse};
use crate::hub::RelayHub;
use crate::protocol::{ConnectParams, ConnectQuery};
use crate::shutdown::ShutdownCoordinator;
use crate::webhook::Webhook;
use crate::websocket::session::{SessionContext, run_relay_session};
use crate::websocket::writer::Heartbeat;

/// Shared state accessible from axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Store, brokers, webhook, and connection registry.
    pub hub: Arc<RelayHub>,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Shutdown coordinator.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// When the server started.
    pub start_time: Instant,
    /// Prometheus handle for `/metrics`, when a recorder is installed.
    pub metrics: Option<PrometheusHandle>,
}

/// The WalletLink relay server.
pub struct RelayServer {
    config: Arc<ServerConfig>,
    hub: Arc<RelayHub>,
    shutdown: Arc<ShutdownCoordinator>,
    start_time: Instant,
    metrics: Option<PrometheusHandle>,
}

impl RelayServer {
    /// Create a server over a constructed store and webhook.
    pub fn new(config: ServerConfig, store: Arc<dyn EventStore>, webhook: Arc<dyn Webhook>) -> Self {
        let hub = RelayHub::new(
            store,
            webhook,
            config.server_url.clone(),
            config.subscriber_buffer,
        );
        Self {
            config: Arc::new(config),
            hub: Arc::new(hub),
            shutdown: Arc::new(ShutdownCoordinator::new()),
            start_time: Instant::now(),
            metrics: None,
        }
    }

    /// Serve `/metrics` from `handle`.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// Build the axum router with all routes and layers.
    pub fn router(&self) -> Router {
        let state = AppState {
            hub: self.hub.clone(),
            config: self.config.clone(),
            shutdown: self.shutdown.clone(),
            start_time: self.start_time,
            metrics: self.metrics.clone(),
        };

        let mut router = Router::new()
            .route("/", get(root_handler))
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .route("/rpc/agent", get(agent_handler))
            .route("/rpc/signer", get(signer_handler));
        if let Some(web_root) = &self.config.web_root {
            router = router.fallback_service(ServeDir::new(web_root));
        }

        let mut router = router
            .with_state(state)
            .layer(cors_layer(&self.config.allowed_origins))
            .layer(TraceLayer::new_for_http());
        if self.config.force_ssl {
            router = router.layer(middleware::from_fn(redirect_to_https));
        }
        router
    }

    /// Bind and serve in the background. Returns the bound address and the
    /// serve task, which ends once shutdown is signalled.
    pub async fn listen(&self) -> io::Result<(SocketAddr, JoinHandle<()>)> {
        let listener = TcpListener::bind((self.config.host.as_str(), self.config.port)).await?;
        let addr = listener.local_addr()?;
        let router = self.router();
        let token = self.shutdown.token();

        info!(%addr, store = self.hub.store.backend(), "relay server listening");
        let handle = tokio::spawn(async move {
            let serve = axum::serve(listener, router)
                .with_graceful_shutdown(async move { token.cancelled().await });
            if let Err(e) = serve.await {
                error!(error = %e, "server error");
            }
        });
        Ok((addr, handle))
    }

    /// Stop accepting connections, tell live ones to close, and wait for
    /// them up to the configured timeout. Returns `false` on timeout.
    pub async fn shutdown_gracefully(&self) -> bool {
        info!("relay server shutting down");
        self.shutdown
            .graceful_shutdown(self.config.shutdown_timeout)
            .await
    }

    /// Shared relay core.
    pub fn hub(&self) -> &Arc<RelayHub> {
        &self.hub
    }

    /// Shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if allowed_origins.iter().any(|o| o == "*") {
        return layer.allow_origin(Any);
    }
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                warn!(origin = %o, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(origins))
}

/// Redirect requests that reached a TLS-terminating proxy over plain HTTP.
async fn redirect_to_https(req: Request, next: Next) -> Response {
    let insecure = req
        .headers()
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|proto| proto.eq_ignore_ascii_case("http"));
    if insecure && req.uri().path() != "/health" {
        if let Some(host) = req.headers().get(header::HOST).and_then(|v| v.to_str().ok()) {
            let path = req.uri().path_and_query().map_or("/", |pq| pq.as_str());
            return Redirect::permanent(&format!("https://{host}{path}")).into_response();
        }
    }
    next.run(req).await
}

/// GET /
async fn root_handler() -> &'static str {
    "WalletLink relay\n"
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health::health_check(
        state.start_time,
        state.shutdown.is_shutting_down(),
        state.hub.connections.count(),
        state.hub.total_subscriptions(),
        state.hub.store.backend(),
    ))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => handle.render().into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

/// GET /rpc/agent
async fn agent_handler(
    State(state): State<AppState>,
    query: Result<Query<ConnectQuery>, QueryRejection>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    connect(Role::Agent, &state, query, ws).await
}

/// GET /rpc/signer
async fn signer_handler(
    State(state): State<AppState>,
    query: Result<Query<ConnectQuery>, QueryRejection>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    connect(Role::Signer, &state, query, ws).await
}

/// A resume cursor past the opposite stream would skip events the client
/// never saw, so it is refused instead of silently dovetailed.
async fn check_cursor(hub: &RelayHub, role: Role, params: &ConnectParams) -> Result<(), RelayError> {
    if params.last_seen_sequence == 0 {
        return Ok(());
    }
    let latest = hub
        .store
        .latest_sequence(&params.session_id, role.opposite())
        .await?;
    if params.last_seen_sequence > latest {
        return Err(RelayError::BadRequest(format!(
            "lastSeenSequence {} is ahead of the stream (latest {latest})",
            params.last_seen_sequence
        )));
    }
    Ok(())
}

/// Validate a connect request and hand the upgraded socket to the session
/// driver. Malformed queries are rejected before any store call.
async fn connect(
    role: Role,
    state: &AppState,
    query: Result<Query<ConnectQuery>, QueryRejection>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    if state.shutdown.is_shutting_down() {
        return RelayError::ShuttingDown.into_response();
    }
    let query = match query {
        Ok(Query(q)) => q,
        Err(e) => return RelayError::BadRequest(e.body_text()).into_response(),
    };
    let params = match ConnectParams::parse(&query) {
        Ok(p) => p,
        Err(e) => {
            debug!(%role, error = %e, "rejected connect request");
            return e.into_response();
        }
    };
    if let Err(e) = check_cursor(&state.hub, role, &params).await {
        debug!(%role, error = %e, "rejected resume cursor");
        return e.into_response();
    }
    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => return rejection.into_response(),
    };

    let ctx = SessionContext {
        hub: state.hub.clone(),
        role,
        params,
        heartbeat: Heartbeat {
            interval: state.config.heartbeat_interval,
            timeout: state.config.heartbeat_timeout,
        },
        shutdown: state.shutdown.token(),
    };
    let shutdown = state.shutdown.clone();
    ws.max_message_size(state.config.max_message_size)
        .on_upgrade(move |socket| shutdown.track(run_relay_session(socket, ctx)))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
