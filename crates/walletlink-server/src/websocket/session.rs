//! Connection lifecycle for one relay client, from upgrade to close.
//!
//! ```text
//! CONNECTING → REPLAYING → LIVE → CLOSED
//! ```
//!
//! The broker subscription is taken before anything else so that no live
//! event can slip between replay and live delivery. Three tasks then share
//! the connection: the reader (this task) handles publishes, the delivery
//! task replays and streams events, and the writer owns the socket. A
//! per-connection token, a child of the server's shutdown token, stops all
//! three; the subscription drops with the delivery task.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::ws::{Message, WebSocket};
use futures::StreamExt;
use metrics::{counter, gauge, histogram};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use walletlink_core::{RelayError, Role};

use super::connection::RelayConnection;
use super::delivery::Delivery;
use super::writer::{Control, Heartbeat, run_writer};
use crate::hub::RelayHub;
use crate::metrics::{
    RELAY_EVENTS_APPENDED_TOTAL, RELAY_SESSIONS_LINKED_TOTAL, RELAY_STORE_ERRORS_TOTAL,
    WS_CONNECTION_DURATION_SECONDS, WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL,
    WS_DISCONNECTIONS_TOTAL,
};
use crate::protocol::{ClientFrame, ConnectParams, ServerFrame};
use crate::webhook::notify_linked;

/// Outbound delivery queue depth per connection.
const DELIVERY_QUEUE: usize = 64;

/// How long cleanup waits for the writer to flush its close frame.
const WRITER_GRACE: Duration = Duration::from_secs(5);

/// Everything a session needs besides the socket.
#[derive(Clone)]
pub struct SessionContext {
    /// Shared relay core.
    pub hub: Arc<RelayHub>,
    /// This connection's role.
    pub role: Role,
    /// Validated connect parameters.
    pub params: ConnectParams,
    /// Heartbeat timing.
    pub heartbeat: Heartbeat,
    /// Server-wide shutdown token.
    pub shutdown: CancellationToken,
}

/// Run one relay connection to completion.
#[instrument(skip_all, fields(role = %ctx.role, session_id = %ctx.params.session_id))]
pub async fn run_relay_session(ws: WebSocket, ctx: SessionContext) {
    let SessionContext {
        hub,
        role,
        params,
        heartbeat,
        shutdown,
    } = ctx;
    let session_id = params.session_id.clone();

    // CONNECTING
    let conn = Arc::new(RelayConnection::new(role, session_id.clone()));
    let _registration = hub.connections.register(conn.clone());
    let subscription = hub.broker(role).subscribe(&session_id);
    let started = Instant::now();
    info!(conn_id = %conn.id, last_seen = params.last_seen_sequence, "client connected");
    counter!(WS_CONNECTIONS_TOTAL, "role" => role.as_str()).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);

    let conn_token = shutdown.child_token();
    let (ws_tx, mut ws_rx) = ws.split();
    let (control_tx, control_rx) = mpsc::unbounded_channel::<Control>();
    let (delivery_tx, delivery_rx) = mpsc::channel::<ServerFrame>(DELIVERY_QUEUE);

    let mut writer = tokio::spawn(run_writer(
        ws_tx,
        control_rx,
        delivery_rx,
        conn.clone(),
        heartbeat,
        conn_token.clone(),
        shutdown.clone(),
    ));

    // REPLAYING → LIVE
    let delivery = Delivery::new(
        hub.store.clone(),
        hub.broker(role).clone(),
        session_id.clone(),
        role,
        params.last_seen_sequence,
        delivery_tx,
    );
    let delivery_token = conn_token.clone();
    let delivery_control = control_tx.clone();
    let delivery_task = tokio::spawn(async move {
        let result = tokio::select! {
            r = delivery.run(subscription) => r,
            () = delivery_token.cancelled() => Ok(()),
        };
        match result {
            Ok(()) | Err(RelayError::Transport(_)) => delivery_token.cancel(),
            Err(e) => {
                warn!(error = %e, "delivery failed");
                let _ = delivery_control.send(Control::Close(e));
            }
        }
    });

    loop {
        let msg = tokio::select! {
            () = conn_token.cancelled() => break,
            msg = ws_rx.next() => msg,
        };
        let text = match msg {
            Some(Ok(msg)) => {
                conn.mark_alive();
                match msg {
                    Message::Text(t) => t.as_str().to_owned(),
                    Message::Binary(data) => match String::from_utf8(data.to_vec()) {
                        Ok(s) => s,
                        Err(_) => {
                            let err = RelayError::ProtocolViolation("binary frame is not UTF-8".into());
                            let _ = control_tx.send(Control::Close(err));
                            break;
                        }
                    },
                    Message::Ping(_) | Message::Pong(_) => continue,
                    Message::Close(_) => {
                        debug!("client sent close frame");
                        break;
                    }
                }
            }
            Some(Err(e)) => {
                debug!(error = %e, "read failed");
                break;
            }
            None => break,
        };

        match ClientFrame::decode(&text) {
            Ok(ClientFrame::Publish {
                payload,
                request_id,
            }) => {
                let reply = publish(&hub, role, &params, payload, request_id).await;
                let _ = control_tx.send(Control::Frame(reply));
            }
            Err(e) => {
                warn!(error = %e, "closing connection on protocol violation");
                let _ = control_tx.send(Control::Close(e));
                break;
            }
        }
    }

    // CLOSED
    drop(control_tx);
    conn_token.cancel();
    let _ = delivery_task.await;
    match tokio::time::timeout(WRITER_GRACE, &mut writer).await {
        Ok(Ok(exit)) => debug!(?exit, "writer finished"),
        Ok(Err(e)) => warn!(error = %e, "writer task failed"),
        Err(_) => {
            warn!("writer did not finish, aborting");
            writer.abort();
        }
    }

    info!(conn_id = %conn.id, "client disconnected");
    counter!(WS_DISCONNECTIONS_TOTAL, "role" => role.as_str()).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
    histogram!(WS_CONNECTION_DURATION_SECONDS).record(started.elapsed().as_secs_f64());
}

/// Append a payload and fan it out to the opposite role. Returns the frame
/// acknowledging the publish.
async fn publish(
    hub: &RelayHub,
    role: Role,
    params: &ConnectParams,
    payload: String,
    request_id: Option<String>,
) -> ServerFrame {
    let session_id = &params.session_id;
    match hub.store.append_event(session_id, role, payload).await {
        Ok(outcome) => {
            counter!(RELAY_EVENTS_APPENDED_TOTAL, "role" => role.as_str()).increment(1);
            let event = Arc::new(outcome.event);
            let sequence = event.sequence;
            let delivered = hub.broker(role.opposite()).publish(&event);
            debug!(sequence, delivered, "published");

            if outcome.became_linked {
                info!("session linked");
                counter!(RELAY_SESSIONS_LINKED_TOTAL).increment(1);
                notify_linked(hub.webhook.clone(), hub.server_url.clone(), session_id.clone());
            }
            ServerFrame::PublishAck {
                request_id,
                sequence_number: sequence,
            }
        }
        Err(e) => {
            counter!(RELAY_STORE_ERRORS_TOTAL).increment(1);
            let err = RelayError::from(e);
            warn!(error = %err, "publish failed");
            ServerFrame::publish_failed(request_id, &err)
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
