//! Outbound half of a connection: the only task that writes to the socket.
//!
//! Two queues feed it. Control frames (acks, errors) are unbounded and always
//! served first so that a backlog of deliveries never delays a publisher's
//! acknowledgement; deliveries are bounded so a slow socket pushes back on
//! this connection's delivery task only. The same loop sends heartbeat pings
//! and closes connections that have gone silent.

use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, close_code};
use futures::{Sink, SinkExt};
use metrics::counter;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use walletlink_core::RelayError;

use super::connection::RelayConnection;
use crate::metrics::RELAY_EVENTS_DELIVERED_TOTAL;
use crate::protocol::ServerFrame;

/// Instruction for the writer from the reader or delivery task.
#[derive(Debug)]
pub enum Control {
    /// Send a frame.
    Frame(ServerFrame),
    /// Send an `error` frame for this error, then close.
    Close(RelayError),
}

/// Heartbeat timing.
#[derive(Clone, Copy, Debug)]
pub struct Heartbeat {
    /// Interval between pings.
    pub interval: Duration,
    /// Close after this much inbound silence.
    pub timeout: Duration,
}

/// Why the writer stopped.
#[derive(Debug, PartialEq, Eq)]
pub enum WriterExit {
    /// The connection was cancelled locally (reader ended).
    Cancelled,
    /// Server shutdown.
    ShuttingDown,
    /// A fatal error was reported to the client.
    Failed(&'static str),
    /// No inbound frame within the heartbeat timeout.
    TimedOut,
    /// The socket refused a write.
    TransportClosed,
}

fn close_frame(code: u16, reason: &'static str) -> Message {
    Message::Close(Some(CloseFrame {
        code,
        reason: reason.into(),
    }))
}

async fn send_frame<S>(sink: &mut S, frame: &ServerFrame) -> Result<(), String>
where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    let text = frame.encode().map_err(|e| e.to_string())?;
    sink.send(Message::Text(text.into()))
        .await
        .map_err(|e| e.to_string())
}

/// Close for a local reason: server shutdown or the reader ending.
async fn close_locally<S>(sink: &mut S, shutdown: &CancellationToken) -> WriterExit
where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    if shutdown.is_cancelled() {
        let _ = send_frame(sink, &ServerFrame::error(&RelayError::ShuttingDown)).await;
        let _ = sink.send(close_frame(close_code::AWAY, "SHUTTING_DOWN")).await;
        return WriterExit::ShuttingDown;
    }
    let _ = sink.send(close_frame(close_code::NORMAL, "")).await;
    WriterExit::Cancelled
}

/// Drive `sink` until cancelled, closed, or timed out. Cancels `conn_token`
/// on the way out so the reader and delivery tasks stop too.
pub async fn run_writer<S>(
    mut sink: S,
    mut control: mpsc::UnboundedReceiver<Control>,
    mut deliveries: mpsc::Receiver<ServerFrame>,
    conn: Arc<RelayConnection>,
    heartbeat: Heartbeat,
    conn_token: CancellationToken,
    shutdown: CancellationToken,
) -> WriterExit
where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    let role = conn.role.as_str();
    let mut ping = tokio::time::interval(heartbeat.interval);
    // skip the immediate first tick
    let _ = ping.tick().await;
    let mut deliveries_open = true;

    let exit = loop {
        tokio::select! {
            biased;

            ctl = control.recv() => match ctl {
                Some(Control::Frame(frame)) => {
                    if let Err(e) = send_frame(&mut sink, &frame).await {
                        debug!(error = %e, "write failed");
                        break WriterExit::TransportClosed;
                    }
                }
                Some(Control::Close(err)) => {
                    let _ = send_frame(&mut sink, &ServerFrame::error(&err)).await;
                    let code = match err {
                        RelayError::BadRequest(_) | RelayError::ProtocolViolation(_) => close_code::POLICY,
                        _ => close_code::ERROR,
                    };
                    let _ = sink.send(close_frame(code, err.code())).await;
                    break WriterExit::Failed(err.code());
                }
                None => break close_locally(&mut sink, &shutdown).await,
            },

            () = conn_token.cancelled() => break close_locally(&mut sink, &shutdown).await,

            frame = deliveries.recv(), if deliveries_open => match frame {
                Some(frame) => {
                    let is_event = matches!(frame, ServerFrame::Event(_));
                    if let Err(e) = send_frame(&mut sink, &frame).await {
                        debug!(error = %e, "write failed");
                        break WriterExit::TransportClosed;
                    }
                    if is_event {
                        counter!(RELAY_EVENTS_DELIVERED_TOTAL, "role" => role).increment(1);
                    }
                }
                None => deliveries_open = false,
            },

            _ = ping.tick() => {
                let idle = conn.idle_for();
                if idle > heartbeat.timeout {
                    warn!(idle_secs = idle.as_secs(), "client unresponsive, disconnecting");
                    let _ = sink.send(close_frame(close_code::AWAY, "heartbeat timeout")).await;
                    break WriterExit::TimedOut;
                }
                if sink.send(Message::Ping(Vec::new().into())).await.is_err() {
                    break WriterExit::TransportClosed;
                }
            }
        }
    };

    conn_token.cancel();
    let _ = sink.close().await;
    exit
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use futures::StreamExt;
    use futures::channel::mpsc as fmpsc;
    use serde_json::Value;
    use walletlink_core::{Role, SessionId};

    use super::*;

    struct Rig {
        out: fmpsc::UnboundedReceiver<Message>,
        control: mpsc::UnboundedSender<Control>,
        deliveries: mpsc::Sender<ServerFrame>,
        conn_token: CancellationToken,
        shutdown: CancellationToken,
        task: tokio::task::JoinHandle<WriterExit>,
    }

    fn rig(heartbeat: Heartbeat) -> Rig {
        let (sink, out) = fmpsc::unbounded::<Message>();
        let (control, control_rx) = mpsc::unbounded_channel();
        let (deliveries, deliveries_rx) = mpsc::channel(8);
        let shutdown = CancellationToken::new();
        let conn_token = shutdown.child_token();
        let conn = Arc::new(RelayConnection::new(
            Role::Agent,
            SessionId::from_trusted("s1".into()),
        ));
        let task = tokio::spawn(run_writer(
            sink,
            control_rx,
            deliveries_rx,
            conn,
            heartbeat,
            conn_token.clone(),
            shutdown.clone(),
        ));
        Rig {
            out,
            control,
            deliveries,
            conn_token,
            shutdown,
            task,
        }
    }

    fn slow_heartbeat() -> Heartbeat {
        Heartbeat {
            interval: Duration::from_secs(3600),
            timeout: Duration::from_secs(7200),
        }
    }

    async fn next_json(rig: &mut Rig) -> Value {
        loop {
            match rig.out.next().await.unwrap() {
                Message::Text(t) => return serde_json::from_str(t.as_str()).unwrap(),
                Message::Ping(_) => {}
                other => panic!("unexpected {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn writes_control_and_delivery_frames() {
        let mut rig = rig(slow_heartbeat());
        rig.control
            .send(Control::Frame(ServerFrame::PublishAck {
                request_id: Some("r1".into()),
                sequence_number: 1,
            }))
            .unwrap();
        assert_eq!(next_json(&mut rig).await["type"], "publishAck");

        rig.deliveries
            .send(ServerFrame::Ready {
                session_id: SessionId::from_trusted("s1".into()),
                role: Role::Agent,
                linked: false,
                last_sequence: 0,
            })
            .await
            .unwrap();
        assert_eq!(next_json(&mut rig).await["type"], "ready");

        rig.conn_token.cancel();
        assert_eq!(rig.task.await.unwrap(), WriterExit::Cancelled);
    }

    #[tokio::test]
    async fn close_control_sends_error_then_close() {
        let mut rig = rig(slow_heartbeat());
        rig.control
            .send(Control::Close(RelayError::ProtocolViolation("bad".into())))
            .unwrap();
        let v = next_json(&mut rig).await;
        assert_eq!(v["type"], "error");
        assert_eq!(v["code"], "PROTOCOL_VIOLATION");
        match rig.out.next().await.unwrap() {
            Message::Close(Some(frame)) => assert_eq!(frame.code, close_code::POLICY),
            other => panic!("expected close, got {other:?}"),
        }
        assert_eq!(rig.task.await.unwrap(), WriterExit::Failed("PROTOCOL_VIOLATION"));
        assert!(rig.conn_token.is_cancelled());
    }

    #[tokio::test]
    async fn shutdown_sends_shutting_down_error() {
        let mut rig = rig(slow_heartbeat());
        rig.shutdown.cancel();
        let v = next_json(&mut rig).await;
        assert_eq!(v["code"], "SHUTTING_DOWN");
        assert_eq!(rig.task.await.unwrap(), WriterExit::ShuttingDown);
    }

    #[tokio::test]
    async fn silent_client_times_out() {
        let mut rig = rig(Heartbeat {
            interval: Duration::from_millis(20),
            timeout: Duration::from_millis(50),
        });
        let exit = tokio::time::timeout(Duration::from_secs(2), &mut rig.task)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(exit, WriterExit::TimedOut);
        let mut saw_ping = false;
        // the sink was dropped with the task, so the stream terminates
        while let Some(msg) = rig.out.next().await {
            saw_ping |= matches!(msg, Message::Ping(_));
        }
        assert!(saw_ping);
    }
}
