//! Wire protocol: connect parameters and JSON frames.
//!
//! Client frames are `type`-tagged JSON objects; only `publish` exists.
//! Server frames carry delivered events, the replay-complete marker, publish
//! acknowledgements, and errors.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use walletlink_core::{RelayError, Role, SessionId};
use walletlink_events::Event;

/// Raw query string of `GET /rpc/{role}`.
#[derive(Debug, Default, Deserialize)]
pub struct ConnectQuery {
    /// Session to join.
    #[serde(rename = "sessionId")]
    pub session_id: Option<String>,
    /// Highest sequence already received from the opposite role.
    #[serde(rename = "lastSeenSequence")]
    pub last_seen_sequence: Option<String>,
}

/// Validated connect parameters.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectParams {
    /// Session to join.
    pub session_id: SessionId,
    /// Replay cursor; 0 replays everything.
    pub last_seen_sequence: u64,
}

impl ConnectParams {
    /// Validate a raw query.
    pub fn parse(query: &ConnectQuery) -> Result<Self, RelayError> {
        let raw = query
            .session_id
            .as_deref()
            .ok_or_else(|| RelayError::BadRequest("missing sessionId".into()))?;
        let session_id = SessionId::parse(raw)?;

        let last_seen_sequence = match query.last_seen_sequence.as_deref() {
            None | Some("") => 0,
            Some(raw) => raw.trim().parse::<u64>().map_err(|_| {
                RelayError::BadRequest(format!(
                    "lastSeenSequence must be a non-negative integer, got {raw:?}"
                ))
            })?,
        };

        Ok(Self {
            session_id,
            last_seen_sequence,
        })
    }
}

/// Frame sent by a client.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientFrame {
    /// Publish an opaque payload to the opposite role.
    Publish {
        /// Opaque payload, stored and forwarded verbatim.
        payload: String,
        /// Client correlation ID echoed in the acknowledgement.
        #[serde(default, rename = "requestId")]
        request_id: Option<String>,
    },
}

impl ClientFrame {
    /// Decode a text frame. Anything malformed is a protocol violation.
    pub fn decode(text: &str) -> Result<Self, RelayError> {
        serde_json::from_str(text)
            .map_err(|e| RelayError::ProtocolViolation(format!("invalid frame: {e}")))
    }
}

/// Frame sent by the server.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ServerFrame {
    /// A delivered event from the opposite role.
    Event(Arc<Event>),
    /// Replay finished; live delivery follows.
    Ready {
        /// Joined session.
        session_id: SessionId,
        /// This connection's role.
        role: Role,
        /// Whether both roles have published in this session.
        linked: bool,
        /// Last sequence delivered during replay.
        last_sequence: u64,
    },
    /// A publish was stored.
    PublishAck {
        /// Echo of the client's `requestId`.
        #[serde(skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
        /// Sequence the store assigned.
        sequence_number: u64,
    },
    /// A publish could not be stored. The connection stays open.
    PublishFailed {
        /// Echo of the client's `requestId`.
        #[serde(skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
        /// Stable error code.
        code: &'static str,
        /// Human-readable detail.
        message: String,
    },
    /// Connection-level error.
    Error {
        /// Stable error code.
        code: &'static str,
        /// Human-readable detail.
        message: String,
    },
}

impl ServerFrame {
    /// Error frame for `err`.
    pub fn error(err: &RelayError) -> Self {
        Self::Error {
            code: err.code(),
            message: err.to_string(),
        }
    }

    /// Failed-publish frame for `err`.
    pub fn publish_failed(request_id: Option<String>, err: &RelayError) -> Self {
        Self::PublishFailed {
            request_id,
            code: err.code(),
            message: err.to_string(),
        }
    }

    /// Serialize to the JSON text sent on the wire.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
