//! Relay error taxonomy.
//!
//! [`RelayError`] is the error every connection-level operation reports.
//! Each variant maps to a stable wire code sent to clients in `error` and
//! `publishFailed` frames, and to an HTTP status for rejections that happen
//! before the transport upgrade.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Errors surfaced by the relay core.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Malformed or missing session, sequence, or payload. No state mutated.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// The event store could not read or durably write.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    /// I/O failure on the duplex connection. Terminal for that connection.
    #[error("transport error: {0}")]
    Transport(String),

    /// A connected client sent a frame the protocol does not allow.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// The server is shutting down and closing connections.
    #[error("server shutting down")]
    ShuttingDown,

    /// Anything else.
    #[error("internal error: {0}")]
    Internal(String),
}

impl RelayError {
    /// Stable wire code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "BAD_REQUEST",
            Self::StorageUnavailable(_) => "STORAGE_UNAVAILABLE",
            Self::Transport(_) => "TRANSPORT_ERROR",
            Self::ProtocolViolation(_) => "PROTOCOL_VIOLATION",
            Self::ShuttingDown => "SHUTTING_DOWN",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// HTTP status used when the error is returned before upgrade.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) | Self::ProtocolViolation(_) => StatusCode::BAD_REQUEST,
            Self::StorageUnavailable(_) | Self::ShuttingDown => StatusCode::SERVICE_UNAVAILABLE,
            Self::Transport(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether the error ends the connection it occurred on.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::StorageUnavailable(_))
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "type": "error",
            "code": self.code(),
            "message": self.to_string(),
        });
        (self.status(), axum::Json(body)).into_response()
    }
}

/// Convenience alias for relay results.
pub type Result<T> = std::result::Result<T, RelayError>;
