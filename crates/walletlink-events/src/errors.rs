//! Error types for the event store subsystem.
//!
//! Backend failures collapse into [`RelayError::StorageUnavailable`] at the
//! connection layer; only a rejected session ID is the caller's fault.

use thiserror::Error;
use walletlink_core::RelayError;

/// Errors that can occur during event store operations.
#[derive(Debug, Error)]
pub enum EventStoreError {
    /// `SQLite` database error.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Connection pool error.
    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// Schema migration failed.
    #[error("migration error: {message}")]
    Migration {
        /// Describes which migration failed and why.
        message: String,
    },

    /// A blocking store task panicked or was cancelled.
    #[error("store task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    /// The session ID cannot be stored.
    #[error("invalid session: {0}")]
    InvalidSession(String),

    /// Internal error (e.g. corrupt row).
    #[error("internal error: {0}")]
    Internal(String),
}

/// Convenience type alias for event store results.
pub type Result<T> = std::result::Result<T, EventStoreError>;

impl From<EventStoreError> for RelayError {
    fn from(err: EventStoreError) -> Self {
        match err {
            EventStoreError::InvalidSession(msg) => Self::BadRequest(msg),
            other => Self::StorageUnavailable(other.to_string()),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
