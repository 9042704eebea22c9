//! Errors raised while building [`RelaySettings`](crate::RelaySettings).

use std::path::PathBuf;

use thiserror::Error;

/// Why the relay refused its settings. All of these are fatal at startup.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// The settings file exists but could not be read.
    #[error("cannot read settings file {}: {source}", path.display())]
    Read {
        /// File given with `--config`.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// The file is not JSON, or a field has the wrong shape for
    /// `RelaySettings`.
    #[error("malformed settings: {0}")]
    Json(#[from] serde_json::Error),

    /// A value parsed but the relay cannot run with it: a zero port,
    /// `subscriberBuffer` or heartbeat interval below 1, a heartbeat timeout
    /// shorter than the interval, or a sqlite `poolSize` below 1.
    #[error("invalid {key}: {reason}")]
    InvalidValue {
        /// camelCase settings path, e.g. `server.port`.
        key: &'static str,
        /// What the value must satisfy.
        reason: &'static str,
    },
}

/// Result type for settings operations.
pub type Result<T> = std::result::Result<T, SettingsError>;
