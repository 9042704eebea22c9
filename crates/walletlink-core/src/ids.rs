//! Branded ID newtypes.
//!
//! Session IDs are chosen by clients and treated as opaque strings; the only
//! checks are length and the absence of control characters. Connection IDs
//! are minted by the server (UUID v7, time-ordered).

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::RelayError;

/// Longest accepted session ID, in characters.
pub const MAX_SESSION_ID_LEN: usize = 128;

macro_rules! branded_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Return the inner string as a slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume self and return the inner `String`.
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl std::ops::Deref for $name {
            type Target = str;
            fn deref(&self) -> &str {
                &self.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

branded_id! {
    /// Opaque, client-chosen identifier coupling one agent stream to one
    /// signer stream.
    SessionId
}

branded_id! {
    /// Server-assigned identifier for one live duplex connection.
    ConnectionId
}

impl SessionId {
    /// Validate and wrap a client-supplied session ID.
    pub fn parse(raw: &str) -> Result<Self, RelayError> {
        if raw.is_empty() {
            return Err(RelayError::BadRequest("sessionId must not be empty".into()));
        }
        if raw.chars().count() > MAX_SESSION_ID_LEN {
            return Err(RelayError::BadRequest(format!(
                "sessionId longer than {MAX_SESSION_ID_LEN} characters"
            )));
        }
        if raw.chars().any(char::is_control) {
            return Err(RelayError::BadRequest(
                "sessionId contains control characters".into(),
            ));
        }
        Ok(Self(raw.to_owned()))
    }

    /// Wrap a value already known to be valid (e.g. read back from storage).
    #[must_use]
    pub fn from_trusted(s: String) -> Self {
        Self(s)
    }
}

impl ConnectionId {
    /// Mint a new connection ID.
    #[must_use]
    pub fn new() -> Self {
        Self(format!("conn_{}", Uuid::now_v7()))
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}
