//! Connection roles.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::RelayError;

/// Which side of a session a connection speaks for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The wallet side. Receives signer requests, publishes responses.
    Agent,
    /// The dapp side. Publishes requests, receives agent responses.
    Signer,
}

impl Role {
    /// Both roles, in a stable order.
    pub const ALL: [Role; 2] = [Role::Agent, Role::Signer];

    /// The role whose subscribers receive events published by this role.
    #[must_use]
    pub fn opposite(self) -> Self {
        match self {
            Self::Agent => Self::Signer,
            Self::Signer => Self::Agent,
        }
    }

    /// Lowercase wire name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Agent => "agent",
            Self::Signer => "signer",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "agent" => Ok(Self::Agent),
            "signer" => Ok(Self::Signer),
            other => Err(RelayError::BadRequest(format!("unknown role: {other}"))),
        }
    }
}
