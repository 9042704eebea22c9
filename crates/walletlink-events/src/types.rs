//! Stored event records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use walletlink_core::{Role, SessionId};

/// One immutable, sequenced message in a session's stream for one origin role.
///
/// `sequence` is assigned by the store, starts at 1, and is contiguous per
/// `(session_id, origin)`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    /// Session the event belongs to.
    pub session_id: SessionId,
    /// Role of the connection that published the event.
    pub origin: Role,
    /// Store-assigned position in the origin's stream.
    #[serde(rename = "sequenceNumber")]
    pub sequence: u64,
    /// Opaque client payload. Never inspected.
    pub payload: String,
    /// Append time, millisecond precision.
    pub timestamp: DateTime<Utc>,
}

/// Result of a successful append.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AppendOutcome {
    /// The event as stored.
    pub event: Event,
    /// `true` for exactly one append per session: the one that made the
    /// session linked (first event from the second role).
    pub became_linked: bool,
}

/// Current time truncated to milliseconds, the precision every backend keeps.
pub fn now_millis() -> DateTime<Utc> {
    let now = Utc::now();
    DateTime::from_timestamp_millis(now.timestamp_millis()).unwrap_or(now)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_wire_field_names() {
        let event = Event {
            session_id: SessionId::from_trusted("s1".into()),
            origin: Role::Agent,
            sequence: 1,
            payload: "hello".into(),
            timestamp: DateTime::from_timestamp_millis(1_700_000_000_000).unwrap(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["sessionId"], "s1");
        assert_eq!(json["origin"], "agent");
        assert_eq!(json["sequenceNumber"], 1);
        assert_eq!(json["payload"], "hello");
        assert!(json["timestamp"].as_str().unwrap().starts_with("2023-11-14T"));
    }

    #[test]
    fn now_millis_has_no_sub_millisecond_part() {
        let ts = now_millis();
        assert_eq!(ts.timestamp_subsec_nanos() % 1_000_000, 0);
    }
}
