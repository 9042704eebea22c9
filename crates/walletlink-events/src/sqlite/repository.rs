//! Event repository: the SQL behind every store operation.
//!
//! Stateless; every method takes a connection. Timestamps are stored as Unix
//! milliseconds.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params};
use walletlink_core::{Role, SessionId};

use crate::errors::{EventStoreError, Result};
use crate::types::Event;

/// Sequence column on `sessions` for an origin stream.
fn seq_column(origin: Role) -> &'static str {
    match origin {
        Role::Agent => "agent_seq",
        Role::Signer => "signer_seq",
    }
}

fn to_u64(v: i64) -> Result<u64> {
    u64::try_from(v).map_err(|_| EventStoreError::Internal(format!("negative sequence {v}")))
}

fn to_i64(v: u64) -> i64 {
    i64::try_from(v).unwrap_or(i64::MAX)
}

fn timestamp(ms: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| EventStoreError::Internal(format!("timestamp out of range: {ms}")))
}

/// Event repository.
pub struct EventRepo;

impl EventRepo {
    /// Append one event inside an immediate-mode transaction.
    ///
    /// The write lock is taken at `BEGIN`, so the sequence bump, the event
    /// insert, and the linked flip are serialized against every other writer
    /// on the database.
    pub fn append(
        conn: &mut Connection,
        session_id: &SessionId,
        origin: Role,
        payload: String,
        now: DateTime<Utc>,
    ) -> Result<(Event, bool)> {
        let now_ms = now.timestamp_millis();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let _ = tx.execute(
            "INSERT INTO sessions (id, created_at, last_activity) VALUES (?1, ?2, ?2)
             ON CONFLICT (id) DO NOTHING",
            params![session_id.as_str(), now_ms],
        )?;

        let col = seq_column(origin);
        let (agent_seq, signer_seq, linked_at): (i64, i64, Option<i64>) = tx.query_row(
            &format!(
                "UPDATE sessions SET {col} = {col} + 1, last_activity = ?2 WHERE id = ?1
                 RETURNING agent_seq, signer_seq, linked_at"
            ),
            params![session_id.as_str(), now_ms],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )?;
        let sequence = match origin {
            Role::Agent => agent_seq,
            Role::Signer => signer_seq,
        };

        let _ = tx.execute(
            "INSERT INTO events (session_id, origin, sequence, payload, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![session_id.as_str(), origin.as_str(), sequence, payload, now_ms],
        )?;

        let became_linked = if linked_at.is_none() && agent_seq > 0 && signer_seq > 0 {
            tx.execute(
                "UPDATE sessions SET linked_at = ?2 WHERE id = ?1 AND linked_at IS NULL",
                params![session_id.as_str(), now_ms],
            )? == 1
        } else {
            false
        };

        tx.commit()?;

        let event = Event {
            session_id: session_id.clone(),
            origin,
            sequence: to_u64(sequence)?,
            payload,
            timestamp: now,
        };
        Ok((event, became_linked))
    }

    /// Events in one origin stream after `after`, ascending.
    pub fn since(
        conn: &Connection,
        session_id: &SessionId,
        origin: Role,
        after: u64,
    ) -> Result<Vec<Event>> {
        let mut stmt = conn.prepare_cached(
            "SELECT sequence, payload, created_at FROM events
             WHERE session_id = ?1 AND origin = ?2 AND sequence > ?3
             ORDER BY sequence ASC",
        )?;
        let rows = stmt.query_map(
            params![session_id.as_str(), origin.as_str(), to_i64(after)],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                ))
            },
        )?;

        let mut events = Vec::new();
        for row in rows {
            let (sequence, payload, created_at) = row?;
            events.push(Event {
                session_id: session_id.clone(),
                origin,
                sequence: to_u64(sequence)?,
                payload,
                timestamp: timestamp(created_at)?,
            });
        }
        Ok(events)
    }

    /// Whether the session has been linked.
    pub fn is_linked(conn: &Connection, session_id: &SessionId) -> Result<bool> {
        let linked_at: Option<Option<i64>> = conn
            .query_row(
                "SELECT linked_at FROM sessions WHERE id = ?1",
                params![session_id.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(linked_at.flatten().is_some())
    }

    /// Last sequence assigned in an origin stream, or 0.
    pub fn latest_sequence(conn: &Connection, session_id: &SessionId, origin: Role) -> Result<u64> {
        let col = seq_column(origin);
        let seq: Option<i64> = conn
            .query_row(
                &format!("SELECT {col} FROM sessions WHERE id = ?1"),
                params![session_id.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        to_u64(seq.unwrap_or(0))
    }

    /// Delete the events of sessions whose last append is older than
    /// `cutoff`. The `sessions` row stays behind with its counters and
    /// `linked_at`, so sequences keep climbing if the session comes back.
    ///
    /// Returns the number of sessions that lost events.
    pub fn purge_idle(conn: &Connection, cutoff: DateTime<Utc>) -> Result<usize> {
        let mut stmt = conn.prepare(
            "DELETE FROM events
             WHERE session_id IN (SELECT id FROM sessions WHERE last_activity < ?1)
             RETURNING session_id",
        )?;
        let purged = stmt
            .query_map(params![cutoff.timestamp_millis()], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<HashSet<String>>>()?;
        Ok(purged.len())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::migrations::run_migrations;
    use crate::types::now_millis;

    fn setup() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys = ON;").unwrap();
        let _ = run_migrations(&conn).unwrap();
        conn
    }

    fn sid(s: &str) -> SessionId {
        SessionId::from_trusted(s.to_string())
    }

    #[test]
    fn append_assigns_per_origin_sequences() {
        let mut conn = setup();
        let s = sid("s1");
        let (a1, _) = EventRepo::append(&mut conn, &s, Role::Agent, "a".into(), now_millis()).unwrap();
        let (g1, _) = EventRepo::append(&mut conn, &s, Role::Signer, "b".into(), now_millis()).unwrap();
        let (a2, _) = EventRepo::append(&mut conn, &s, Role::Agent, "c".into(), now_millis()).unwrap();
        assert_eq!((a1.sequence, g1.sequence, a2.sequence), (1, 1, 2));
        assert_eq!(EventRepo::latest_sequence(&conn, &s, Role::Agent).unwrap(), 2);
        assert_eq!(EventRepo::latest_sequence(&conn, &sid("other"), Role::Agent).unwrap(), 0);
    }

    #[test]
    fn since_round_trips_payload_and_timestamp() {
        let mut conn = setup();
        let s = sid("s1");
        let now = now_millis();
        let (stored, _) =
            EventRepo::append(&mut conn, &s, Role::Signer, "ciphertext==".into(), now).unwrap();
        let got = EventRepo::since(&conn, &s, Role::Signer, 0).unwrap();
        assert_eq!(got, vec![stored]);
        assert!(EventRepo::since(&conn, &s, Role::Signer, 1).unwrap().is_empty());
        assert!(EventRepo::since(&conn, &s, Role::Agent, 0).unwrap().is_empty());
    }

    #[test]
    fn linked_flag_set_once() {
        let mut conn = setup();
        let s = sid("s1");
        let (_, l1) = EventRepo::append(&mut conn, &s, Role::Signer, "x".into(), now_millis()).unwrap();
        assert!(!l1);
        assert!(!EventRepo::is_linked(&conn, &s).unwrap());
        let (_, l2) = EventRepo::append(&mut conn, &s, Role::Agent, "y".into(), now_millis()).unwrap();
        assert!(l2);
        let (_, l3) = EventRepo::append(&mut conn, &s, Role::Signer, "z".into(), now_millis()).unwrap();
        assert!(!l3);
        assert!(EventRepo::is_linked(&conn, &s).unwrap());
    }

    fn count(conn: &Connection, table: &str) -> i64 {
        conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
            .unwrap()
    }

    #[test]
    fn purge_drops_events_and_keeps_session_row() {
        let mut conn = setup();
        let s = sid("old");
        let then = DateTime::from_timestamp_millis(1_000).unwrap();
        let _ = EventRepo::append(&mut conn, &s, Role::Agent, "x".into(), then).unwrap();
        let _ = EventRepo::append(&mut conn, &s, Role::Signer, "y".into(), then).unwrap();
        let _ = EventRepo::append(&mut conn, &sid("fresh"), Role::Agent, "z".into(), now_millis())
            .unwrap();

        let cutoff = DateTime::from_timestamp_millis(2_000).unwrap();
        assert_eq!(EventRepo::purge_idle(&conn, cutoff).unwrap(), 1);
        assert_eq!(count(&conn, "events"), 1);
        assert_eq!(count(&conn, "sessions"), 2);
        assert_eq!(EventRepo::purge_idle(&conn, cutoff).unwrap(), 0);

        assert!(EventRepo::is_linked(&conn, &s).unwrap());
        assert_eq!(EventRepo::latest_sequence(&conn, &s, Role::Agent).unwrap(), 1);
        let (next, linked) =
            EventRepo::append(&mut conn, &s, Role::Agent, "again".into(), now_millis()).unwrap();
        assert_eq!(next.sequence, 2);
        assert!(!linked);
        assert_eq!(EventRepo::since(&conn, &s, Role::Agent, 1).unwrap(), vec![next]);
    }
}
