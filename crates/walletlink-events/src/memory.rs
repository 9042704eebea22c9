//! In-memory event store.
//!
//! Sessions live in a [`DashMap`]; each append runs under the session's
//! shard lock, so sequence assignment and the linked flip are atomic per
//! session while unrelated sessions proceed in parallel. Nothing survives a
//! restart.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::debug;
use walletlink_core::{Role, SessionId};

use crate::errors::Result;
use crate::store::EventStore;
use crate::types::{AppendOutcome, Event, now_millis};

/// Expiry drops the events but keeps the counters and the linked flag, so a
/// session that comes back never reuses a sequence number.
#[derive(Debug)]
struct SessionLog {
    agent: Vec<Event>,
    signer: Vec<Event>,
    agent_seq: u64,
    signer_seq: u64,
    linked: bool,
    last_activity: Instant,
}

impl SessionLog {
    fn new() -> Self {
        Self {
            agent: Vec::new(),
            signer: Vec::new(),
            agent_seq: 0,
            signer_seq: 0,
            linked: false,
            last_activity: Instant::now(),
        }
    }

    fn stream(&self, origin: Role) -> &[Event] {
        match origin {
            Role::Agent => &self.agent,
            Role::Signer => &self.signer,
        }
    }

    fn latest(&self, origin: Role) -> u64 {
        match origin {
            Role::Agent => self.agent_seq,
            Role::Signer => self.signer_seq,
        }
    }

    fn next_sequence(&mut self, origin: Role) -> u64 {
        let counter = match origin {
            Role::Agent => &mut self.agent_seq,
            Role::Signer => &mut self.signer_seq,
        };
        *counter += 1;
        *counter
    }

    fn push(&mut self, event: Event) {
        match event.origin {
            Role::Agent => self.agent.push(event),
            Role::Signer => self.signer.push(event),
        }
    }

    fn has_events(&self) -> bool {
        !self.agent.is_empty() || !self.signer.is_empty()
    }

    fn drop_events(&mut self) {
        self.agent = Vec::new();
        self.signer = Vec::new();
    }
}

/// Process-local [`EventStore`].
#[derive(Debug, Default)]
pub struct MemoryEventStore {
    sessions: DashMap<SessionId, SessionLog>,
}

impl MemoryEventStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of sessions ever appended to, expired ones included.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Number of events still held across all sessions.
    pub fn event_count(&self) -> usize {
        self.sessions
            .iter()
            .map(|log| log.agent.len() + log.signer.len())
            .sum()
    }
}

#[async_trait]
impl EventStore for MemoryEventStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn append_event(
        &self,
        session_id: &SessionId,
        origin: Role,
        payload: String,
    ) -> Result<AppendOutcome> {
        let mut log = self
            .sessions
            .entry(session_id.clone())
            .or_insert_with(SessionLog::new);

        let event = Event {
            session_id: session_id.clone(),
            origin,
            sequence: log.next_sequence(origin),
            payload,
            timestamp: now_millis(),
        };
        log.push(event.clone());
        log.last_activity = Instant::now();

        let became_linked = !log.linked && log.agent_seq > 0 && log.signer_seq > 0;
        if became_linked {
            log.linked = true;
        }
        Ok(AppendOutcome {
            event,
            became_linked,
        })
    }

    async fn events_since(
        &self,
        session_id: &SessionId,
        origin: Role,
        after: u64,
    ) -> Result<Vec<Event>> {
        let Some(log) = self.sessions.get(session_id) else {
            return Ok(Vec::new());
        };
        let stream = log.stream(origin);
        // streams are sorted by sequence but may start past 1 after expiry
        let start = stream.partition_point(|e| e.sequence <= after);
        Ok(stream[start..].to_vec())
    }

    async fn is_linked(&self, session_id: &SessionId) -> Result<bool> {
        Ok(self
            .sessions
            .get(session_id)
            .is_some_and(|log| log.linked))
    }

    async fn latest_sequence(&self, session_id: &SessionId, origin: Role) -> Result<u64> {
        Ok(self
            .sessions
            .get(session_id)
            .map_or(0, |log| log.latest(origin)))
    }

    async fn purge_expired(&self, max_idle: Duration) -> Result<usize> {
        let mut removed = 0;
        for mut log in self.sessions.iter_mut() {
            if log.has_events() && log.last_activity.elapsed() >= max_idle {
                log.drop_events();
                removed += 1;
            }
        }
        if removed > 0 {
            debug!(removed, "dropped events of idle sessions");
        }
        Ok(removed)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
