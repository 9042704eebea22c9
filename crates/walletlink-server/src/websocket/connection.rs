//! Live connection state and the registry behind `/health`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::Mutex;
use walletlink_core::{ConnectionId, Role, SessionId};

/// One relay connection bound to a session and role.
pub struct RelayConnection {
    /// Unique connection ID.
    pub id: ConnectionId,
    /// Role this connection speaks as.
    pub role: Role,
    /// Joined session.
    pub session_id: SessionId,
    /// When the upgrade completed.
    pub connected_at: Instant,
    last_seen: Mutex<Instant>,
}

impl RelayConnection {
    /// New connection with a fresh ID.
    pub fn new(role: Role, session_id: SessionId) -> Self {
        let now = Instant::now();
        Self {
            id: ConnectionId::new(),
            role,
            session_id,
            connected_at: now,
            last_seen: Mutex::new(now),
        }
    }

    /// Record inbound activity (any frame, including pongs).
    pub fn mark_alive(&self) {
        *self.last_seen.lock() = Instant::now();
    }

    /// Time since the last inbound frame.
    pub fn idle_for(&self) -> Duration {
        self.last_seen.lock().elapsed()
    }
}

/// Registry of open connections.
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: DashMap<ConnectionId, Arc<RelayConnection>>,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `conn`; it is removed when the returned guard drops.
    pub fn register(self: &Arc<Self>, conn: Arc<RelayConnection>) -> Registration {
        let id = conn.id.clone();
        let _ = self.connections.insert(id.clone(), conn);
        Registration {
            registry: self.clone(),
            id,
        }
    }

    /// Open connections.
    pub fn count(&self) -> usize {
        self.connections.len()
    }

    /// Open connections for one session and role.
    pub fn count_for(&self, session_id: &SessionId, role: Role) -> usize {
        self.connections
            .iter()
            .filter(|c| c.role == role && &c.session_id == session_id)
            .count()
    }
}

/// Removes a connection from its registry on drop.
pub struct Registration {
    registry: Arc<ConnectionRegistry>,
    id: ConnectionId,
}

impl Drop for Registration {
    fn drop(&mut self) {
        let _ = self.registry.connections.remove(&self.id);
    }
}
