//! Async [`EventStore`] facade over the `SQLite` repository.
//!
//! `rusqlite` is blocking, so every call checks out a pooled connection on
//! tokio's blocking pool via `spawn_blocking`.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, instrument};
use walletlink_core::{Role, SessionId};

use crate::errors::{EventStoreError, Result};
use crate::sqlite::connection::{self, ConnectionConfig, ConnectionPool, PooledConnection};
use crate::sqlite::migrations::run_migrations;
use crate::sqlite::repository::EventRepo;
use crate::store::EventStore;
use crate::types::{AppendOutcome, Event, now_millis};

/// Durable [`EventStore`] backed by a `SQLite` database.
#[derive(Clone)]
pub struct SqliteEventStore {
    pool: ConnectionPool,
}

impl SqliteEventStore {
    /// Open (or create) the database at `path` and apply pending migrations.
    pub fn open(path: impl AsRef<Path>, config: &ConnectionConfig) -> Result<Self> {
        let path = path.as_ref();
        let path_str = path.to_str().ok_or_else(|| {
            EventStoreError::Internal(format!("database path is not UTF-8: {}", path.display()))
        })?;
        let pool = connection::new_file(path_str, config)?;
        let store = Self::with_pool(pool)?;
        info!(path = %path.display(), pool_size = config.pool_size, "sqlite event store opened");
        Ok(store)
    }

    /// Open a private in-memory database.
    pub fn in_memory() -> Result<Self> {
        Self::with_pool(connection::new_in_memory(&ConnectionConfig::default())?)
    }

    /// Wrap an existing pool, applying pending migrations.
    pub fn with_pool(pool: ConnectionPool) -> Result<Self> {
        let conn = pool.get()?;
        let applied = run_migrations(&conn)?;
        debug!(applied, "event store schema ready");
        drop(conn);
        Ok(Self { pool })
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut PooledConnection) -> Result<T> + Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            f(&mut conn)
        })
        .await?
    }
}

#[async_trait]
impl EventStore for SqliteEventStore {
    fn backend(&self) -> &'static str {
        "sqlite"
    }

    #[instrument(skip(self, payload), fields(session_id = %session_id, origin = %origin))]
    async fn append_event(
        &self,
        session_id: &SessionId,
        origin: Role,
        payload: String,
    ) -> Result<AppendOutcome> {
        let sid = session_id.clone();
        let (event, became_linked) = self
            .blocking(move |conn| EventRepo::append(conn, &sid, origin, payload, now_millis()))
            .await?;
        Ok(AppendOutcome {
            event,
            became_linked,
        })
    }

    #[instrument(skip(self), fields(session_id = %session_id, origin = %origin))]
    async fn events_since(
        &self,
        session_id: &SessionId,
        origin: Role,
        after: u64,
    ) -> Result<Vec<Event>> {
        let sid = session_id.clone();
        self.blocking(move |conn| EventRepo::since(conn, &sid, origin, after))
            .await
    }

    async fn is_linked(&self, session_id: &SessionId) -> Result<bool> {
        let sid = session_id.clone();
        self.blocking(move |conn| EventRepo::is_linked(conn, &sid)).await
    }

    async fn latest_sequence(&self, session_id: &SessionId, origin: Role) -> Result<u64> {
        let sid = session_id.clone();
        self.blocking(move |conn| EventRepo::latest_sequence(conn, &sid, origin))
            .await
    }

    async fn purge_expired(&self, max_idle: Duration) -> Result<usize> {
        let idle = chrono::Duration::from_std(max_idle)
            .map_err(|e| EventStoreError::Internal(format!("ttl out of range: {e}")))?;
        let cutoff = now_millis() - idle;
        let removed = self
            .blocking(move |conn| EventRepo::purge_idle(conn, cutoff))
            .await?;
        if removed > 0 {
            debug!(removed, "dropped events of idle sessions");
        }
        Ok(removed)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn sid(s: &str) -> SessionId {
        SessionId::from_trusted(s.to_string())
    }

    fn file_store(dir: &tempfile::TempDir) -> SqliteEventStore {
        SqliteEventStore::open(dir.path().join("relay.db"), &ConnectionConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = file_store(&dir);
            let _ = store.append_event(&sid("s1"), Role::Agent, "one".into()).await.unwrap();
            let _ = store.append_event(&sid("s1"), Role::Signer, "two".into()).await.unwrap();
        }
        let store = file_store(&dir);
        let events = store.events_since(&sid("s1"), Role::Agent, 0).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].payload, "one");
        assert!(store.is_linked(&sid("s1")).await.unwrap());
        let next = store.append_event(&sid("s1"), Role::Agent, "three".into()).await.unwrap();
        assert_eq!(next.event.sequence, 2);
        assert!(!next.became_linked);
    }

    #[tokio::test]
    async fn in_memory_store_works() {
        let store = SqliteEventStore::in_memory().unwrap();
        assert_eq!(store.backend(), "sqlite");
        let out = store.append_event(&sid("m"), Role::Signer, "x".into()).await.unwrap();
        assert_eq!(out.event.sequence, 1);
        assert_eq!(store.latest_sequence(&sid("m"), Role::Signer).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn purge_with_zero_ttl_keeps_nothing_older_than_now() {
        let store = SqliteEventStore::in_memory().unwrap();
        let _ = store.append_event(&sid("a"), Role::Agent, "x".into()).await.unwrap();
        assert_eq!(store.purge_expired(Duration::from_secs(3600)).await.unwrap(), 0);
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert_eq!(store.purge_expired(Duration::ZERO).await.unwrap(), 1);
        assert!(store.events_since(&sid("a"), Role::Agent, 0).await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_writers_on_file_db() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(file_store(&dir));
        let s = sid("busy");

        let mut handles = Vec::new();
        for w in 0..6 {
            let store = store.clone();
            let s = s.clone();
            handles.push(tokio::spawn(async move {
                let mut out = Vec::new();
                for i in 0..20 {
                    let role = if w % 2 == 0 { Role::Agent } else { Role::Signer };
                    let res = store.append_event(&s, role, format!("{w}-{i}")).await.unwrap();
                    out.push((role, res.event.sequence, res.became_linked));
                }
                out
            }));
        }

        let mut agent = Vec::new();
        let mut signer = Vec::new();
        let mut links = 0;
        for h in handles {
            for (role, seq, linked) in h.await.unwrap() {
                match role {
                    Role::Agent => agent.push(seq),
                    Role::Signer => signer.push(seq),
                }
                links += usize::from(linked);
            }
        }
        agent.sort_unstable();
        signer.sort_unstable();
        assert_eq!(agent, (1..=60).collect::<Vec<u64>>());
        assert_eq!(signer, (1..=60).collect::<Vec<u64>>());
        assert_eq!(links, 1);
    }
}
