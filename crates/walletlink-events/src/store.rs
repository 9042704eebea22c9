//! The backend-agnostic event store contract.

use std::time::Duration;

use async_trait::async_trait;
use walletlink_core::{Role, SessionId};

use crate::errors::Result;
use crate::types::{AppendOutcome, Event};

/// Durable, append-only per-session event log.
///
/// Implementations must assign sequence numbers atomically: concurrent
/// appends for the same `(session, origin)` never share a number and never
/// leave a gap. Reads are monotonic: once an event has been returned by
/// [`events_since`](Self::events_since) it is returned by every later call
/// with a lower cursor until the session expires.
#[async_trait]
pub trait EventStore: Send + Sync + 'static {
    /// Short backend name for logs and health output.
    fn backend(&self) -> &'static str;

    /// Append `payload` to `origin`'s stream in `session_id`, creating the
    /// session implicitly. Reports whether this append linked the session.
    async fn append_event(
        &self,
        session_id: &SessionId,
        origin: Role,
        payload: String,
    ) -> Result<AppendOutcome>;

    /// Events in `origin`'s stream with `sequence > after`, ascending.
    async fn events_since(
        &self,
        session_id: &SessionId,
        origin: Role,
        after: u64,
    ) -> Result<Vec<Event>>;

    /// Whether both roles have appended at least one event.
    async fn is_linked(&self, session_id: &SessionId) -> Result<bool>;

    /// Highest sequence ever assigned in `origin`'s stream, or 0. Expiry
    /// does not lower it.
    async fn latest_sequence(&self, session_id: &SessionId, origin: Role) -> Result<u64>;

    /// Delete the events of sessions with no append for `max_idle`.
    ///
    /// Sequence counters and the linked flag are kept, so a later append
    /// continues from the old maximum. Returns the number of sessions that
    /// lost events.
    async fn purge_expired(&self, max_idle: Duration) -> Result<usize>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MemoryEventStore, SqliteEventStore};

    fn backends() -> Vec<Box<dyn EventStore>> {
        vec![
            Box::new(MemoryEventStore::new()),
            Box::new(SqliteEventStore::in_memory().unwrap()),
        ]
    }

    fn sid(s: &str) -> SessionId {
        SessionId::from_trusted(s.to_string())
    }

    #[tokio::test]
    async fn sessions_are_isolated() {
        for store in backends() {
            let _ = store.append_event(&sid("s1"), Role::Agent, "a".into()).await.unwrap();
            let _ = store.append_event(&sid("s2"), Role::Signer, "b".into()).await.unwrap();
            assert!(store.events_since(&sid("s1"), Role::Signer, 0).await.unwrap().is_empty());
            assert!(store.events_since(&sid("s2"), Role::Agent, 0).await.unwrap().is_empty());
            assert!(!store.is_linked(&sid("s1")).await.unwrap(), "{}", store.backend());
        }
    }

    #[tokio::test]
    async fn payload_is_opaque() {
        let payload = "{\"not\": \"parsed\"} \u{1F512} trailing".to_string();
        for store in backends() {
            let out = store.append_event(&sid("p"), Role::Signer, payload.clone()).await.unwrap();
            let got = store.events_since(&sid("p"), Role::Signer, 0).await.unwrap();
            assert_eq!(got, vec![out.event], "{}", store.backend());
            assert_eq!(got[0].payload, payload);
        }
    }

    #[tokio::test]
    async fn sequences_survive_expiry() {
        for store in backends() {
            let s = sid("expiring");
            let _ = store.append_event(&s, Role::Agent, "a1".into()).await.unwrap();
            let _ = store.append_event(&s, Role::Signer, "s1".into()).await.unwrap();
            for p in ["a2", "a3"] {
                let _ = store.append_event(&s, Role::Agent, p.into()).await.unwrap();
            }
            // sqlite stores millisecond timestamps
            tokio::time::sleep(Duration::from_millis(5)).await;
            assert_eq!(store.purge_expired(Duration::ZERO).await.unwrap(), 1, "{}", store.backend());
            assert!(store.events_since(&s, Role::Agent, 0).await.unwrap().is_empty());
            assert_eq!(store.latest_sequence(&s, Role::Agent).await.unwrap(), 3);

            let out = store.append_event(&s, Role::Agent, "after".into()).await.unwrap();
            assert_eq!(out.event.sequence, 4, "{}", store.backend());
            assert!(!out.became_linked);
            assert!(store.is_linked(&s).await.unwrap());
            assert_eq!(store.events_since(&s, Role::Agent, 3).await.unwrap(), vec![out.event.clone()]);
            assert_eq!(store.events_since(&s, Role::Agent, 0).await.unwrap(), vec![out.event]);

            let signer = store.append_event(&s, Role::Signer, "s2".into()).await.unwrap();
            assert_eq!(signer.event.sequence, 2);
        }
    }

    #[tokio::test]
    async fn expiry_spares_active_sessions() {
        for store in backends() {
            let _ = store.append_event(&sid("busy"), Role::Agent, "x".into()).await.unwrap();
            assert_eq!(store.purge_expired(Duration::from_secs(3600)).await.unwrap(), 0);
            assert_eq!(store.events_since(&sid("busy"), Role::Agent, 0).await.unwrap().len(), 1);
        }
    }

    mod proptests {
        use proptest::prelude::*;

        use super::*;

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(32))]

            // Any interleaving of appends yields contiguous, duplicate-free
            // streams per origin, and every cursor reads an exact suffix.
            #[test]
            fn streams_are_contiguous(
                ops in proptest::collection::vec(any::<bool>(), 1..40),
                cursor in 0u64..45,
            ) {
                let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
                rt.block_on(async {
                    for store in backends() {
                        let s = sid("prop");
                        for (i, is_agent) in ops.iter().enumerate() {
                            let role = if *is_agent { Role::Agent } else { Role::Signer };
                            let _ = store.append_event(&s, role, i.to_string()).await.unwrap();
                        }
                        for role in Role::ALL {
                            let expected = ops.iter().filter(|a| **a == (role == Role::Agent)).count() as u64;
                            let all = store.events_since(&s, role, 0).await.unwrap();
                            let seqs: Vec<u64> = all.iter().map(|e| e.sequence).collect();
                            prop_assert_eq!(seqs, (1..=expected).collect::<Vec<u64>>());

                            let tail = store.events_since(&s, role, cursor).await.unwrap();
                            prop_assert_eq!(tail.len() as u64, expected.saturating_sub(cursor));
                            prop_assert!(tail.iter().all(|e| e.sequence > cursor));
                            prop_assert_eq!(store.latest_sequence(&s, role).await.unwrap(), expected);
                        }
                        let both = ops.iter().any(|a| *a) && ops.iter().any(|a| !*a);
                        prop_assert_eq!(store.is_linked(&s).await.unwrap(), both);
                    }
                    Ok(())
                })?;
            }
        }
    }
}
