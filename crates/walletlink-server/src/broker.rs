//! Session-scoped publish/subscribe broker.
//!
//! One [`PubSub`] exists per role and holds the live subscriptions of that
//! role's connections. A connection publishes on the *opposite* role's broker,
//! so an agent's message reaches signers and never echoes back to agents.
//!
//! Delivery never blocks: each subscription has its own bounded queue fed with
//! `try_send`. A subscriber whose queue is full is evicted and flagged as
//! lagged; its owner re-subscribes and catches up from the event store.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use metrics::counter;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use walletlink_core::{Role, SessionId};
use walletlink_events::Event;

use crate::metrics::RELAY_SUBSCRIBERS_LAGGED_TOTAL;

struct Slot {
    tx: mpsc::Sender<Arc<Event>>,
    lagged: Arc<AtomicBool>,
}

struct Inner {
    role: Role,
    buffer: usize,
    next_id: AtomicU64,
    sessions: DashMap<SessionId, HashMap<u64, Slot>>,
}

impl Inner {
    fn remove(&self, session_id: &SessionId, id: u64) {
        if let Some(mut subs) = self.sessions.get_mut(session_id) {
            let _ = subs.remove(&id);
        }
        let _ = self.sessions.remove_if(session_id, |_, subs| subs.is_empty());
    }
}

/// Broker for the subscribers of one role. Cheap to clone.
#[derive(Clone)]
pub struct PubSub {
    inner: Arc<Inner>,
}

impl PubSub {
    /// Create a broker for `role` subscribers, each buffering up to `buffer`
    /// undelivered events.
    pub fn new(role: Role, buffer: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                role,
                buffer: buffer.max(1),
                next_id: AtomicU64::new(1),
                sessions: DashMap::new(),
            }),
        }
    }

    /// Role whose subscribers live here.
    pub fn role(&self) -> Role {
        self.inner.role
    }

    /// Register a new subscription for `session_id`.
    pub fn subscribe(&self, session_id: &SessionId) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.inner.buffer);
        let lagged = Arc::new(AtomicBool::new(false));
        let _ = self
            .inner
            .sessions
            .entry(session_id.clone())
            .or_default()
            .insert(
                id,
                Slot {
                    tx,
                    lagged: lagged.clone(),
                },
            );
        debug!(role = %self.inner.role, session_id = %session_id, sub_id = id, "subscribed");
        Subscription {
            id,
            session_id: session_id.clone(),
            rx,
            lagged,
            broker: Arc::downgrade(&self.inner),
            registered: true,
        }
    }

    /// Hand `event` to every subscription of its session. Returns how many
    /// subscriptions accepted it.
    pub fn publish(&self, event: &Arc<Event>) -> usize {
        let role = self.inner.role;
        let mut delivered = 0;
        let mut evicted = 0;

        if let Some(mut subs) = self.inner.sessions.get_mut(&event.session_id) {
            subs.retain(|id, slot| match slot.tx.try_send(event.clone()) {
                Ok(()) => {
                    delivered += 1;
                    true
                }
                Err(mpsc::error::TrySendError::Full(_)) => {
                    slot.lagged.store(true, Ordering::Release);
                    warn!(role = %role, session_id = %event.session_id, sub_id = id, "subscriber buffer full, evicting");
                    evicted += 1;
                    false
                }
                Err(mpsc::error::TrySendError::Closed(_)) => false,
            });
        } else {
            return 0;
        }

        if evicted > 0 {
            counter!(RELAY_SUBSCRIBERS_LAGGED_TOTAL, "role" => role.as_str()).increment(evicted);
        }
        let _ = self
            .inner
            .sessions
            .remove_if(&event.session_id, |_, subs| subs.is_empty());
        delivered
    }

    /// Live subscriptions for one session.
    pub fn subscriber_count(&self, session_id: &SessionId) -> usize {
        self.inner
            .sessions
            .get(session_id)
            .map_or(0, |subs| subs.len())
    }

    /// Live subscriptions across all sessions.
    pub fn total_subscriptions(&self) -> usize {
        self.inner.sessions.iter().map(|e| e.value().len()).sum()
    }

    /// Sessions with at least one live subscription.
    pub fn session_count(&self) -> usize {
        self.inner.sessions.len()
    }
}

/// A live subscription. Dropping it unsubscribes.
pub struct Subscription {
    id: u64,
    session_id: SessionId,
    rx: mpsc::Receiver<Arc<Event>>,
    lagged: Arc<AtomicBool>,
    broker: Weak<Inner>,
    registered: bool,
}

impl Subscription {
    /// Next delivered event. `None` once the subscription has been evicted
    /// or removed and its queue is drained.
    pub async fn recv(&mut self) -> Option<Arc<Event>> {
        self.rx.recv().await
    }

    /// Whether the broker evicted this subscription for falling behind.
    pub fn is_lagged(&self) -> bool {
        self.lagged.load(Ordering::Acquire)
    }

    /// Session this subscription is bound to.
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Remove from the broker. Safe to call more than once.
    pub fn unsubscribe(&mut self) {
        if !self.registered {
            return;
        }
        self.registered = false;
        if let Some(inner) = self.broker.upgrade() {
            inner.remove(&self.session_id, self.id);
            debug!(role = %inner.role, session_id = %self.session_id, sub_id = self.id, "unsubscribed");
        }
        self.rx.close();
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
