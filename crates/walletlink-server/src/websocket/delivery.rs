//! Replay and live delivery for one connection.
//!
//! The subscription is registered before the store is read, so an event
//! appended while replay runs is either in the replay batch, in the live
//! queue, or both. Both streams are merged on the connection's cursor:
//! anything at or below it is a duplicate, anything past `cursor + 1` means
//! live delivery skipped ahead and the gap is filled from the store.

use std::sync::Arc;

use metrics::counter;
use tokio::sync::mpsc;
use tracing::{debug, info};
use walletlink_core::{RelayError, Role, SessionId};
use walletlink_events::{Event, EventStore};

use crate::broker::{PubSub, Subscription};
use crate::metrics::{RELAY_REPLAYED_EVENTS_TOTAL, RELAY_STORE_ERRORS_TOTAL};
use crate::protocol::ServerFrame;

/// Feeds one connection's outbound queue with events from the opposite role.
pub struct Delivery {
    store: Arc<dyn EventStore>,
    broker: PubSub,
    session_id: SessionId,
    role: Role,
    cursor: u64,
    out: mpsc::Sender<ServerFrame>,
}

impl Delivery {
    /// `broker` must be `role`'s own broker; `cursor` is the client's
    /// `lastSeenSequence`.
    pub fn new(
        store: Arc<dyn EventStore>,
        broker: PubSub,
        session_id: SessionId,
        role: Role,
        cursor: u64,
        out: mpsc::Sender<ServerFrame>,
    ) -> Self {
        Self {
            store,
            broker,
            session_id,
            role,
            cursor,
            out,
        }
    }

    /// Replay, announce `ready`, then deliver live until the subscription
    /// ends or the outbound queue closes.
    ///
    /// Returns `Err(Transport)` when the writer has gone away and
    /// `Err(StorageUnavailable)` when the store cannot be read.
    pub async fn run(mut self, mut sub: Subscription) -> Result<(), RelayError> {
        let replayed = self.catch_up().await?;
        let linked = self.store.is_linked(&self.session_id).await.map_err(|e| {
            counter!(RELAY_STORE_ERRORS_TOTAL).increment(1);
            RelayError::from(e)
        })?;
        debug!(replayed, cursor = self.cursor, linked, "replay complete");
        self.send(ServerFrame::Ready {
            session_id: self.session_id.clone(),
            role: self.role,
            linked,
            last_sequence: self.cursor,
        })
        .await?;

        loop {
            match sub.recv().await {
                Some(event) => self.on_live(event).await?,
                None if sub.is_lagged() => {
                    info!(cursor = self.cursor, "subscriber lagged, resubscribing");
                    sub = self.broker.subscribe(&self.session_id);
                    let _ = self.catch_up().await?;
                }
                None => return Ok(()),
            }
        }
    }

    async fn on_live(&mut self, event: Arc<Event>) -> Result<(), RelayError> {
        if event.sequence <= self.cursor {
            return Ok(());
        }
        if event.sequence == self.cursor + 1 {
            return self.forward(event).await;
        }
        debug!(
            cursor = self.cursor,
            received = event.sequence,
            "live gap, filling from store"
        );
        let _ = self.catch_up().await?;
        Ok(())
    }

    /// Deliver everything stored after the cursor. Returns how many events
    /// were forwarded.
    async fn catch_up(&mut self) -> Result<usize, RelayError> {
        let events = self
            .store
            .events_since(&self.session_id, self.role.opposite(), self.cursor)
            .await
            .map_err(|e| {
                counter!(RELAY_STORE_ERRORS_TOTAL).increment(1);
                RelayError::from(e)
            })?;

        let mut forwarded = 0;
        for event in events {
            if event.sequence <= self.cursor {
                continue;
            }
            self.forward(Arc::new(event)).await?;
            forwarded += 1;
        }
        if forwarded > 0 {
            counter!(RELAY_REPLAYED_EVENTS_TOTAL).increment(forwarded as u64);
        }
        Ok(forwarded)
    }

    async fn forward(&mut self, event: Arc<Event>) -> Result<(), RelayError> {
        let seq = event.sequence;
        self.send(ServerFrame::Event(event)).await?;
        self.cursor = seq;
        Ok(())
    }

    async fn send(&self, frame: ServerFrame) -> Result<(), RelayError> {
        self.out
            .send(frame)
            .await
            .map_err(|_| RelayError::Transport("outbound queue closed".into()))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
