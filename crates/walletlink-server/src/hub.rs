//! The relay's shared core: one store, two brokers, the webhook.

use std::sync::Arc;

use walletlink_core::Role;
use walletlink_events::EventStore;

use crate::broker::PubSub;
use crate::webhook::Webhook;
use crate::websocket::connection::ConnectionRegistry;

/// Everything a connection needs to relay messages.
pub struct RelayHub {
    /// Event store shared by every connection.
    pub store: Arc<dyn EventStore>,
    agent: PubSub,
    signer: PubSub,
    /// Linking notifier.
    pub webhook: Arc<dyn Webhook>,
    /// Public URL passed to the webhook.
    pub server_url: String,
    /// Open connections.
    pub connections: Arc<ConnectionRegistry>,
}

impl RelayHub {
    /// Build a hub whose brokers buffer `subscriber_buffer` events per
    /// subscription.
    pub fn new(
        store: Arc<dyn EventStore>,
        webhook: Arc<dyn Webhook>,
        server_url: impl Into<String>,
        subscriber_buffer: usize,
    ) -> Self {
        Self {
            store,
            agent: PubSub::new(Role::Agent, subscriber_buffer),
            signer: PubSub::new(Role::Signer, subscriber_buffer),
            webhook,
            server_url: server_url.into(),
            connections: Arc::new(ConnectionRegistry::new()),
        }
    }

    /// Broker holding the subscriptions of `role` connections.
    ///
    /// A connection subscribes on its own role's broker and publishes on
    /// `broker(role.opposite())`.
    pub fn broker(&self, role: Role) -> &PubSub {
        match role {
            Role::Agent => &self.agent,
            Role::Signer => &self.signer,
        }
    }

    /// Live subscriptions on both brokers.
    pub fn total_subscriptions(&self) -> usize {
        self.agent.total_subscriptions() + self.signer.total_subscriptions()
    }
}
