//! # walletlink-server
//!
//! Session-scoped relay between agent and signer connections.
//!
//! - **Brokers**: one [`PubSub`] per role; a publish on one role's connection
//!   fans out on the opposite role's broker
//! - **Connections**: subscribe, replay from the store, then dovetail into live
//!   delivery by sequence number
//! - **Protocol**: `type`-tagged JSON frames over `WebSocket`
//! - **HTTP**: `/rpc/agent`, `/rpc/signer`, `/health`, `/metrics`, optional
//!   static assets, CORS and force-SSL layers
//! - **Linking webhook**: fired once per session when both roles have spoken
//! - **Graceful shutdown** via `CancellationToken` + `TaskTracker`

#![deny(unsafe_code)]

pub mod broker;
pub mod config;
pub mod health;
pub mod hub;
pub mod metrics;
pub mod protocol;
pub mod server;
pub mod shutdown;
pub mod webhook;
pub mod websocket;

pub use broker::{PubSub, Subscription};
pub use config::ServerConfig;
pub use hub::RelayHub;
pub use server::RelayServer;
pub use shutdown::ShutdownCoordinator;
pub use webhook::{HttpWebhook, NoopWebhook, Webhook, WebhookError};
