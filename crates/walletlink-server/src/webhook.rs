//! Linking notification.
//!
//! When a session becomes linked the connection that caused it calls
//! [`notify_linked`], which runs the [`Webhook`] on a detached task. Failures
//! are logged and counted, never retried, and never reach the connection.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use metrics::counter;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};
use walletlink_core::SessionId;

use crate::metrics::RELAY_WEBHOOK_FAILURES_TOTAL;

/// Webhook delivery errors.
#[derive(Debug, Error)]
pub enum WebhookError {
    /// Request could not be sent or timed out.
    #[error("webhook request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// Endpoint answered with a non-success status.
    #[error("webhook returned status {0}")]
    Status(u16),
}

/// Receiver of "session linked" notifications.
#[async_trait]
pub trait Webhook: Send + Sync {
    /// Report that `session_id` on the relay at `server_url` is now linked.
    async fn notify(&self, server_url: &str, session_id: &SessionId) -> Result<(), WebhookError>;
}

/// Webhook that does nothing. Used when no URL is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopWebhook;

#[async_trait]
impl Webhook for NoopWebhook {
    async fn notify(&self, _server_url: &str, _session_id: &SessionId) -> Result<(), WebhookError> {
        Ok(())
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LinkedBody<'a> {
    event: &'static str,
    session_id: &'a str,
    server_url: &'a str,
}

/// Webhook that POSTs a JSON body to a fixed URL.
#[derive(Debug, Clone)]
pub struct HttpWebhook {
    client: reqwest::Client,
    url: String,
}

impl HttpWebhook {
    /// Build a webhook posting to `url` with a per-request `timeout`.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, WebhookError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl Webhook for HttpWebhook {
    async fn notify(&self, server_url: &str, session_id: &SessionId) -> Result<(), WebhookError> {
        let body = LinkedBody {
            event: "session.linked",
            session_id: session_id.as_str(),
            server_url,
        };
        let resp = self.client.post(&self.url).json(&body).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(WebhookError::Status(status.as_u16()));
        }
        debug!(session_id = %session_id, status = status.as_u16(), "linking webhook delivered");
        Ok(())
    }
}

/// Fire the webhook for `session_id` on a detached task.
pub fn notify_linked(webhook: Arc<dyn Webhook>, server_url: String, session_id: SessionId) {
    let _ = tokio::spawn(async move {
        if let Err(e) = webhook.notify(&server_url, &session_id).await {
            counter!(RELAY_WEBHOOK_FAILURES_TOTAL).increment(1);
            warn!(session_id = %session_id, error = %e, "linking webhook failed");
        }
    });
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
