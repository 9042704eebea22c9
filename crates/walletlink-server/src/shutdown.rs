//! Graceful shutdown coordination.
//!
//! A [`CancellationToken`] tells every connection to wind down; a
//! [`TaskTracker`] records the connection tasks so shutdown can wait for them.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tokio_util::task::task_tracker::TrackedFuture;
use tracing::{info, warn};

/// Coordinates graceful shutdown across all connection tasks.
#[derive(Clone, Default)]
pub struct ShutdownCoordinator {
    token: CancellationToken,
    tracker: TaskTracker,
}

impl ShutdownCoordinator {
    /// Create a new shutdown coordinator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Clone of the server-wide cancellation token.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Spawn a background task that shutdown will wait for.
    pub fn spawn<F>(&self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let _ = self.tracker.spawn(fut);
    }

    /// Wrap `fut` so shutdown waits for it without spawning it here.
    pub fn track<F: Future>(&self, fut: F) -> TrackedFuture<F> {
        self.tracker.track_future(fut)
    }

    /// Signal shutdown without waiting.
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// Whether a shutdown has been initiated.
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Cancel the token, stop accepting tracked tasks, and wait up to
    /// `timeout` for the running ones. Returns `false` on timeout.
    pub async fn graceful_shutdown(&self, timeout: Duration) -> bool {
        self.shutdown();
        let _ = self.tracker.close();
        info!(
            task_count = self.tracker.len(),
            timeout_secs = timeout.as_secs(),
            "waiting for connections to close"
        );
        if tokio::time::timeout(timeout, self.tracker.wait()).await.is_err() {
            warn!(remaining = self.tracker.len(), "shutdown timed out after {timeout:?}");
            return false;
        }
        true
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
