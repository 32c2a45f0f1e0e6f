//! Graceful shutdown: stop accepting, close every session, wait for them to drain.
//!
//! Sessions watch the coordinator's token and close themselves; the
//! coordinator only needs the [`ConnectionTracker`] to know when they are gone.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::websocket::connection::ConnectionTracker;

/// What a drain managed to close.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DrainReport {
    /// Connections open when shutdown began.
    pub open_at_start: usize,
    /// Connections still open when the timeout expired.
    pub cut_off: usize,
}

impl DrainReport {
    pub fn is_clean(&self) -> bool {
        self.cut_off == 0
    }
}

pub struct ShutdownCoordinator {
    token: CancellationToken,
    tracker: Arc<ConnectionTracker>,
}

impl ShutdownCoordinator {
    pub fn new(tracker: Arc<ConnectionTracker>) -> Self {
        Self {
            token: CancellationToken::new(),
            tracker,
        }
    }

    /// Token handed to the listener and every session.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Stop accepting connections and tell open sessions to close.
    pub fn trigger(&self) {
        self.token.cancel();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Trigger shutdown, then wait up to `timeout` for the listener task to
    /// exit and every tracked connection to close.
    pub async fn drain(&self, listener: JoinHandle<()>, timeout: Duration) -> DrainReport {
        let open_at_start = self.tracker.count();
        self.trigger();
        info!(
            connections = open_at_start,
            timeout_secs = timeout.as_secs(),
            "draining cable connections"
        );

        let finished = tokio::time::timeout(timeout, async {
            if let Err(err) = listener.await {
                warn!(error = %err, "listener task failed during shutdown");
            }
            self.tracker.wait_empty().await;
        })
        .await
        .is_ok();

        let report = DrainReport {
            open_at_start,
            cut_off: self.tracker.count(),
        };
        if finished {
            info!(closed = open_at_start, "all connections drained");
        } else {
            warn!(
                cut_off = report.cut_off,
                "shutdown timed out after {timeout:?}"
            );
        }
        report
    }
}
