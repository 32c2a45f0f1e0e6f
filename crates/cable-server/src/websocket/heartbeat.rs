//! Periodic `ping` frames.

use std::time::Duration;

use cable_core::ServerFrame;
use chrono::Utc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Outcome of the heartbeat loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatResult {
    /// The heartbeat was cancelled by the session.
    Cancelled,
    /// The outbound queue is gone, so the transport is dead.
    TransportClosed,
}

/// Send a ping immediately and then every `interval` until cancelled.
pub async fn run_heartbeat(
    outbound: mpsc::Sender<ServerFrame>,
    interval: Duration,
    cancel: CancellationToken,
) -> HeartbeatResult {
    let mut ticker = time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => return HeartbeatResult::Cancelled,
            _ = ticker.tick() => {
                let frame = ServerFrame::ping(Utc::now().timestamp());
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => return HeartbeatResult::Cancelled,
                    sent = outbound.send(frame) => {
                        if sent.is_err() {
                            return HeartbeatResult::TransportClosed;
                        }
                    }
                }
            }
        }
    }
}

/// A running heartbeat task and the token that stops it.
pub struct Heartbeat {
    token: CancellationToken,
    handle: JoinHandle<HeartbeatResult>,
}

impl Heartbeat {
    pub fn spawn(outbound: mpsc::Sender<ServerFrame>, interval: Duration) -> Self {
        let token = CancellationToken::new();
        let handle = tokio::spawn(run_heartbeat(outbound, interval, token.clone()));
        Self { token, handle }
    }

    /// Cancel the task and wait for it to finish.
    ///
    /// Once this returns no further ping is queued.
    pub async fn stop(self) -> HeartbeatResult {
        self.token.cancel();
        self.handle.await.unwrap_or(HeartbeatResult::Cancelled)
    }
}
