//! Socket plumbing: one reader task, one writer task, one session actor.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::ws::{Message, WebSocket};
use cable_core::{ConnectionId, ServerFrame};
use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use tokio::sync::{mpsc, Notify};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use super::session::{CableSession, SessionDeps};

/// Registry of live connections, used for health reporting and shutdown drain.
#[derive(Debug, Default)]
pub struct ConnectionTracker {
    connections: DashMap<ConnectionId, Instant>,
    emptied: Notify,
}

impl ConnectionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track `id` until the returned guard is dropped.
    pub fn register(self: &Arc<Self>, id: ConnectionId) -> ConnectionGuard {
        let _ = self.connections.insert(id.clone(), Instant::now());
        ConnectionGuard {
            tracker: Arc::clone(self),
            id,
        }
    }

    pub fn count(&self) -> usize {
        self.connections.len()
    }

    pub fn contains(&self, id: &ConnectionId) -> bool {
        self.connections.contains_key(id)
    }

    /// Resolves once no connection is tracked.
    pub async fn wait_empty(&self) {
        loop {
            let notified = self.emptied.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.connections.is_empty() {
                return;
            }
            notified.await;
        }
    }

    fn untrack(&self, id: &ConnectionId) {
        let _ = self.connections.remove(id);
        if self.connections.is_empty() {
            self.emptied.notify_waiters();
        }
    }
}

/// Removes its connection from the tracker on drop.
pub struct ConnectionGuard {
    tracker: Arc<ConnectionTracker>,
    id: ConnectionId,
}

impl ConnectionGuard {
    pub fn id(&self) -> &ConnectionId {
        &self.id
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.tracker.untrack(&self.id);
    }
}

/// Serve an upgraded socket until either side goes away or `shutdown` fires.
pub async fn serve_socket(
    socket: WebSocket,
    deps: SessionDeps,
    shutdown: CancellationToken,
    tracker: Arc<ConnectionTracker>,
) {
    let guard = tracker.register(ConnectionId::new());
    let conn_id = guard.id().clone();
    info!(conn_id = %conn_id, "websocket client connected");

    let (mut ws_tx, mut ws_rx) = socket.split();
    let (out_tx, mut out_rx) = mpsc::channel::<ServerFrame>(deps.send_queue.max(1));
    let (in_tx, in_rx) = mpsc::channel::<String>(deps.receive_queue.max(1));

    // Sole writer: frames from the session and the heartbeat never interleave.
    let writer_id = conn_id.clone();
    let writer = tokio::spawn(async move {
        while let Some(frame) = out_rx.recv().await {
            if ws_tx.send(Message::Text(frame.to_json().into())).await.is_err() {
                debug!(conn_id = %writer_id, "write failed");
                break;
            }
        }
        let _ = ws_tx.close().await;
    });

    let reader_id = conn_id.clone();
    let reader = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_rx.next().await {
            match msg {
                Message::Text(text) => {
                    if in_tx.send(text.as_str().to_owned()).await.is_err() {
                        break;
                    }
                }
                Message::Close(_) => break,
                Message::Binary(_) => trace!(conn_id = %reader_id, "ignoring binary frame"),
                // Pings are answered by the transport.
                Message::Ping(_) | Message::Pong(_) => {}
            }
        }
    });

    let (session, events) = CableSession::new(conn_id, &deps, out_tx);
    let _ = session.run(in_rx, events, shutdown).await;

    reader.abort();
    let _ = writer.await;
    drop(guard);
}
