//! Per-connection protocol state machine.
//!
//! A [`CableSession`] is the single owner of a connection's channel instances
//! and group membership. [`CableSession::run`] multiplexes client commands,
//! bus events and shutdown on one task, so commands are handled strictly in
//! order and neither map needs a lock.

use std::sync::Arc;

use cable_core::{ClientCommand, Command, ConnectionId, Identifier, ServerFrame};
use cable_settings::{CableSettings, HeartbeatSettings};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::groups::GroupMembership;
use super::heartbeat::Heartbeat;
use super::instances::ChannelInstances;
use crate::bus::{ConnectionRef, GroupBus, GroupEvent};
use crate::channel::{ChannelRegistry, Streams};

/// The outbound queue was closed; the writer is gone.
#[derive(Debug, Error)]
#[error("transport closed")]
pub struct TransportClosed;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Open,
    Closed,
}

/// Why [`CableSession::run`] returned.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CloseReason {
    /// The client went away (close frame, read error or EOF).
    ClientGone,
    /// Writing to the client failed.
    TransportClosed,
    /// The server is shutting down.
    Shutdown,
}

/// Shared collaborators every session is built from.
#[derive(Clone)]
pub struct SessionDeps {
    pub registry: Arc<ChannelRegistry>,
    pub bus: Arc<dyn GroupBus>,
    pub heartbeat: HeartbeatSettings,
    /// Capacity of the outbound frame queue drained by the writer.
    pub send_queue: usize,
    /// Capacity of the inbound text queue filled by the reader.
    pub receive_queue: usize,
    pub inbox_capacity: usize,
}

impl SessionDeps {
    pub fn from_settings(
        settings: &CableSettings,
        registry: Arc<ChannelRegistry>,
        bus: Arc<dyn GroupBus>,
    ) -> Self {
        Self {
            registry,
            bus,
            heartbeat: settings.heartbeat.clone(),
            send_queue: settings.server.send_queue.max(1),
            receive_queue: settings.server.receive_queue.max(1),
            inbox_capacity: settings.bus.inbox_capacity.max(1),
        }
    }
}

pub struct CableSession {
    id: ConnectionId,
    state: SessionState,
    outbound: mpsc::Sender<ServerFrame>,
    instances: ChannelInstances,
    groups: GroupMembership,
    heartbeat_settings: HeartbeatSettings,
    heartbeat: Option<Heartbeat>,
}

impl CableSession {
    /// Build a session writing to `outbound`.
    ///
    /// Returns the receiving end of the connection's bus inbox.
    pub fn new(
        id: ConnectionId,
        deps: &SessionDeps,
        outbound: mpsc::Sender<ServerFrame>,
    ) -> (Self, mpsc::Receiver<GroupEvent>) {
        let (inbox_tx, inbox_rx) = mpsc::channel(deps.inbox_capacity.max(1));
        let conn = ConnectionRef::new(id.clone(), inbox_tx);
        let session = Self {
            instances: ChannelInstances::new(id.clone(), Arc::clone(&deps.registry)),
            groups: GroupMembership::new(conn, Arc::clone(&deps.bus)),
            id,
            state: SessionState::Connecting,
            outbound,
            heartbeat_settings: deps.heartbeat.clone(),
            heartbeat: None,
        };
        (session, inbox_rx)
    }

    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }

    pub fn has_instance(&self, key: &str) -> bool {
        self.instances.contains(key)
    }

    pub fn is_joined(&self, group: &str) -> bool {
        self.groups.is_joined(group)
    }

    pub fn subscribers_of(&self, group: &str) -> Vec<String> {
        self.groups.subscribers_of(group)
    }

    /// Send `welcome` and start the heartbeat.
    pub async fn open(&mut self) -> Result<(), TransportClosed> {
        self.send(ServerFrame::welcome()).await?;
        if self.heartbeat_settings.enabled {
            self.heartbeat = Some(Heartbeat::spawn(
                self.outbound.clone(),
                self.heartbeat_settings.interval(),
            ));
        }
        self.state = SessionState::Open;
        info!(conn_id = %self.id, heartbeat = self.heartbeat.is_some(), "connection open");
        Ok(())
    }

    /// Handle one text frame from the client.
    ///
    /// Malformed frames and unknown channels are logged and dropped; only a
    /// dead transport is an error.
    pub async fn handle_text(&mut self, text: &str) -> Result<(), TransportClosed> {
        let cmd = match ClientCommand::parse(text) {
            Ok(cmd) => cmd,
            Err(err) => {
                warn!(conn_id = %self.id, error = %err, "dropping malformed command");
                return Ok(());
            }
        };
        match cmd.command {
            Command::Subscribe => self.subscribe(&cmd.identifier).await,
            Command::Unsubscribe => {
                self.unsubscribe(&cmd.identifier).await;
                Ok(())
            }
            Command::Other(name) => {
                debug!(conn_id = %self.id, command = %name, identifier = %cmd.identifier, "ignoring command");
                Ok(())
            }
        }
    }

    #[instrument(skip_all, fields(conn_id = %self.id, identifier = %identifier))]
    async fn subscribe(&mut self, identifier: &Identifier) -> Result<(), TransportClosed> {
        let channel = match self.instances.resolve_or_create(identifier) {
            Ok(channel) => channel,
            Err(err) => {
                warn!(error = %err, "subscribe dropped");
                return Ok(());
            }
        };
        let mut streams = Streams::new(identifier.key(), &mut self.groups);
        if let Err(err) = channel.subscribe(&mut streams).await {
            warn!(error = %err, "subscribe callback failed, not confirming");
            return Ok(());
        }
        debug!("subscription confirmed");
        self.send(ServerFrame::confirm_subscription(identifier)).await
    }

    #[instrument(skip_all, fields(conn_id = %self.id, identifier = %identifier))]
    async fn unsubscribe(&mut self, identifier: &Identifier) {
        let channel = match self.instances.resolve_or_create(identifier) {
            Ok(channel) => channel,
            Err(err) => {
                warn!(error = %err, "unsubscribe dropped");
                return;
            }
        };
        let mut streams = Streams::new(identifier.key(), &mut self.groups);
        if let Err(err) = channel.unsubscribe(&mut streams).await {
            warn!(error = %err, "unsubscribe callback failed");
        }
        self.release(identifier.key()).await;
        debug!("unsubscribed");
    }

    /// Remove an instance along with any group interest it still holds.
    async fn release(&mut self, key: &str) {
        let _ = self.instances.remove(key);
        if let Err(err) = self.groups.leave_all(key).await {
            warn!(conn_id = %self.id, identifier = key, error = %err, "failed to release groups");
        }
    }

    /// Forward a bus event to every identifier subscribed to its group.
    pub async fn handle_event(&mut self, event: GroupEvent) -> Result<(), TransportClosed> {
        let keys = self.groups.subscribers_of(&event.group);
        for key in keys {
            self.send(ServerFrame::data(key, event.message.clone())).await?;
        }
        Ok(())
    }

    /// Stop the heartbeat and forget all subscriptions.
    ///
    /// Channel callbacks are not run and the bus is not told; it drops the
    /// connection once its inbox is gone.
    pub async fn close(&mut self) {
        if let Some(heartbeat) = self.heartbeat.take() {
            let _ = heartbeat.stop().await;
        }
        self.instances.clear();
        self.groups.clear();
        self.state = SessionState::Closed;
    }

    async fn send(&self, frame: ServerFrame) -> Result<(), TransportClosed> {
        self.outbound.send(frame).await.map_err(|_| TransportClosed)
    }

    /// Drive the session until the client leaves, the writer dies or
    /// `shutdown` fires.
    pub async fn run(
        mut self,
        mut inbound: mpsc::Receiver<String>,
        mut events: mpsc::Receiver<GroupEvent>,
        shutdown: CancellationToken,
    ) -> CloseReason {
        if self.open().await.is_err() {
            self.close().await;
            return CloseReason::TransportClosed;
        }

        let outbound = self.outbound.clone();
        let reason = loop {
            let step = tokio::select! {
                biased;
                () = shutdown.cancelled() => break CloseReason::Shutdown,
                () = outbound.closed() => break CloseReason::TransportClosed,
                text = inbound.recv() => match text {
                    Some(text) => self.handle_text(&text).await,
                    None => break CloseReason::ClientGone,
                },
                Some(event) = events.recv() => self.handle_event(event).await,
            };
            if step.is_err() {
                break CloseReason::TransportClosed;
            }
        };

        self.close().await;
        info!(conn_id = %self.id, ?reason, "connection closed");
        reason
    }
}
