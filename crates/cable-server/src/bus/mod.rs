//! Group bus: the broadcast layer connections join groups on.
//!
//! The session only ever talks to [`GroupBus`]; a multi-node deployment swaps
//! in a networked implementation, [`memory::MemoryBus`] covers a single
//! process. Events carry their group name so a connection can route them
//! without any other context.

pub mod memory;

use async_trait::async_trait;
use cable_core::ConnectionId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

pub use memory::MemoryBus;

/// A message published to a group.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GroupEvent {
    /// Group the message was sent to.
    pub group: String,
    /// Payload forwarded verbatim as the data frame's `message`.
    pub message: Value,
}

/// Errors reported by a bus backend.
#[derive(Debug, Error)]
pub enum BusError {
    /// The backend could not be reached.
    #[error("group bus unavailable: {0}")]
    Unavailable(String),
    /// The backend refused the operation.
    #[error("group bus rejected {operation} on `{group}`: {reason}")]
    Rejected {
        operation: &'static str,
        group: String,
        reason: String,
    },
}

/// Outcome of handing one event to a connection's inbox.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Delivery {
    Delivered,
    /// The inbox is at capacity; the event was dropped for this connection.
    Full,
    /// The owning session is gone.
    Closed,
}

/// Delivery address of one connection: its id plus its event inbox.
#[derive(Clone, Debug)]
pub struct ConnectionRef {
    id: ConnectionId,
    inbox: mpsc::Sender<GroupEvent>,
}

impl ConnectionRef {
    pub fn new(id: ConnectionId, inbox: mpsc::Sender<GroupEvent>) -> Self {
        Self { id, inbox }
    }

    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    /// Push an event into the connection's inbox without waiting for room.
    pub fn try_deliver(&self, event: GroupEvent) -> Delivery {
        match self.inbox.try_send(event) {
            Ok(()) => Delivery::Delivered,
            Err(TrySendError::Full(_)) => Delivery::Full,
            Err(TrySendError::Closed(_)) => Delivery::Closed,
        }
    }

    /// Whether the owning session has dropped its inbox.
    pub fn is_closed(&self) -> bool {
        self.inbox.is_closed()
    }
}

/// Process- or cluster-wide group membership and fan-out.
#[async_trait]
pub trait GroupBus: Send + Sync {
    /// Join `connection` to `group`. Joining twice is harmless.
    async fn group_add(&self, group: &str, connection: &ConnectionRef) -> Result<(), BusError>;

    /// Remove a connection from `group`. Unknown groups or members are ignored.
    async fn group_discard(&self, group: &str, connection: &ConnectionId) -> Result<(), BusError>;

    /// Deliver `message` to every connection joined to `group`.
    ///
    /// Never waits on a single slow connection. Returns how many connections
    /// accepted the event.
    async fn group_send(&self, group: &str, message: Value) -> Result<usize, BusError>;
}

/// Publish `data` to `group`, defaulting to an empty object.
pub async fn broadcast(
    bus: &dyn GroupBus,
    group: &str,
    data: Option<Value>,
) -> Result<usize, BusError> {
    let message = data.unwrap_or_else(|| Value::Object(serde_json::Map::new()));
    bus.group_send(group, message).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn connection_ref_delivers_until_closed() {
        let (tx, mut rx) = mpsc::channel(4);
        let conn = ConnectionRef::new(ConnectionId::from_raw("conn_a"), tx);
        let event = GroupEvent {
            group: "g".into(),
            message: json!(1),
        };
        assert_eq!(conn.try_deliver(event.clone()), Delivery::Delivered);
        assert_eq!(rx.recv().await.unwrap(), event);

        drop(rx);
        assert!(conn.is_closed());
        assert_eq!(conn.try_deliver(event), Delivery::Closed);
    }

    #[test]
    fn connection_ref_reports_full_inbox() {
        let (tx, mut rx) = mpsc::channel(1);
        let conn = ConnectionRef::new(ConnectionId::from_raw("conn_a"), tx);
        let event = GroupEvent {
            group: "g".into(),
            message: json!(1),
        };
        assert_eq!(conn.try_deliver(event.clone()), Delivery::Delivered);
        assert_eq!(conn.try_deliver(event.clone()), Delivery::Full);

        assert_eq!(rx.try_recv().unwrap(), event);
        assert_eq!(conn.try_deliver(event), Delivery::Delivered);
    }

    #[tokio::test]
    async fn broadcast_defaults_to_empty_object() {
        let bus = MemoryBus::new();
        let (tx, mut rx) = mpsc::channel(4);
        let conn = ConnectionRef::new(ConnectionId::from_raw("conn_a"), tx);
        bus.group_add("chat_1", &conn).await.unwrap();

        let delivered = broadcast(&bus, "chat_1", None).await.unwrap();
        assert_eq!(delivered, 1);
        let event = rx.recv().await.unwrap();
        assert_eq!(event.group, "chat_1");
        assert_eq!(event.message, json!({}));
    }

    #[test]
    fn rejected_display() {
        let err = BusError::Rejected {
            operation: "group_add",
            group: "chat_1".into(),
            reason: "quota".into(),
        };
        assert_eq!(
            err.to_string(),
            "group bus rejected group_add on `chat_1`: quota"
        );
    }
}
