//! In-process group bus for single-node deployments and tests.

use std::collections::HashMap;

use async_trait::async_trait;
use cable_core::ConnectionId;
use dashmap::DashMap;
use serde_json::Value;
use tracing::{debug, trace, warn};

use super::{BusError, ConnectionRef, Delivery, GroupBus, GroupEvent};

/// Group membership held in a concurrent map.
///
/// Connections that closed without leaving are pruned lazily the next time
/// their group is sent to. A connection whose inbox is full misses that
/// event and stays joined.
#[derive(Debug, Default)]
pub struct MemoryBus {
    groups: DashMap<String, HashMap<ConnectionId, ConnectionRef>>,
}

impl MemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of connections joined to `group`.
    pub fn members(&self, group: &str) -> usize {
        self.groups.get(group).map_or(0, |members| members.len())
    }

    /// Whether `connection` is joined to `group`.
    pub fn is_member(&self, group: &str, connection: &ConnectionId) -> bool {
        self.groups
            .get(group)
            .is_some_and(|members| members.contains_key(connection))
    }

    /// Number of groups with at least one member.
    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    fn remove_member(&self, group: &str, connection: &ConnectionId) -> bool {
        let removed = self
            .groups
            .get_mut(group)
            .is_some_and(|mut members| members.remove(connection).is_some());
        let _ = self.groups.remove_if(group, |_, members| members.is_empty());
        removed
    }
}

#[async_trait]
impl GroupBus for MemoryBus {
    async fn group_add(&self, group: &str, connection: &ConnectionRef) -> Result<(), BusError> {
        let _ = self
            .groups
            .entry(group.to_owned())
            .or_default()
            .insert(connection.id().clone(), connection.clone());
        debug!(group, conn_id = %connection.id(), "joined group");
        Ok(())
    }

    async fn group_discard(&self, group: &str, connection: &ConnectionId) -> Result<(), BusError> {
        if self.remove_member(group, connection) {
            debug!(group, conn_id = %connection, "left group");
        }
        Ok(())
    }

    async fn group_send(&self, group: &str, message: Value) -> Result<usize, BusError> {
        let members: Vec<ConnectionRef> = self
            .groups
            .get(group)
            .map(|members| members.values().cloned().collect())
            .unwrap_or_default();

        let mut delivered = 0;
        let mut dead = Vec::new();
        for member in &members {
            let event = GroupEvent {
                group: group.to_owned(),
                message: message.clone(),
            };
            match member.try_deliver(event) {
                Delivery::Delivered => delivered += 1,
                Delivery::Full => {
                    warn!(group, conn_id = %member.id(), "inbox full, dropping group message");
                }
                Delivery::Closed => dead.push(member.id().clone()),
            }
        }

        for id in &dead {
            let _ = self.remove_member(group, id);
            debug!(group, conn_id = %id, "pruned closed connection");
        }
        trace!(group, delivered, pruned = dead.len(), "group send");
        Ok(delivered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::sync::mpsc;

    fn make_ref(id: &str) -> (ConnectionRef, mpsc::Receiver<GroupEvent>) {
        make_ref_with_capacity(id, 16)
    }

    fn make_ref_with_capacity(
        id: &str,
        capacity: usize,
    ) -> (ConnectionRef, mpsc::Receiver<GroupEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (ConnectionRef::new(ConnectionId::from_raw(id), tx), rx)
    }

    #[tokio::test]
    async fn send_reaches_all_members() {
        let bus = MemoryBus::new();
        let (a, mut rx_a) = make_ref("a");
        let (b, mut rx_b) = make_ref("b");
        bus.group_add("chat_1", &a).await.unwrap();
        bus.group_add("chat_1", &b).await.unwrap();

        let delivered = bus.group_send("chat_1", json!("hi")).await.unwrap();
        assert_eq!(delivered, 2);
        assert_eq!(rx_a.recv().await.unwrap().message, json!("hi"));
        assert_eq!(rx_b.recv().await.unwrap().group, "chat_1");
    }

    #[tokio::test]
    async fn send_skips_other_groups() {
        let bus = MemoryBus::new();
        let (a, mut rx_a) = make_ref("a");
        bus.group_add("chat_1", &a).await.unwrap();

        assert_eq!(bus.group_send("chat_2", json!(1)).await.unwrap(), 0);
        assert!(rx_a.try_recv().is_err());
    }

    #[tokio::test]
    async fn add_is_idempotent() {
        let bus = MemoryBus::new();
        let (a, mut rx_a) = make_ref("a");
        bus.group_add("g", &a).await.unwrap();
        bus.group_add("g", &a).await.unwrap();
        assert_eq!(bus.members("g"), 1);

        assert_eq!(bus.group_send("g", json!(1)).await.unwrap(), 1);
        assert!(rx_a.recv().await.is_some());
        assert!(rx_a.try_recv().is_err());
    }

    #[tokio::test]
    async fn discard_removes_member_and_empty_group() {
        let bus = MemoryBus::new();
        let (a, _rx) = make_ref("a");
        bus.group_add("g", &a).await.unwrap();
        assert!(bus.is_member("g", a.id()));

        bus.group_discard("g", a.id()).await.unwrap();
        assert!(!bus.is_member("g", a.id()));
        assert_eq!(bus.group_count(), 0);
    }

    #[tokio::test]
    async fn discard_unknown_is_noop() {
        let bus = MemoryBus::new();
        bus.group_discard("nope", &ConnectionId::from_raw("x"))
            .await
            .unwrap();
        assert_eq!(bus.group_count(), 0);
    }

    #[tokio::test]
    async fn closed_connections_are_pruned_on_send() {
        let bus = MemoryBus::new();
        let (a, rx_a) = make_ref("a");
        let (b, mut rx_b) = make_ref("b");
        bus.group_add("g", &a).await.unwrap();
        bus.group_add("g", &b).await.unwrap();
        drop(rx_a);

        let delivered = bus.group_send("g", json!({"n": 1})).await.unwrap();
        assert_eq!(delivered, 1);
        assert_eq!(bus.members("g"), 1);
        assert!(rx_b.recv().await.is_some());
    }

    #[tokio::test]
    async fn stalled_member_does_not_block_others() {
        let bus = MemoryBus::new();
        let (slow, _slow_rx) = make_ref_with_capacity("slow", 1);
        let (fast, mut fast_rx) = make_ref("fast");
        bus.group_add("g", &slow).await.unwrap();
        bus.group_add("g", &fast).await.unwrap();

        assert_eq!(bus.group_send("g", json!(1)).await.unwrap(), 2);
        for n in 2..=3 {
            let sent = tokio::time::timeout(
                std::time::Duration::from_secs(2),
                bus.group_send("g", json!(n)),
            )
            .await
            .expect("group_send must not wait on a full inbox")
            .unwrap();
            assert_eq!(sent, 1);
        }

        for n in 1..=3 {
            assert_eq!(fast_rx.recv().await.unwrap().message, json!(n));
        }
        assert!(bus.is_member("g", slow.id()));
        assert_eq!(bus.members("g"), 2);
    }
}
