//! Per-connection group membership with local reference counting.
//!
//! Several identifiers on one connection may stream from the same group. The
//! bus only sees one member per connection: it is joined when the first
//! identifier arrives and left when the last one goes.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use cable_core::ConnectionId;
use tracing::{debug, warn};

use crate::bus::{BusError, ConnectionRef, GroupBus};

pub struct GroupMembership {
    conn: ConnectionRef,
    bus: Arc<dyn GroupBus>,
    groups: HashMap<String, BTreeSet<String>>,
}

impl GroupMembership {
    pub fn new(conn: ConnectionRef, bus: Arc<dyn GroupBus>) -> Self {
        Self {
            conn,
            bus,
            groups: HashMap::new(),
        }
    }

    pub fn connection_id(&self) -> &ConnectionId {
        self.conn.id()
    }

    /// Add `key` as a subscriber of `group`.
    ///
    /// On the first local subscriber the bus join is awaited; if it fails the
    /// local state is left as it was.
    pub async fn join(&mut self, group: &str, key: &str) -> Result<(), BusError> {
        let first = !self.groups.contains_key(group);
        if first {
            self.bus.group_add(group, &self.conn).await?;
        }
        let inserted = self
            .groups
            .entry(group.to_owned())
            .or_default()
            .insert(key.to_owned());
        debug!(
            conn_id = %self.conn.id(),
            group,
            identifier = key,
            first,
            inserted,
            "stream_from"
        );
        Ok(())
    }

    /// Remove `key` from `group`, leaving the bus group with the last subscriber.
    ///
    /// Unknown groups and keys are ignored.
    pub async fn leave(&mut self, group: &str, key: &str) -> Result<(), BusError> {
        let Some(keys) = self.groups.get_mut(group) else {
            return Ok(());
        };
        if !keys.remove(key) {
            return Ok(());
        }
        debug!(conn_id = %self.conn.id(), group, identifier = key, "stop_stream_from");
        if keys.is_empty() {
            let _ = self.groups.remove(group);
            self.bus.group_discard(group, self.conn.id()).await?;
        }
        Ok(())
    }

    /// Leave every group `key` streams from.
    ///
    /// Every group is attempted; the first bus error is returned.
    pub async fn leave_all(&mut self, key: &str) -> Result<(), BusError> {
        let groups: Vec<String> = self
            .groups
            .iter()
            .filter(|(_, keys)| keys.contains(key))
            .map(|(group, _)| group.clone())
            .collect();
        let mut first_err = None;
        for group in groups {
            if let Err(err) = self.leave(&group, key).await {
                warn!(conn_id = %self.conn.id(), group = %group, error = %err, "failed to leave group");
                if first_err.is_none() {
                    first_err = Some(err);
                }
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    /// Identifier keys subscribed to `group`, in sorted order.
    pub fn subscribers_of(&self, group: &str) -> Vec<String> {
        match self.groups.get(group) {
            Some(keys) => keys.iter().cloned().collect(),
            None => {
                warn!(conn_id = %self.conn.id(), group, "group has no local subscribers");
                Vec::new()
            }
        }
    }

    pub fn is_joined(&self, group: &str) -> bool {
        self.groups.contains_key(group)
    }

    pub fn groups(&self) -> Vec<String> {
        let mut names: Vec<String> = self.groups.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Forget all local state without bus calls (connection teardown).
    pub fn clear(&mut self) {
        self.groups.clear();
    }
}
