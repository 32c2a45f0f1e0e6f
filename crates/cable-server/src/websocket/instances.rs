//! Channel instances owned by one connection, keyed by canonical identifier.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;

use cable_core::{CableError, ConnectionId, Identifier};
use tracing::debug;

use crate::channel::{Channel, ChannelContext, ChannelRegistry};

pub struct ChannelInstances {
    connection_id: ConnectionId,
    registry: Arc<ChannelRegistry>,
    instances: HashMap<String, Box<dyn Channel>>,
}

impl ChannelInstances {
    pub fn new(connection_id: ConnectionId, registry: Arc<ChannelRegistry>) -> Self {
        Self {
            connection_id,
            registry,
            instances: HashMap::new(),
        }
    }

    /// The instance for `identifier`, constructing it on first reference.
    pub fn resolve_or_create(
        &mut self,
        identifier: &Identifier,
    ) -> Result<&mut dyn Channel, CableError> {
        let channel = match self.instances.entry(identifier.key().to_owned()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let ctx = ChannelContext::new(self.connection_id.clone(), identifier.clone());
                let instance = self.registry.build(ctx)?;
                debug!(
                    conn_id = %self.connection_id,
                    channel = identifier.channel(),
                    identifier = identifier.key(),
                    "created channel instance"
                );
                entry.insert(instance)
            }
        };
        Ok(channel.as_mut())
    }

    /// Drop the instance for `key`. Returns whether one existed.
    pub fn remove(&mut self, key: &str) -> bool {
        let removed = self.instances.remove(key).is_some();
        if removed {
            debug!(conn_id = %self.connection_id, identifier = key, "removed channel instance");
        }
        removed
    }

    pub fn contains(&self, key: &str) -> bool {
        self.instances.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    pub fn clear(&mut self) {
        self.instances.clear();
    }
}
