//! Channels and buses shared by the unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use cable_core::{ClientCommand, ConnectionId, Identifier};
use parking_lot::Mutex;
use serde_json::Value;

use crate::bus::{BusError, ConnectionRef, GroupBus, MemoryBus};
use crate::channel::{Channel, ChannelContext, ChannelError, ChannelRegistry, Streams};

/// Streams from the group named by its `group` parameter.
///
/// A `reject` parameter makes `subscribe` fail.
pub(crate) struct GroupChannel {
    ctx: ChannelContext,
}

impl GroupChannel {
    pub(crate) fn factory(ctx: ChannelContext) -> Box<dyn Channel> {
        Box::new(Self { ctx })
    }
}

#[async_trait]
impl Channel for GroupChannel {
    async fn subscribe(&mut self, streams: &mut Streams<'_>) -> Result<(), ChannelError> {
        if self.ctx.params().contains_key("reject") {
            return Err(ChannelError::Rejected("rejected by test".into()));
        }
        if let Some(group) = self.ctx.param_string("group") {
            streams.stream_from(&group).await?;
        }
        Ok(())
    }
}

pub(crate) fn group_registry_owned() -> ChannelRegistry {
    let mut registry = ChannelRegistry::new();
    registry.register("Room", GroupChannel::factory);
    registry
}

pub(crate) fn group_registry() -> Arc<ChannelRegistry> {
    Arc::new(group_registry_owned())
}

/// A registry whose `name` constructor counts how often it runs.
pub(crate) fn counting_registry(name: &str) -> (Arc<ChannelRegistry>, Arc<AtomicUsize>) {
    let built = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&built);
    let mut registry = ChannelRegistry::new();
    registry.register(name, move |ctx| {
        let _ = counter.fetch_add(1, Ordering::SeqCst);
        GroupChannel::factory(ctx)
    });
    (Arc::new(registry), built)
}

pub(crate) fn subscribe_frame(identifier: &str) -> String {
    ClientCommand::encode("subscribe", &Identifier::parse(identifier).unwrap_or_else(|e| panic!("{e}")))
}

pub(crate) fn unsubscribe_frame(identifier: &str) -> String {
    ClientCommand::encode("unsubscribe", &Identifier::parse(identifier).unwrap_or_else(|e| panic!("{e}")))
}

/// Records every add/discard and delegates delivery to a [`MemoryBus`].
#[derive(Default)]
pub(crate) struct RecordingBus {
    inner: MemoryBus,
    adds: Mutex<Vec<String>>,
    discards: Mutex<Vec<String>>,
}

impl RecordingBus {
    pub(crate) fn adds(&self) -> Vec<String> {
        self.adds.lock().clone()
    }

    pub(crate) fn discards(&self) -> Vec<String> {
        self.discards.lock().clone()
    }
}

#[async_trait]
impl GroupBus for RecordingBus {
    async fn group_add(&self, group: &str, connection: &ConnectionRef) -> Result<(), BusError> {
        self.adds.lock().push(group.to_owned());
        self.inner.group_add(group, connection).await
    }

    async fn group_discard(&self, group: &str, connection: &ConnectionId) -> Result<(), BusError> {
        self.discards.lock().push(group.to_owned());
        self.inner.group_discard(group, connection).await
    }

    async fn group_send(&self, group: &str, message: Value) -> Result<usize, BusError> {
        self.inner.group_send(group, message).await
    }
}

/// A bus whose backend is always down.
pub(crate) struct FlakyBus;

#[async_trait]
impl GroupBus for FlakyBus {
    async fn group_add(&self, _group: &str, _connection: &ConnectionRef) -> Result<(), BusError> {
        Err(BusError::Unavailable("backend down".into()))
    }

    async fn group_discard(&self, _group: &str, _connection: &ConnectionId) -> Result<(), BusError> {
        Err(BusError::Unavailable("backend down".into()))
    }

    async fn group_send(&self, _group: &str, _message: Value) -> Result<usize, BusError> {
        Err(BusError::Unavailable("backend down".into()))
    }
}
