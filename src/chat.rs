//! Demo channel: one group per chat room.

use async_trait::async_trait;
use cable_server::{Channel, ChannelContext, ChannelError, ChannelRegistry, Streams};
use tracing::debug;

pub const CHAT_CHANNEL: &str = "ChatChannel";

/// Streams from `chat_{pk}`, where `pk` comes from the identifier.
pub struct ChatChannel {
    ctx: ChannelContext,
}

impl ChatChannel {
    pub fn new(ctx: ChannelContext) -> Self {
        Self { ctx }
    }

    pub fn group_name(pk: &str) -> String {
        format!("chat_{pk}")
    }
}

#[async_trait]
impl Channel for ChatChannel {
    async fn subscribe(&mut self, streams: &mut Streams<'_>) -> Result<(), ChannelError> {
        let group = Self::group_name(&self.ctx.require_param("pk")?);
        debug!(conn_id = %self.ctx.connection_id, group = %group, "chat subscribe");
        streams.stream_from(&group).await
    }

    async fn unsubscribe(&mut self, streams: &mut Streams<'_>) -> Result<(), ChannelError> {
        match self.ctx.param_string("pk") {
            Some(pk) => streams.stop_stream_from(&Self::group_name(&pk)).await,
            None => Ok(()),
        }
    }
}

/// Register every channel this binary ships.
pub fn register_all(registry: &mut ChannelRegistry) {
    registry.register(CHAT_CHANNEL, |ctx| -> Box<dyn Channel> {
        Box::new(ChatChannel::new(ctx))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use cable_core::{ConnectionId, Identifier};

    #[test]
    fn group_name_uses_pk() {
        assert_eq!(ChatChannel::group_name("42"), "chat_42");
    }

    #[test]
    fn register_all_adds_chat_channel() {
        let mut registry = ChannelRegistry::new();
        register_all(&mut registry);
        assert_eq!(registry.channels(), vec![CHAT_CHANNEL.to_string()]);

        let ctx = ChannelContext::new(
            ConnectionId::from_raw("conn_demo"),
            Identifier::parse(r#"{"channel":"ChatChannel","pk":"1"}"#).unwrap(),
        );
        assert!(registry.build(ctx).is_ok());
    }
}
