//! Pluggable channel types.
//!
//! A [`Channel`] is the per-subscription business object. The session builds
//! one per (connection, canonical identifier) through the
//! [`ChannelRegistry`], then calls [`Channel::subscribe`] and
//! [`Channel::unsubscribe`] with a [`Streams`] handle scoped to that
//! identifier, through which the channel joins and leaves groups.

pub mod registry;

use async_trait::async_trait;
use cable_core::{ConnectionId, Identifier};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::bus::BusError;
use crate::websocket::groups::GroupMembership;

pub use registry::{ChannelFactory, ChannelRegistry};

/// Errors a channel callback can return.
///
/// A failed `subscribe` is not confirmed to the client.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error(transparent)]
    Bus(#[from] BusError),
    #[error("identifier is missing parameter `{0}`")]
    MissingParam(String),
    #[error("subscription rejected: {0}")]
    Rejected(String),
}

/// What a channel is constructed with.
#[derive(Clone, Debug)]
pub struct ChannelContext {
    pub connection_id: ConnectionId,
    pub identifier: Identifier,
}

impl ChannelContext {
    pub fn new(connection_id: ConnectionId, identifier: Identifier) -> Self {
        Self {
            connection_id,
            identifier,
        }
    }

    /// Canonical identifier key.
    pub fn key(&self) -> &str {
        self.identifier.key()
    }

    pub fn params(&self) -> &Map<String, Value> {
        self.identifier.params()
    }

    /// A scalar parameter rendered as text (`"1"` and `1` both give `"1"`).
    pub fn param_string(&self, name: &str) -> Option<String> {
        match self.identifier.get(name)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    /// Like [`param_string`](Self::param_string) but a missing value is an error.
    pub fn require_param(&self, name: &str) -> Result<String, ChannelError> {
        self.param_string(name)
            .ok_or_else(|| ChannelError::MissingParam(name.to_owned()))
    }
}

/// Group operations available to a channel callback.
///
/// Every call is made on behalf of the identifier the callback runs for.
pub struct Streams<'a> {
    key: &'a str,
    groups: &'a mut GroupMembership,
}

impl<'a> Streams<'a> {
    pub(crate) fn new(key: &'a str, groups: &'a mut GroupMembership) -> Self {
        Self { key, groups }
    }

    pub fn identifier_key(&self) -> &str {
        self.key
    }

    /// Receive messages sent to `group`.
    ///
    /// Resolves once the bus has acknowledged the join, when this is the
    /// first local subscriber of the group.
    pub async fn stream_from(&mut self, group: &str) -> Result<(), ChannelError> {
        self.groups.join(group, self.key).await?;
        Ok(())
    }

    /// Stop receiving messages sent to `group`.
    pub async fn stop_stream_from(&mut self, group: &str) -> Result<(), ChannelError> {
        self.groups.leave(group, self.key).await?;
        Ok(())
    }

    /// Leave every group this identifier streams from.
    pub async fn stop_all_streams(&mut self) -> Result<(), ChannelError> {
        self.groups.leave_all(self.key).await?;
        Ok(())
    }
}

/// A channel type's per-subscription behaviour.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Runs when the client subscribes; typically joins one or more groups.
    async fn subscribe(&mut self, streams: &mut Streams<'_>) -> Result<(), ChannelError>;

    /// Runs when the client unsubscribes.
    async fn unsubscribe(&mut self, streams: &mut Streams<'_>) -> Result<(), ChannelError> {
        streams.stop_all_streams().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(raw: &str) -> ChannelContext {
        ChannelContext::new(
            ConnectionId::from_raw("conn_t"),
            Identifier::parse(raw).unwrap(),
        )
    }

    #[test]
    fn param_string_renders_scalars() {
        let ctx = ctx(r#"{"channel":"Chat","pk":1,"live":true,"name":"x","tags":[1]}"#);
        assert_eq!(ctx.param_string("pk").as_deref(), Some("1"));
        assert_eq!(ctx.param_string("live").as_deref(), Some("true"));
        assert_eq!(ctx.param_string("name").as_deref(), Some("x"));
        assert_eq!(ctx.param_string("tags"), None);
        assert_eq!(ctx.param_string("missing"), None);
    }

    #[test]
    fn require_param_reports_name() {
        let err = ctx(r#"{"channel":"Chat"}"#).require_param("pk").unwrap_err();
        assert_eq!(err.to_string(), "identifier is missing parameter `pk`");
    }

    #[test]
    fn key_is_canonical() {
        let ctx = ctx(r#"{"pk":"1","channel":"Chat"}"#);
        assert_eq!(ctx.key(), r#"{"channel":"Chat","pk":"1"}"#);
        assert_eq!(ctx.params().len(), 2);
    }
}
