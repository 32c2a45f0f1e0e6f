//! Channel-type registry.

use std::collections::HashMap;
use std::sync::Arc;

use cable_core::CableError;
use tracing::{debug, warn};

use super::{Channel, ChannelContext};

/// Constructor for one channel type.
pub type ChannelFactory = Arc<dyn Fn(ChannelContext) -> Box<dyn Channel> + Send + Sync>;

/// Maps channel names (the identifier's `channel` value) to constructors.
///
/// Populated at startup, then shared read-only behind an `Arc`.
pub struct ChannelRegistry {
    factories: HashMap<String, ChannelFactory>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Register a constructor under `name`, replacing any previous one.
    pub fn register<F>(&mut self, name: &str, factory: F)
    where
        F: Fn(ChannelContext) -> Box<dyn Channel> + Send + Sync + 'static,
    {
        if self
            .factories
            .insert(name.to_owned(), Arc::new(factory))
            .is_some()
        {
            warn!(channel = name, "overwriting registered channel");
        } else {
            debug!(channel = name, "registered channel");
        }
    }

    pub fn lookup(&self, name: &str) -> Option<&ChannelFactory> {
        self.factories.get(name)
    }

    /// Construct a channel for the context's identifier.
    pub fn build(&self, ctx: ChannelContext) -> Result<Box<dyn Channel>, CableError> {
        let channel = ctx.identifier.channel().to_owned();
        let factory = self
            .lookup(&channel)
            .ok_or(CableError::UnknownChannel(channel))?;
        Ok(factory(ctx))
    }

    /// Registered channel names (sorted).
    pub fn channels(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn has_channel(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }
}

impl Default for ChannelRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ChannelRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelRegistry")
            .field("channels", &self.channels())
            .finish()
    }
}
