use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifies one WebSocket connection for its whole lifetime.
///
/// Generated ids are `conn_` followed by a UUIDv7.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(String);

impl ConnectionId {
    const PREFIX: &'static str = "conn";

    pub fn new() -> Self {
        Self(format!("{}_{}", Self::PREFIX, Uuid::now_v7()))
    }

    pub fn from_raw(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ConnectionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
