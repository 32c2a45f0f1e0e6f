//! Protocol error types.

use thiserror::Error;

/// Errors raised while decoding client frames or resolving channels.
///
/// None of these are fatal to a connection: the session logs them and drops
/// the offending command.
#[derive(Debug, Error)]
pub enum CableError {
    /// The frame was not a JSON command object.
    #[error("malformed command frame: {0}")]
    MalformedFrame(#[from] serde_json::Error),
    /// The `identifier` string did not decode to a JSON object.
    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),
    /// The identifier has no string `channel` key.
    #[error("identifier has no `channel` key")]
    MissingChannel,
    /// No constructor is registered under the channel name.
    #[error("unknown channel type: {0}")]
    UnknownChannel(String),
}

/// Result type for protocol operations.
pub type Result<T> = std::result::Result<T, CableError>;
