//! Frames of the `actioncable-v1-json` sub-protocol.
//!
//! | Direction | Shape |
//! |-----------|-------|
//! | server → client | `{"type":"welcome"}` |
//! | server → client | `{"type":"ping","message":<unix-seconds>}` |
//! | server → client | `{"identifier":"…","type":"confirm_subscription"}` (identifier first) |
//! | server → client | `{"identifier":"…","message":<payload>}` |
//! | client → server | `{"command":"subscribe"\|"unsubscribe","identifier":"…"}` |
//!
//! `identifier` is always a JSON document encoded as a string.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::Result;
use crate::identifier::Identifier;

/// WebSocket sub-protocol negotiated on accept.
pub const SUB_PROTOCOL: &str = "actioncable-v1-json";

/// Frames carrying a `type` tag.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlFrame {
    /// Sent once right after the handshake.
    Welcome,
    /// Liveness heartbeat with the server's unix time in seconds.
    Ping { message: i64 },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
enum ConfirmTag {
    ConfirmSubscription,
}

/// Acknowledges a `subscribe` command. Written identifier first.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConfirmFrame {
    pub identifier: String,
    #[serde(rename = "type")]
    tag: ConfirmTag,
}

/// A group broadcast routed to one subscription.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DataFrame {
    pub identifier: String,
    pub message: Value,
}

/// Any frame the server writes to a client.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ServerFrame {
    Control(ControlFrame),
    Confirm(ConfirmFrame),
    Data(DataFrame),
}

impl ServerFrame {
    pub fn welcome() -> Self {
        Self::Control(ControlFrame::Welcome)
    }

    pub fn ping(unix_secs: i64) -> Self {
        Self::Control(ControlFrame::Ping { message: unix_secs })
    }

    pub fn confirm_subscription(identifier: &Identifier) -> Self {
        Self::Confirm(ConfirmFrame {
            identifier: identifier.key().to_owned(),
            tag: ConfirmTag::ConfirmSubscription,
        })
    }

    pub fn data(identifier: impl Into<String>, message: Value) -> Self {
        Self::Data(DataFrame {
            identifier: identifier.into(),
            message,
        })
    }

    /// Serialize to the text payload of a WebSocket frame.
    pub fn to_json(&self) -> String {
        // Frames only hold strings, integers and `Value`s.
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Raw client frame before the identifier is decoded.
#[derive(Clone, Debug, Deserialize)]
struct CommandFrame {
    command: String,
    identifier: String,
}

/// Command verb sent by the client.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    Subscribe,
    Unsubscribe,
    /// Anything else (e.g. `message` performs); not part of this server's protocol.
    Other(String),
}

impl From<&str> for Command {
    fn from(value: &str) -> Self {
        match value {
            "subscribe" => Self::Subscribe,
            "unsubscribe" => Self::Unsubscribe,
            other => Self::Other(other.to_owned()),
        }
    }
}

/// A decoded client command.
#[derive(Clone, Debug)]
pub struct ClientCommand {
    pub command: Command,
    pub identifier: Identifier,
}

impl ClientCommand {
    /// Parse a text frame, decoding the nested identifier string.
    pub fn parse(text: &str) -> Result<Self> {
        let frame: CommandFrame = serde_json::from_str(text)?;
        let identifier = Identifier::parse(&frame.identifier)?;
        Ok(Self {
            command: Command::from(frame.command.as_str()),
            identifier,
        })
    }

    /// Encode a command the way a client does (used by tests and tooling).
    pub fn encode(command: &str, identifier: &Identifier) -> String {
        serde_json::json!({
            "command": command,
            "identifier": identifier.key(),
        })
        .to_string()
    }
}
