//! # cable-core
//!
//! Protocol-level building blocks shared by the server and its tests:
//!
//! - [`identifier`]: canonical encoding of subscription identifiers
//! - [`protocol`]: server frames and client commands of `actioncable-v1-json`
//! - [`ids`]: branded connection identifiers
//! - [`errors`]: the [`CableError`] hierarchy

#![deny(unsafe_code)]

pub mod errors;
pub mod identifier;
pub mod ids;
pub mod protocol;

pub use errors::{CableError, Result};
pub use identifier::{canonicalize, Identifier, CHANNEL_KEY};
pub use ids::ConnectionId;
pub use protocol::{ClientCommand, Command, ConfirmFrame, ServerFrame, SUB_PROTOCOL};
