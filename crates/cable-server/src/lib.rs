//! # cable-server
//!
//! Axum WebSocket server speaking the ActionCable JSON protocol.
//!
//! - [`websocket`]: per-connection sessions (channel instances, group
//!   membership, heartbeat) and socket plumbing
//! - [`channel`]: the [`Channel`] trait and [`ChannelRegistry`]
//! - [`bus`]: the [`GroupBus`] fan-out layer and its in-memory implementation
//! - [`server`]: router, listener, `/health` and `/broadcast/{group}`
//! - [`shutdown`]: graceful shutdown via `CancellationToken`

#![deny(unsafe_code)]

pub mod bus;
pub mod channel;
pub mod health;
pub mod server;
pub mod shutdown;
pub mod websocket;

#[cfg(test)]
pub(crate) mod testutil;

pub use bus::{broadcast, BusError, ConnectionRef, Delivery, GroupBus, GroupEvent, MemoryBus};
pub use channel::{Channel, ChannelContext, ChannelError, ChannelRegistry, Streams};
pub use server::{CableServer, ServerHandle};
pub use shutdown::{DrainReport, ShutdownCoordinator};
pub use websocket::session::{CableSession, CloseReason, SessionDeps, SessionState};
