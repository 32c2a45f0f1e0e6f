//! WebSocket connections and their per-connection subscription state.
//!
//! | Module | Role |
//! |--------|------|
//! | [`connection`] | socket reader/writer tasks, live-connection tracking |
//! | [`session`] | protocol state machine and command dispatch |
//! | [`instances`] | channel instances keyed by canonical identifier |
//! | [`groups`] | group membership with local reference counting |
//! | [`heartbeat`] | periodic `ping` frames |

pub mod connection;
pub mod groups;
pub mod heartbeat;
pub mod instances;
pub mod session;
