//! `/health` endpoint body.

use serde::Serialize;
use std::time::Instant;

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Always `"ok"` while the server is running.
    pub status: String,
    pub uptime_secs: u64,
    /// Open WebSocket connections.
    pub connections: usize,
    /// Registered channel types.
    pub channels: Vec<String>,
}

pub fn health_check(start_time: Instant, connections: usize, channels: Vec<String>) -> HealthResponse {
    HealthResponse {
        status: "ok".into(),
        uptime_secs: start_time.elapsed().as_secs(),
        connections,
        channels,
    }
}
