//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase", default)]`, so a config
//! file only needs the fields it changes.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root settings type.
///
/// ```json
/// {
///   "server": { "port": 9292, "path": "/cable" },
///   "heartbeat": { "intervalSecs": 5 },
///   "logging": { "level": "debug", "format": "json" }
/// }
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CableSettings {
    /// Listener and transport settings.
    pub server: ServerSettings,
    /// Ping heartbeat settings.
    pub heartbeat: HeartbeatSettings,
    /// Group bus settings.
    pub bus: BusSettings,
    /// Logging configuration.
    pub logging: LoggingSettings,
}

/// Listener and transport settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Host to bind.
    pub host: String,
    /// Port to bind (`0` picks a free port).
    pub port: u16,
    /// Path of the WebSocket endpoint.
    pub path: String,
    /// Outbound frames buffered per connection before the writer applies backpressure.
    pub send_queue: usize,
    /// Inbound client messages buffered per connection before the socket reader waits.
    pub receive_queue: usize,
    /// Largest accepted inbound WebSocket message, in bytes.
    pub max_message_size: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 9292,
            path: "/cable".to_string(),
            send_queue: 256,
            receive_queue: 64,
            max_message_size: 1024 * 1024,
        }
    }
}

impl ServerSettings {
    /// `host:port` string suitable for binding a listener.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Ping heartbeat settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HeartbeatSettings {
    /// Whether connections emit `ping` frames. Tests turn this off.
    pub enabled: bool,
    /// Seconds between pings.
    pub interval_secs: u64,
}

impl Default for HeartbeatSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 5,
        }
    }
}

impl HeartbeatSettings {
    /// Interval as a [`Duration`], never shorter than one second.
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }
}

/// Group bus settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BusSettings {
    /// Pending group events buffered per connection inbox.
    pub inbox_capacity: usize,
}

impl Default for BusSettings {
    fn default() -> Self {
        Self {
            inbox_capacity: 1024,
        }
    }
}

/// Output format for log lines.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
}

/// Logging configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default filter directive (overridden by `RUST_LOG`).
    pub level: String,
    /// Line format.
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}
