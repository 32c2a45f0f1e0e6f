//! # cable
//!
//! ActionCable-compatible WebSocket server binary: loads settings, installs
//! tracing, registers the bundled channels and serves until ctrl-c.

#![deny(unsafe_code)]

mod chat;
mod telemetry;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use cable_server::{CableServer, ChannelRegistry, MemoryBus};
use cable_settings::CableSettings;
use clap::Parser;

/// ActionCable-compatible subscription server.
#[derive(Parser, Debug)]
#[command(name = "cable", about = "ActionCable-compatible WebSocket server")]
struct Cli {
    /// JSON settings file.
    #[arg(long, env = "CABLE_CONFIG")]
    config: Option<PathBuf>,

    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Log filter directive (overrides settings; `RUST_LOG` still wins).
    #[arg(long)]
    log_level: Option<String>,
}

impl Cli {
    fn apply(&self, settings: &mut CableSettings) {
        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(level) = &self.log_level {
            settings.logging.level.clone_from(level);
        }
    }
}

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut settings = cable_settings::load_settings(cli.config.as_deref())
        .context("failed to load settings")?;
    cli.apply(&mut settings);

    telemetry::init(&settings.logging);
    tracing::info!(
        config = ?cli.config,
        heartbeat = settings.heartbeat.enabled,
        "starting cable server"
    );

    let mut registry = ChannelRegistry::new();
    chat::register_all(&mut registry);

    let server = CableServer::new(settings, registry, Arc::new(MemoryBus::new()));
    let handle = server
        .listen()
        .await
        .context("failed to bind listener")?;
    tracing::info!(url = %handle.ws_url(), "cable server ready");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;

    tracing::info!("shutting down");
    let report = server
        .shutdown()
        .drain(handle.into_task(), SHUTDOWN_TIMEOUT)
        .await;
    tracing::info!(
        closed = report.open_at_start - report.cut_off,
        cut_off = report.cut_off,
        "shutdown complete"
    );
    Ok(())
}
