//! # relay
//!
//! Chat relay binary: loads settings, starts telemetry and serves the
//! WebSocket fan-out with the agent event intake.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use relay_chat::FileConfigSource;
use relay_server::{RelayServices, ServerConfig};
use relay_settings::{load_settings_from_path, settings_path};
use relay_telemetry::{init_telemetry, TelemetryConfig};

/// Chat relay server.
#[derive(Parser, Debug)]
#[command(name = "relay", about = "Chat-run reconciliation and broadcast server")]
struct Cli {
    /// Settings file (defaults to `~/.relay/settings.json`).
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Log level (overrides settings).
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let path = cli.settings.clone().unwrap_or_else(settings_path);
    let mut settings = load_settings_from_path(&path)
        .with_context(|| format!("Failed to load settings from {}", path.display()))?;
    if let Some(level) = cli.log_level {
        settings.logging.level = level;
    }
    init_telemetry(&TelemetryConfig::from_settings(&settings.logging));
    tracing::info!(settings = %path.display(), "starting relay");

    let mut config = ServerConfig::from_settings(&settings.server);
    if let Some(host) = cli.host {
        config.host = host;
    }
    if let Some(port) = cli.port {
        config.port = port;
    }

    let services = RelayServices::new(config.max_send_queue);
    let deps = services
        .chat_deps()
        .with_config(Arc::new(FileConfigSource::new(&path)));

    let handle = relay_server::start(config, services, deps)
        .await
        .context("Failed to start relay server")?;
    tracing::info!(addr = %handle.addr, "relay ready");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl+c")?;
    tracing::info!("shutting down");
    handle.shutdown().await;
    Ok(())
}
