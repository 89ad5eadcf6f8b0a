//! folio portfolio manager - Entry Point
//!
//! Runs the decision and risk loops against the execution service.

use anyhow::Result;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// folio portfolio manager
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via FOLIO_CONFIG env var)
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize TLS crypto provider (must be before any WS connections)
    folio_ws::init_crypto();

    let args = Args::parse();
    folio_telemetry::init_logging()?;

    info!("Starting folio manager v{}", env!("CARGO_PKG_VERSION"));

    let config_path =
        folio_bot::config::resolve_config_path(args.config, folio_bot::config::DEFAULT_MANAGER_CONFIG);
    info!(config_path = %config_path, "Loading configuration");
    let config: folio_bot::ManagerConfig = folio_bot::config::load_or_default(&config_path)?;

    let manager = folio_bot::Manager::new(config)?;

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received");
        }
        signal_token.cancel();
    });

    manager.run(shutdown).await?;
    Ok(())
}
