//! folio execution service - Entry Point
//!
//! Serves the order channel and forwards orders to the paper or live broker.

use anyhow::Result;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// folio execution service
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via FOLIO_CONFIG env var)
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    folio_ws::init_crypto();

    let args = Args::parse();
    folio_telemetry::init_logging()?;

    info!("Starting folio execution service v{}", env!("CARGO_PKG_VERSION"));

    let config_path = folio_bot::config::resolve_config_path(
        args.config,
        folio_bot::config::DEFAULT_EXECUTION_CONFIG,
    );
    info!(config_path = %config_path, "Loading configuration");
    let config: folio_bot::ExecutionConfig = folio_bot::config::load_or_default(&config_path)?;
    info!(mode = ?config.mode, bind = %config.server.bind, "Configuration loaded");

    let service = folio_bot::ExecutionService::new(config)?;

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received");
        }
        signal_token.cancel();
    });

    service.run(shutdown).await?;
    Ok(())
}
