//! # Telemetry Sink Entry Point
//!
//! Parses configuration, opens the output file and serves
//! `TelemetryService` until SIGINT or SIGTERM.

use clap::Parser;
use log::info;
use telemetry_sink::logging::{init_logging, shutdown_on_signal};
use telemetry_sink::{SinkConfig, SinkServer};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();

    let config = SinkConfig::parse();
    info!("Starting telemetry sink with {:?}", config);

    let server = SinkServer::new(config)?;
    let listener = server.bind().await?;

    let shutdown = CancellationToken::new();
    tokio::spawn(shutdown_on_signal(shutdown.clone()));

    server.run(listener, shutdown).await?;

    info!("Shutdown complete");
    Ok(())
}
