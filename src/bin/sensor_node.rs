//! # Sensor Node
//!
//! Generates random measurements at a fixed rate and delivers them to a
//! telemetry sink with retries.

use clap::Parser;
use log::info;
use telemetry_sink::delivery::{GrpcTransport, SensorNode};
use telemetry_sink::logging::{init_logging, shutdown_on_signal};
use telemetry_sink::{DeliveryAgent, ProducerConfig};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();

    let config = ProducerConfig::parse();
    config.validate()?;
    let tick = config.tick_interval()?;

    info!(
        "Starting sensor {} at {} msg/s towards {}",
        config.sensor_name,
        config.rate,
        config.endpoint_uri()
    );

    let transport = GrpcTransport::connect(&config)?;
    let agent = DeliveryAgent::new(transport, config.delivery_config());
    let node = SensorNode::new(config.sensor_name.clone(), tick, agent);

    let shutdown = CancellationToken::new();
    tokio::spawn(shutdown_on_signal(shutdown.clone()));

    node.run(shutdown).await;
    Ok(())
}
