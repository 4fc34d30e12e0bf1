//! Periodic measurement generator feeding a [`DeliveryAgent`].

use super::agent::DeliveryAgent;
use super::transport::MeasurementTransport;
use crate::proto::SensorData;
use log::info;
use rand::Rng;
use std::time::{Duration, SystemTime};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Builds one measurement captured now, value in `0..100`.
pub fn generate_measurement<R: Rng + ?Sized>(sensor_name: &str, rng: &mut R) -> SensorData {
    SensorData {
        sensor_name: sensor_name.to_string(),
        sensor_value: rng.gen_range(0..100),
        timestamp: Some(prost_types::Timestamp::from(SystemTime::now())),
    }
}

/// Counters reported when the node stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SensorStats {
    pub delivered: u64,
    pub dropped: u64,
}

pub struct SensorNode<T> {
    sensor_name: String,
    tick: Duration,
    agent: DeliveryAgent<T>,
}

impl<T: MeasurementTransport> SensorNode<T> {
    pub fn new(sensor_name: impl Into<String>, tick: Duration, agent: DeliveryAgent<T>) -> Self {
        Self {
            sensor_name: sensor_name.into(),
            tick,
            agent,
        }
    }

    /// Sends one measurement per tick until `shutdown` fires.
    ///
    /// The token is checked between measurements; a delivery in progress,
    /// retries included, runs to completion.
    pub async fn run(mut self, shutdown: CancellationToken) -> SensorStats {
        info!(
            "Sensor {} sending one measurement every {:?}",
            self.sensor_name, self.tick
        );

        let mut stats = SensorStats::default();
        let mut ticker = interval_at(Instant::now() + self.tick, self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let measurement = generate_measurement(&self.sensor_name, &mut rand::thread_rng());
                    if self.agent.deliver(&measurement).await.is_delivered() {
                        stats.delivered += 1;
                    } else {
                        stats.dropped += 1;
                    }
                }
            }
        }

        info!(
            "Sensor {} stopped: {} delivered, {} dropped",
            self.sensor_name, stats.delivered, stats.dropped
        );
        stats
    }
}
