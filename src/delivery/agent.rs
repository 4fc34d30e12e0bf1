//! # Delivery Agent
//!
//! Sends one measurement with bounded retries:
//!
//! ```text
//! Attempt(n) -> ok                     -> Delivered
//!            -> non-retryable failure  -> Aborted
//!            -> retryable failure      -> sleep(backoff(n)) -> Attempt(n + 1)
//!            -> retryable on last try  -> RetriesExhausted
//! ```
//!
//! Each attempt has its own deadline. No sleep follows the last attempt.
//! Failed measurements are logged and dropped; nothing is returned as an error.

use super::backoff::{classify, BackoffConfig, FailureClass};
use super::transport::MeasurementTransport;
use crate::proto::SensorData;
use log::{debug, error, warn};
use std::time::Duration;
use tokio::time::timeout;
use tonic::{Code, Status};

/// Retry budget for one measurement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeliveryConfig {
    /// Total attempts, the first one included
    pub max_attempts: u32,
    /// Deadline for a single attempt
    pub attempt_timeout: Duration,
    pub backoff: BackoffConfig,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            attempt_timeout: Duration::from_secs(5),
            backoff: BackoffConfig::default(),
        }
    }
}

/// Terminal state of one delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// The sink acknowledged the measurement
    Delivered { ack: String },
    /// A non-retryable failure stopped the attempts
    Aborted { code: Code, message: String },
    /// Every attempt failed with a retryable error
    RetriesExhausted { last_code: Code, message: String },
}

/// What happened to one measurement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Attempts made, including the successful one
    pub attempts: u32,
    /// Backoff delays slept between attempts
    pub delays: Vec<Duration>,
    pub outcome: DeliveryOutcome,
}

impl DeliveryReport {
    pub fn is_delivered(&self) -> bool {
        matches!(self.outcome, DeliveryOutcome::Delivered { .. })
    }
}

/// Producer-side sender owning one transport.
pub struct DeliveryAgent<T> {
    transport: T,
    config: DeliveryConfig,
}

impl<T: MeasurementTransport> DeliveryAgent<T> {
    pub fn new(transport: T, config: DeliveryConfig) -> Self {
        Self { transport, config }
    }

    pub fn config(&self) -> &DeliveryConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Runs the retry state machine for `measurement` to completion.
    pub async fn deliver(&mut self, measurement: &SensorData) -> DeliveryReport {
        let max_attempts = self.config.max_attempts;
        let mut delays = Vec::new();
        let mut last_failure = Status::unknown("no attempt made");

        for attempt in 0..max_attempts {
            let status = match self.attempt(measurement).await {
                Ok(ack) => {
                    debug!(
                        "Sent data: sensor={}, value={}, response={}",
                        measurement.sensor_name, measurement.sensor_value, ack
                    );
                    return DeliveryReport {
                        attempts: attempt + 1,
                        delays,
                        outcome: DeliveryOutcome::Delivered { ack },
                    };
                }
                Err(status) => status,
            };

            if classify(status.code()) == FailureClass::NonRetryable {
                error!(
                    "Non-retryable error, dropping measurement from {}: {:?}: {}",
                    measurement.sensor_name,
                    status.code(),
                    status.message()
                );
                return DeliveryReport {
                    attempts: attempt + 1,
                    delays,
                    outcome: DeliveryOutcome::Aborted {
                        code: status.code(),
                        message: status.message().to_string(),
                    },
                };
            }

            if attempt + 1 < max_attempts {
                let delay = self.config.backoff.delay(attempt, &mut rand::thread_rng());
                warn!(
                    "Attempt {} failed: {:?}: {}. Retrying in {:?}",
                    attempt + 1,
                    status.code(),
                    status.message(),
                    delay
                );
                tokio::time::sleep(delay).await;
                delays.push(delay);
            } else {
                warn!(
                    "Attempt {} failed: {:?}: {}",
                    attempt + 1,
                    status.code(),
                    status.message()
                );
            }
            last_failure = status;
        }

        error!(
            "Failed to send data after {} attempts, dropping measurement from {}: {}",
            max_attempts,
            measurement.sensor_name,
            last_failure.message()
        );
        DeliveryReport {
            attempts: max_attempts,
            delays,
            outcome: DeliveryOutcome::RetriesExhausted {
                last_code: last_failure.code(),
                message: last_failure.message().to_string(),
            },
        }
    }

    /// One attempt under the per-attempt deadline.
    async fn attempt(&mut self, measurement: &SensorData) -> Result<String, Status> {
        match timeout(self.config.attempt_timeout, self.transport.send(measurement)).await {
            Ok(result) => result,
            Err(_) => Err(Status::deadline_exceeded(format!(
                "no response within {:?}",
                self.config.attempt_timeout
            ))),
        }
    }
}
