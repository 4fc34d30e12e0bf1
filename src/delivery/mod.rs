//! # Producer-side Delivery
//!
//! Retry policy, transport seam and the measurement generator used by the
//! `sensor-node` binary.

pub mod agent;
pub mod backoff;
pub mod sensor;
pub mod transport;

pub use agent::{DeliveryAgent, DeliveryConfig, DeliveryOutcome, DeliveryReport};
pub use backoff::{classify, BackoffConfig, FailureClass};
pub use sensor::{generate_measurement, SensorNode, SensorStats};
pub use transport::{GrpcTransport, MeasurementTransport};
