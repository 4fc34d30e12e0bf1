//! # Telemetry Sink Library
//!
//! Rate-limited, buffered and optionally encrypted ingestion of sensor
//! measurements over gRPC, plus the producer-side delivery agent.

// Core modules
pub mod config;
pub mod delivery;
pub mod error;
pub mod grpc_server;
pub mod logging;
pub mod rate_limit;
pub mod security;
pub mod telemetry;

/// Generated protobuf and gRPC code for `telemetry.proto`.
pub mod proto {
    tonic::include_proto!("telemetry");
}

// Re-export commonly used types
pub use config::{ProducerConfig, SinkConfig};
pub use delivery::{DeliveryAgent, DeliveryConfig, DeliveryOutcome, DeliveryReport};
pub use error::{IngestError, ServerError};
pub use grpc_server::{IngestService, SinkServer, ACK_MESSAGE};
pub use rate_limit::RateLimiter;
pub use security::{ConnectionAuthenticator, PayloadEncryptor, RecordSealer};
pub use telemetry::{DurableBuffer, MeasurementRecord};
