//! # Measurement Record
//!
//! The structured form of one accepted measurement, serialized as a single
//! JSON object per persisted line.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One accepted measurement. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeasurementRecord {
    /// When the sink accepted the measurement
    #[serde(rename = "timestamp")]
    received_at: DateTime<Utc>,

    /// Producer identity
    #[serde(rename = "sensor_name")]
    producer: String,

    /// Measured value
    #[serde(rename = "sensor_value")]
    value: i64,

    /// When the producer captured the measurement
    #[serde(rename = "data_time")]
    captured_at: DateTime<Utc>,
}

impl MeasurementRecord {
    pub fn new(
        producer: impl Into<String>,
        value: i64,
        captured_at: DateTime<Utc>,
        received_at: DateTime<Utc>,
    ) -> Self {
        MeasurementRecord {
            received_at,
            producer: producer.into(),
            value,
            captured_at,
        }
    }

    pub fn producer(&self) -> &str {
        &self.producer
    }

    pub fn value(&self) -> i64 {
        self.value
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    pub fn received_at(&self) -> DateTime<Utc> {
        self.received_at
    }

    /// JSON bytes without a trailing newline.
    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}
