//! # Telemetry Persistence
//!
//! Everything between an admitted measurement and the output file:
//! - `record`: the JSON line format
//! - `writer`: bounded buffer with flush-then-append semantics
//! - `scheduler`: periodic timer flush

pub mod record;
pub mod scheduler;
pub mod writer;

pub use record::MeasurementRecord;
pub use scheduler::{FlushScheduler, SchedulerConfig};
pub use writer::{BufferStats, DurableBuffer, FlushReason};
