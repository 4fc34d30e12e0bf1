//! Periodic flush timer for the durable buffer.
//!
//! Runs as a background task next to the gRPC server. Every tick flushes
//! whatever is pending, so records reach disk within one interval even when
//! traffic is too low to trigger size-based flushes.
//!
//! The task stops when its cancellation token fires. It never performs the
//! final shutdown flush; the owner does that through
//! [`DurableBuffer::close`](super::DurableBuffer::close) once the task has
//! exited, so exactly one final flush happens.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::writer::{DurableBuffer, FlushReason};
use log::{debug, error, info};

/// Configuration for the flush timer.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Interval between timer flushes
    pub flush_interval: Duration,
    /// Whether the timer runs at all
    pub enabled: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            flush_interval: Duration::from_secs(60),
            enabled: true,
        }
    }
}

/// Background flusher for one [`DurableBuffer`].
pub struct FlushScheduler<W: Write> {
    buffer: Arc<DurableBuffer<W>>,
    config: SchedulerConfig,
    shutdown: CancellationToken,
    /// Wall-clock time of the last timer flush that wrote bytes
    last_flush_at: Arc<RwLock<Option<DateTime<Utc>>>>,
}

impl<W: Write> FlushScheduler<W> {
    pub fn new(
        buffer: Arc<DurableBuffer<W>>,
        config: SchedulerConfig,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            buffer,
            config,
            shutdown,
            last_flush_at: Arc::new(RwLock::new(None)),
        }
    }

    /// `None` until a timer flush has written something.
    pub fn last_flush(&self) -> Option<DateTime<Utc>> {
        *self.last_flush_at.read()
    }

    /// Runs until the shutdown token is cancelled.
    ///
    /// The first flush happens one full interval after start.
    pub async fn start(self: Arc<Self>) {
        if !self.config.enabled {
            info!("Periodic flush is disabled, skipping");
            return;
        }

        let period = self.config.flush_interval;
        info!("Starting periodic flush every {:?}", period);

        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => {
                    debug!("Periodic flush stopped");
                    return;
                }
                _ = ticker.tick() => self.do_flush(),
            }
        }
    }

    /// One timer flush. Errors are logged; pending bytes stay for the next
    /// attempt.
    fn do_flush(&self) {
        match self.buffer.flush_with(FlushReason::Timer) {
            Ok(0) => {}
            Ok(written) => {
                debug!("Periodic flush wrote {} bytes", written);
                *self.last_flush_at.write() = Some(Utc::now());
            }
            Err(e) => {
                error!("Periodic flush failed: {}", e);
            }
        }
    }
}
