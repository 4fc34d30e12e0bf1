//! # Durable Buffer
//!
//! In-memory accumulator in front of the append-only output file.
//!
//! Pending bytes and the sink handle share one lock, and flush I/O runs while
//! it is held: appenders wait for an in-progress flush. This bounds memory and
//! keeps persisted bytes in strict append order.
//!
//! A failed flush keeps the pending bytes for the next attempt. If flushes keep
//! failing the buffer keeps growing. Bytes the sink accepted before its own
//! `flush` failed belong to the sink: later flushes only flush them again and
//! never rewrite them.

use crate::error::BufferError;
use log::{debug, error, info};
use parking_lot::Mutex;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;

/// Why a flush happened, for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushReason {
    /// The next append would exceed the capacity bound
    SizeLimit,
    /// Periodic flush timer
    Timer,
    /// Final flush before the sink is released
    Shutdown,
    /// Explicit call to [`DurableBuffer::flush`]
    Manual,
}

impl fmt::Display for FlushReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            FlushReason::SizeLimit => "size limit",
            FlushReason::Timer => "timer",
            FlushReason::Shutdown => "shutdown",
            FlushReason::Manual => "manual",
        };
        f.write_str(reason)
    }
}

/// Point-in-time view of the buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferStats {
    pub capacity: usize,
    pub pending_bytes: usize,
    /// Accepted by the sink but not yet confirmed by its `flush`
    pub unsynced_bytes: usize,
    pub flushes: u64,
    pub bytes_flushed: u64,
    pub closed: bool,
}

struct BufferState<W> {
    pending: Vec<u8>,
    /// `None` once the buffer has been closed
    sink: Option<W>,
    /// Bytes handed to the sink whose `flush` has not yet succeeded
    unsynced: usize,
    flushes: u64,
    bytes_flushed: u64,
}

impl<W: Write> BufferState<W> {
    fn flush(&mut self, reason: FlushReason) -> Result<usize, BufferError> {
        if self.pending.is_empty() && self.unsynced == 0 {
            return Ok(0);
        }

        let sink = self.sink.as_mut().ok_or(BufferError::Closed)?;
        if !self.pending.is_empty() {
            sink.write_all(&self.pending).map_err(BufferError::Flush)?;
            self.unsynced += self.pending.len();
            self.pending.clear();
        }
        sink.flush().map_err(BufferError::Flush)?;

        let written = std::mem::take(&mut self.unsynced);
        self.flushes += 1;
        self.bytes_flushed += written as u64;

        debug!("Flushed {} bytes to output ({})", written, reason);
        Ok(written)
    }
}

/// Bounded, lock-guarded write buffer over a durable sink.
///
/// The pending region is the write batch, so production writes straight to
/// the [`File`] with no second user-space buffer in between.
pub struct DurableBuffer<W: Write = File> {
    capacity: usize,
    state: Mutex<BufferState<W>>,
}

impl DurableBuffer<File> {
    /// Opens (or creates) `path` in append mode.
    pub fn open<P: AsRef<Path>>(path: P, capacity: usize) -> Result<Self, BufferError> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|source| BufferError::Open {
                path: path.to_path_buf(),
                source,
            })?;

        Ok(Self::with_sink(file, capacity))
    }
}

impl<W: Write> DurableBuffer<W> {
    /// Wraps an already open sink.
    pub fn with_sink(sink: W, capacity: usize) -> Self {
        DurableBuffer {
            capacity,
            state: Mutex::new(BufferState {
                pending: Vec::with_capacity(capacity),
                sink: Some(sink),
                unsynced: 0,
                flushes: 0,
                bytes_flushed: 0,
            }),
        }
    }

    /// Appends `bytes`, flushing what is pending first if the bound would be
    /// exceeded.
    ///
    /// The new bytes are never dropped to make room. When the forced flush
    /// fails, nothing is appended and the error is returned.
    pub fn append(&self, bytes: &[u8]) -> Result<(), BufferError> {
        let mut state = self.state.lock();
        if state.sink.is_none() {
            return Err(BufferError::Closed);
        }

        if state.pending.len() + bytes.len() > self.capacity {
            debug!(
                "Flushing buffer due to size limit, max size: {} bytes",
                self.capacity
            );
            state.flush(FlushReason::SizeLimit)?;
        }

        state.pending.extend_from_slice(bytes);
        Ok(())
    }

    /// Writes everything pending to the sink. Returns the number of bytes
    /// written; an empty buffer performs no I/O.
    pub fn flush(&self) -> Result<usize, BufferError> {
        self.flush_with(FlushReason::Manual)
    }

    /// Same as [`DurableBuffer::flush`], tagged with the trigger.
    pub fn flush_with(&self, reason: FlushReason) -> Result<usize, BufferError> {
        self.state.lock().flush(reason)
    }

    /// Final flush, then releases the sink. Later appends fail with
    /// [`BufferError::Closed`]; closing twice is a no-op.
    ///
    /// The sink is released even if the final flush fails.
    pub fn close(&self) -> Result<(), BufferError> {
        let mut state = self.state.lock();
        if state.sink.is_none() {
            return Ok(());
        }

        let result = state.flush(FlushReason::Shutdown);
        if let Err(e) = &result {
            error!(
                "Failed to flush buffer during shutdown, {} bytes lost: {}",
                state.pending.len() + state.unsynced,
                e
            );
        }

        state.sink = None;
        info!("Output closed after {} flushes", state.flushes);

        result.map(|_| ())
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn pending_len(&self) -> usize {
        self.state.lock().pending.len()
    }

    pub fn stats(&self) -> BufferStats {
        let state = self.state.lock();
        BufferStats {
            capacity: self.capacity,
            pending_bytes: state.pending.len(),
            unsynced_bytes: state.unsynced,
            flushes: state.flushes,
            bytes_flushed: state.bytes_flushed,
            closed: state.sink.is_none(),
        }
    }
}

impl<W: Write> fmt::Debug for DurableBuffer<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DurableBuffer")
            .field("stats", &self.stats())
            .finish()
    }
}
