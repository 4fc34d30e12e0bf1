//! # Admission Limiter
//!
//! Token bucket keyed by payload byte size. One limiter guards one sink; there
//! is no per-producer accounting.
//!
//! Two behaviours are kept as-is and are easy to trip over:
//! - Refill is `floor(elapsed_secs * rate)` per call. The fractional token is
//!   dropped every time, so many closely spaced calls refill less than a
//!   single call after the same total interval.
//! - A non-positive `size` is always admitted, and a negative one raises
//!   `available` (possibly past `capacity` until the next refill clamps it).

use parking_lot::Mutex;
use std::time::Instant;

/// Snapshot of the bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaState {
    /// Maximum tokens the bucket holds (one second of traffic)
    pub capacity: i64,
    /// Tokens currently available
    pub available: i64,
    /// Instant of the last refill
    pub last_refill: Instant,
}

/// Byte-rate limiter shared by all request handlers of a sink.
#[derive(Debug)]
pub struct RateLimiter {
    /// Refill rate in tokens (bytes) per second
    rate: i64,
    state: Mutex<QuotaState>,
}

impl RateLimiter {
    /// Creates a full bucket refilling at `rate` bytes per second.
    pub fn new(rate: u64) -> Self {
        Self::with_state(rate, i64::MAX, Instant::now())
    }

    /// Creates a bucket with an explicit fill level and refill instant.
    ///
    /// `available` is clamped into `0..=capacity`.
    pub fn with_state(rate: u64, available: i64, last_refill: Instant) -> Self {
        let rate = i64::try_from(rate).unwrap_or(i64::MAX);
        RateLimiter {
            rate,
            state: Mutex::new(QuotaState {
                capacity: rate,
                available: available.clamp(0, rate),
                last_refill,
            }),
        }
    }

    /// Admits or denies a payload of `size` bytes at the current instant.
    pub fn allow(&self, size: i64) -> bool {
        self.allow_at(size, Instant::now())
    }

    /// Admits or denies a payload of `size` bytes as of `now`.
    ///
    /// An instant earlier than the last refill refills nothing and leaves the
    /// refill timestamp where it was.
    pub fn allow_at(&self, size: i64, now: Instant) -> bool {
        let mut state = self.state.lock();

        let elapsed = now.saturating_duration_since(state.last_refill);
        // Float-to-int `as` truncates toward zero and saturates on overflow
        let refill = (elapsed.as_secs_f64() * self.rate as f64) as i64;
        state.available = state.available.saturating_add(refill).min(state.capacity);
        if now > state.last_refill {
            state.last_refill = now;
        }

        if state.available >= size {
            state.available = state.available.saturating_sub(size);
            true
        } else {
            false
        }
    }

    /// Refill rate in bytes per second.
    pub fn rate(&self) -> i64 {
        self.rate
    }

    /// Current quota state.
    pub fn snapshot(&self) -> QuotaState {
        *self.state.lock()
    }
}
