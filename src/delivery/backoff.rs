//! Retry delay policy and failure classification for the delivery agent.

use rand::Rng;
use std::time::Duration;
use tonic::Code;

/// Exponential backoff with symmetric jitter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffConfig {
    /// Delay before the second attempt, before jitter
    pub base_delay: Duration,
    /// Ceiling applied after jitter
    pub max_delay: Duration,
    /// Jitter as a fraction of the nominal delay; 0.25 means ±25%
    pub jitter: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            jitter: 0.25,
        }
    }
}

impl BackoffConfig {
    /// `base_delay * 2^attempt` in nanoseconds, unclamped.
    pub fn nominal_nanos(&self, attempt: u32) -> f64 {
        // 2^64 already dwarfs any sane ceiling
        let exponent = attempt.min(64) as i32;
        self.base_delay.as_nanos() as f64 * 2f64.powi(exponent)
    }

    fn jitter_fraction(&self) -> f64 {
        if self.jitter.is_finite() {
            self.jitter.abs()
        } else {
            0.0
        }
    }

    /// Delay after failed attempt `attempt` (0-indexed) for a given jitter
    /// factor. `factor` is clamped into `[-jitter, jitter]`.
    pub fn delay_with_factor(&self, attempt: u32, factor: f64) -> Duration {
        let jitter = self.jitter_fraction();
        let factor = factor.clamp(-jitter, jitter);
        let nanos = self.nominal_nanos(attempt) * (1.0 + factor);

        let ceiling = self.max_delay.as_nanos() as f64;
        let capped = nanos.min(ceiling).max(0.0).round();
        Duration::from_nanos(capped as u64)
    }

    /// Delay after failed attempt `attempt`, with a uniform jitter draw.
    pub fn delay<R: Rng + ?Sized>(&self, attempt: u32, rng: &mut R) -> Duration {
        let jitter = self.jitter_fraction();
        let factor = if jitter > 0.0 {
            rng.gen_range(-jitter..=jitter)
        } else {
            0.0
        };
        self.delay_with_factor(attempt, factor)
    }
}

/// Whether a failed attempt is worth repeating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    Retryable,
    NonRetryable,
}

/// Fixed classification of gRPC status codes.
///
/// Request-shape and credential errors will not change on retry; everything
/// else, including codes we do not expect from the sink, is retried.
pub fn classify(code: Code) -> FailureClass {
    match code {
        Code::InvalidArgument | Code::NotFound | Code::PermissionDenied | Code::Unauthenticated => {
            FailureClass::NonRetryable
        }
        Code::Unavailable | Code::DeadlineExceeded | Code::ResourceExhausted | Code::Aborted => {
            FailureClass::Retryable
        }
        Code::Ok
        | Code::Cancelled
        | Code::Unknown
        | Code::AlreadyExists
        | Code::FailedPrecondition
        | Code::OutOfRange
        | Code::Unimplemented
        | Code::Internal
        | Code::DataLoss => FailureClass::Retryable,
    }
}
