//! Backoff Policies
//!
//! Delays between upstream connection attempts. Both policies retry forever;
//! they only decide how long to wait.
//!
//! - `FixedBackoff`: one constant interval per failure kind (5s after a
//!   failed dial, 1s after a dropped connection by default).
//! - `ExponentialBackoff`: exponential growth with a cap and jitter.

use std::time::Duration;

use rand::Rng;

use crate::application::ports::{BackoffPolicy, FailureKind};

/// Default wait after a failed dial.
pub const DEFAULT_CONNECT_RETRY: Duration = Duration::from_secs(5);

/// Default wait after an established connection drops.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(1);

// =============================================================================
// Fixed Backoff
// =============================================================================

/// Constant delay per failure kind, independent of the attempt count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedBackoff {
    /// Wait after a failed dial.
    pub connect_retry: Duration,
    /// Wait after a dropped connection.
    pub reconnect_delay: Duration,
}

impl Default for FixedBackoff {
    fn default() -> Self {
        Self {
            connect_retry: DEFAULT_CONNECT_RETRY,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
        }
    }
}

impl FixedBackoff {
    /// Create a policy with custom intervals.
    #[must_use]
    pub const fn new(connect_retry: Duration, reconnect_delay: Duration) -> Self {
        Self {
            connect_retry,
            reconnect_delay,
        }
    }
}

impl BackoffPolicy for FixedBackoff {
    fn delay(&self, kind: FailureKind, _attempt: u32) -> Duration {
        match kind {
            FailureKind::ConnectFailure => self.connect_retry,
            FailureKind::ConnectionLost => self.reconnect_delay,
        }
    }
}

// =============================================================================
// Exponential Backoff
// =============================================================================

/// Exponential backoff with jitter.
///
/// The delay for attempt `n` is `initial_delay * multiplier^(n-1)`, capped at
/// `max_delay`, then randomized by `±jitter_factor`. Connection-lost waits
/// start from `reconnect_delay` instead of `initial_delay`.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    /// First delay after a failed dial.
    pub initial_delay: Duration,
    /// First delay after a dropped connection.
    pub reconnect_delay: Duration,
    /// Upper bound for any delay.
    pub max_delay: Duration,
    /// Growth factor per consecutive failure.
    pub multiplier: f64,
    /// Jitter as a fraction (e.g., 0.1 = ±10% randomization).
    pub jitter_factor: f64,
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self {
            initial_delay: DEFAULT_CONNECT_RETRY,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            max_delay: Duration::from_secs(60),
            multiplier: 2.0,
            jitter_factor: 0.1,
        }
    }
}

impl ExponentialBackoff {
    /// Delay before jitter is applied.
    fn base_delay(&self, kind: FailureKind, attempt: u32) -> Duration {
        let start = match kind {
            FailureKind::ConnectFailure => self.initial_delay,
            FailureKind::ConnectionLost => self.reconnect_delay,
        };

        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        #[allow(clippy::cast_precision_loss)]
        let scaled = (start.as_millis() as f64 * self.multiplier.powi(exponent)).round();

        #[allow(clippy::cast_precision_loss)]
        let max_millis = self.max_delay.as_millis() as f64;
        let capped = if scaled.is_finite() {
            scaled.clamp(0.0, max_millis)
        } else {
            max_millis
        };

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let capped_u64 = capped as u64;
        Duration::from_millis(capped_u64)
    }

    /// Apply jitter to a duration.
    fn apply_jitter(&self, duration: Duration) -> Duration {
        if self.jitter_factor <= 0.0 {
            return duration;
        }

        #[allow(clippy::cast_precision_loss)]
        let base_millis = duration.as_millis() as f64;
        let jitter_range = base_millis * self.jitter_factor;
        let mut rng = rand::rng();
        let jitter: f64 = rng.random_range(-jitter_range..=jitter_range);
        let adjusted_millis = (base_millis + jitter).max(1.0);

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let adjusted_u64 = adjusted_millis as u64;
        Duration::from_millis(adjusted_u64)
    }
}

impl BackoffPolicy for ExponentialBackoff {
    fn delay(&self, kind: FailureKind, attempt: u32) -> Duration {
        self.apply_jitter(self.base_delay(kind, attempt))
    }
}
