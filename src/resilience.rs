//! Retry policies: how many times a call may be retried and how far apart
//! reconnect attempts must be.
//!
//! - [`RetryPolicy`]: the strategy seam consumed by [`FailoverTransport`](crate::FailoverTransport)
//! - [`FixedRetryPolicy`]: constant spacing
//! - [`IncreasingRetryPolicy`]: explicit delay table, last entry repeated
//! - [`ExponentialRetryPolicy`]: `initial * factor^attempt`, capped
//!
//! Delays are keyed by the number of consecutive failed reconnects against the
//! same address (0 = none yet). Every policy here yields a non-decreasing
//! sequence.
//!
//! # Example
//!
//! ```rust
//! use journal_rpc::resilience::{IncreasingRetryPolicy, RetryPolicy};
//! use std::time::Duration;
//!
//! let policy = IncreasingRetryPolicy::new(vec![50, 100, 500], 3);
//! assert_eq!(policy.max_retries(), 3);
//! assert_eq!(policy.retry_delay(0), Duration::from_millis(50));
//! assert_eq!(policy.retry_delay(7), Duration::from_millis(500));
//! ```

use std::fmt::Debug;
use std::time::Duration;

/// Strategy bounding retry attempts and spacing reconnect attempts.
pub trait RetryPolicy: Debug + Send + Sync + 'static {
    /// Upper bound on retries per logical call (0 = only the original attempt).
    fn max_retries(&self) -> usize;

    /// Minimum time since the last reconnect attempt before a new one is
    /// permitted, given `attempt` consecutive failed reconnects so far.
    fn retry_delay(&self, attempt: usize) -> Duration;
}

/// Same delay before every reconnect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixedRetryPolicy {
    pub max_retries: usize,
    pub delay: Duration,
}

impl FixedRetryPolicy {
    pub fn new(max_retries: usize, delay: Duration) -> Self {
        Self { max_retries, delay }
    }

    /// Never retry, reconnect whenever asked.
    pub fn none() -> Self {
        Self::new(0, Duration::ZERO)
    }
}

impl RetryPolicy for FixedRetryPolicy {
    fn max_retries(&self) -> usize {
        self.max_retries
    }

    fn retry_delay(&self, _attempt: usize) -> Duration {
        self.delay
    }
}

/// Delays taken from an explicit table (milliseconds), indexed by attempt.
///
/// Attempts past the end of the table reuse the last entry. The table is
/// sorted on construction so the sequence is always non-decreasing.
///
/// # Default Schedule
///
/// ```text
/// Attempt  Delay
/// -------  -----
/// 0        50ms
/// 1        100ms
/// 2        500ms
/// 3        1s
/// 4        3s
/// 5        10s
/// 6+       30s
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncreasingRetryPolicy {
    delays_ms: Vec<u64>,
    max_retries: usize,
}

/// Default delay table, in milliseconds.
pub const DEFAULT_DELAYS_MS: [u64; 7] = [50, 100, 500, 1000, 3000, 10_000, 30_000];

/// Default retry budget per call.
pub const DEFAULT_MAX_RETRIES: usize = 50;

impl Default for IncreasingRetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_DELAYS_MS.to_vec(), DEFAULT_MAX_RETRIES)
    }
}

impl IncreasingRetryPolicy {
    pub fn new(mut delays_ms: Vec<u64>, max_retries: usize) -> Self {
        delays_ms.sort_unstable();
        Self {
            delays_ms,
            max_retries,
        }
    }

    pub fn delays_ms(&self) -> &[u64] {
        &self.delays_ms
    }
}

impl RetryPolicy for IncreasingRetryPolicy {
    fn max_retries(&self) -> usize {
        self.max_retries
    }

    fn retry_delay(&self, attempt: usize) -> Duration {
        let idx = attempt.min(self.delays_ms.len().saturating_sub(1));
        Duration::from_millis(self.delays_ms.get(idx).copied().unwrap_or(0))
    }
}

/// Exponential backoff between reconnect attempts.
#[derive(Debug, Clone)]
pub struct ExponentialRetryPolicy {
    /// Maximum number of retries per call.
    pub max_retries: usize,

    /// Delay before the first reconnect.
    pub initial_delay: Duration,

    /// Maximum delay between reconnects (ceiling for exponential backoff).
    pub max_delay: Duration,

    /// Backoff multiplier (e.g., 2.0 = double delay each failure).
    pub backoff_factor: f64,
}

impl Default for ExponentialRetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 10,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            backoff_factor: 2.0,
        }
    }
}

impl ExponentialRetryPolicy {
    /// Fast-fail policy for tests.
    pub fn testing() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(100),
            backoff_factor: 2.0,
        }
    }
}

impl RetryPolicy for ExponentialRetryPolicy {
    fn max_retries(&self) -> usize {
        self.max_retries
    }

    fn retry_delay(&self, attempt: usize) -> Duration {
        if attempt == 0 {
            return self.initial_delay;
        }
        // A factor below 1 would shrink the delay; clamp to keep it monotone.
        let factor = self.backoff_factor.max(1.0);
        let exponent = attempt.min(i32::MAX as usize) as i32;
        let delay_secs = self.initial_delay.as_secs_f64() * factor.powi(exponent);

        if !delay_secs.is_finite() || delay_secs >= self.max_delay.as_secs_f64() {
            return self.max_delay.max(self.initial_delay);
        }
        Duration::from_secs_f64(delay_secs).max(self.initial_delay)
    }
}
