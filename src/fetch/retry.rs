//! Retry policy and failure classification for the fetch engine.
//!
//! [`RetryPolicy::next_delay`] is a pure function from (attempt number,
//! failure kind) to a retry decision: `Some(delay)` to try again after the
//! delay, `None` to give up on the current URL. Given the same inputs it
//! always returns the same answer, independent of wall-clock time, so it is
//! unit-testable without real delays. Jitter, when wanted, is the engine's
//! business at the sleep site.

use std::time::Duration;

use tracing::debug;

use super::FetchError;
use crate::task::FailureKind;

/// Default attempt ceiling per URL (including the initial attempt).
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Default base delay for exponential backoff (1 second).
const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

/// Default delay cap (5 seconds).
const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(5);

/// Exponential backoff policy with a fixed attempt ceiling.
///
/// With defaults, a URL that keeps failing transiently is attempted 5 times
/// with sleeps of 1s, 2s, 4s, 5s between attempts, then abandoned.
/// Non-retryable failure kinds give up immediately regardless of the
/// attempt count.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum attempts per URL, including the initial attempt.
    max_attempts: u32,
    /// Delay before the first retry.
    base_delay: Duration,
    /// Cap applied to the exponential delay.
    max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Creates a policy with custom settings. `max_attempts` is clamped to
    /// at least 1.
    #[must_use]
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
        }
    }

    /// Creates a policy with a custom attempt ceiling and default delays.
    #[must_use]
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Self::default()
        }
    }

    /// Returns the configured attempt ceiling.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Decides whether to retry after a failed attempt.
    ///
    /// `attempt` is the 1-indexed attempt that just failed. Returns the
    /// delay to sleep before the next attempt, or `None` when the failure
    /// is not retryable or the ceiling is reached.
    #[must_use]
    pub fn next_delay(&self, attempt: u32, failure: FailureKind) -> Option<Duration> {
        if !failure.is_retryable() {
            debug!(%failure, "not retryable - giving up on this URL");
            return None;
        }
        if attempt >= self.max_attempts {
            debug!(attempt, max = self.max_attempts, "attempt ceiling reached");
            return None;
        }

        // attempt 1 -> base * 2^0, attempt 2 -> base * 2^1, ...
        let exponent = (attempt - 1).min(16);
        let delay = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(exponent));
        Some(delay.min(self.max_delay))
    }
}

/// Classifies a fetch error into the failure taxonomy.
///
/// | Status | Kind | Rationale |
/// |--------|------|-----------|
/// | 400, 404, 410, 451 | `PermanentRemote` | Confirmed absence/rejection |
/// | 401, 403 | `PermanentRemote` | Access denied; retrying without credentials cannot help |
/// | 408 | `TransientNetwork` | Request timeout may succeed |
/// | 429 | `RateLimited` | Back off and retry |
/// | 5xx | `TransientNetwork` | Server may recover |
/// | other 4xx | `PermanentRemote` | Client-side, retry cannot help |
#[must_use]
pub fn classify_error(error: &FetchError) -> FailureKind {
    match error {
        FetchError::Timeout { .. } | FetchError::Network { .. } | FetchError::Service { .. } => {
            FailureKind::TransientNetwork
        }
        FetchError::HttpStatus { status, .. } => classify_http_status(*status),
        FetchError::Cancelled { .. } => FailureKind::Cancelled,
    }
}

fn classify_http_status(status: u16) -> FailureKind {
    match status {
        408 => FailureKind::TransientNetwork,
        429 => FailureKind::RateLimited,
        status if (400..500).contains(&status) => FailureKind::PermanentRemote(status),
        status if (500..600).contains(&status) => FailureKind::TransientNetwork,
        status => FailureKind::PermanentRemote(status),
    }
}
