//! Constants for the fetch module (timeouts, size bounds, rate limiting).

use std::time::Duration;

/// Default HTTP connect timeout (30 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default per-request timeout for artifact downloads (5 minutes).
pub const REQUEST_TIMEOUT_SECS: u64 = 300;

/// Default per-request timeout for discovery page fetches (15 seconds).
pub const PAGE_TIMEOUT_SECS: u64 = 15;

/// Minimum plausible artifact size (50 KB). Anything smaller is almost
/// certainly an error page, not a paper.
pub const MIN_CONTENT_BYTES: u64 = 50 * 1024;

/// Maximum accepted artifact size (35 MB).
pub const MAX_CONTENT_BYTES: u64 = 35 * 1024 * 1024;

/// Maximum Retry-After header value (1 hour) to prevent excessive delays.
pub const MAX_RETRY_AFTER: Duration = Duration::from_secs(3600);
