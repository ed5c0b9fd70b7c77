//! Per-host request throttling.
//!
//! Enforces a minimum delay between request starts to the same host,
//! independent of the worker count, so parallel workers do not trip anti-bot
//! defenses. Requests to different hosts proceed without waiting for each
//! other.
//!
//! Slot reservation works lock-free-across-await: a caller briefly locks the
//! host state to claim the next start slot, releases the lock, then sleeps
//! until its slot. No suspension point holds a lock.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use std::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::constants::MAX_RETRY_AFTER;

/// Per-host rate limiter, shared across workers via `Arc`.
#[derive(Debug)]
pub struct RateLimiter {
    /// Minimum delay between request starts to the same host.
    min_delay: Duration,
    /// Whether throttling is disabled (`--delay 0`).
    disabled: bool,
    /// Next available start slot per host.
    hosts: DashMap<String, Arc<Mutex<HostState>>>,
}

#[derive(Debug)]
struct HostState {
    /// Earliest instant the next request to this host may start.
    /// `None` until the first request (which proceeds immediately).
    next_slot: Option<Instant>,
}

impl RateLimiter {
    /// Creates a rate limiter with the given minimum inter-request delay.
    #[must_use]
    pub fn new(min_delay: Duration) -> Self {
        Self {
            min_delay,
            disabled: false,
            hosts: DashMap::new(),
        }
    }

    /// Creates a disabled limiter that never waits.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            min_delay: Duration::ZERO,
            disabled: true,
            hosts: DashMap::new(),
        }
    }

    /// Returns whether throttling is disabled.
    #[must_use]
    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    /// Returns the configured minimum delay.
    #[must_use]
    pub fn min_delay(&self) -> Duration {
        self.min_delay
    }

    /// Waits until a request to `url`'s host may start.
    ///
    /// The first request to a host proceeds immediately; later requests are
    /// spaced `min_delay` apart in reservation order.
    pub async fn acquire(&self, url: &str) {
        if self.disabled {
            return;
        }

        let host = extract_host(url);
        let state = self
            .hosts
            .entry(host.clone())
            .or_insert_with(|| Arc::new(Mutex::new(HostState { next_slot: None })))
            .clone();

        let start_at = {
            let mut state = state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            let now = Instant::now();
            let start_at = match state.next_slot {
                Some(slot) if slot > now => slot,
                _ => now,
            };
            state.next_slot = Some(start_at + self.min_delay);
            start_at
        };

        let wait = start_at.saturating_duration_since(Instant::now());
        if !wait.is_zero() {
            debug!(host = %host, wait_ms = wait.as_millis(), "rate limit delay");
            tokio::time::sleep_until(start_at).await;
        }
    }

    /// Records a server-mandated delay (Retry-After) for `url`'s host,
    /// pushing the next start slot out so other workers respect it too.
    pub fn record_rate_limit(&self, url: &str, delay: Duration) {
        let host = extract_host(url);
        let state = self
            .hosts
            .entry(host.clone())
            .or_insert_with(|| Arc::new(Mutex::new(HostState { next_slot: None })))
            .clone();

        let mut state = state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let earliest = Instant::now() + delay;
        if state.next_slot.is_none_or(|slot| slot < earliest) {
            state.next_slot = Some(earliest);
        }
        debug!(host = %host, delay_ms = delay.as_millis(), "recorded server rate limit");
    }
}

/// Extracts the host from a URL, lowercased.
///
/// Returns "unknown" for malformed URLs so those requests are still
/// throttled as a group.
#[must_use]
pub fn extract_host(url: &str) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_lowercase))
        .unwrap_or_else(|| "unknown".to_string())
}

/// Parses a Retry-After header value into a duration.
///
/// Supports both RFC 7231 forms: integer seconds and HTTP-date. Values are
/// capped at one hour; negative or unparseable values yield `None`.
#[must_use]
pub fn parse_retry_after(header_value: &str) -> Option<Duration> {
    let header_value = header_value.trim();

    if let Ok(seconds) = header_value.parse::<i64>() {
        if seconds < 0 {
            return None;
        }
        #[allow(clippy::cast_sign_loss)]
        let duration = Duration::from_secs(seconds as u64);
        if duration > MAX_RETRY_AFTER {
            warn!(
                seconds,
                cap_secs = MAX_RETRY_AFTER.as_secs(),
                "Retry-After exceeds cap"
            );
            return Some(MAX_RETRY_AFTER);
        }
        return Some(duration);
    }

    let datetime = httpdate::parse_http_date(header_value).ok()?;
    match datetime.duration_since(std::time::SystemTime::now()) {
        Ok(duration) => Some(duration.min(MAX_RETRY_AFTER)),
        // Date in the past: no wait.
        Err(_) => Some(Duration::ZERO),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_disabled_never_waits() {
        tokio::time::pause();

        let limiter = RateLimiter::disabled();
        let start = Instant::now();
        limiter.acquire("https://example.com/1").await;
        limiter.acquire("https://example.com/2").await;

        assert!(start.elapsed() < Duration::from_millis(10));
    }

    #[tokio::test]
    async fn test_first_request_immediate() {
        tokio::time::pause();

        let limiter = RateLimiter::new(Duration::from_secs(1));
        let start = Instant::now();
        limiter.acquire("https://example.com/file.pdf").await;

        assert!(start.elapsed() < Duration::from_millis(10));
    }

    #[tokio::test]
    async fn test_same_host_spaced() {
        tokio::time::pause();

        let limiter = RateLimiter::new(Duration::from_secs(1));
        let start = Instant::now();

        limiter.acquire("https://example.com/1").await;
        limiter.acquire("https://example.com/2").await;
        assert!(start.elapsed() >= Duration::from_secs(1));

        limiter.acquire("https://example.com/3").await;
        assert!(start.elapsed() >= Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_different_hosts_independent() {
        tokio::time::pause();

        let limiter = RateLimiter::new(Duration::from_secs(1));
        let start = Instant::now();

        limiter.acquire("https://a.example/1").await;
        limiter.acquire("https://b.example/1").await;
        limiter.acquire("https://c.example/1").await;

        assert!(start.elapsed() < Duration::from_millis(10));
    }

    #[tokio::test]
    async fn test_record_rate_limit_pushes_slot() {
        tokio::time::pause();

        let limiter = RateLimiter::new(Duration::from_millis(100));
        limiter.acquire("https://example.com/1").await;
        limiter.record_rate_limit("https://example.com/1", Duration::from_secs(30));

        let start = Instant::now();
        limiter.acquire("https://example.com/2").await;
        assert!(start.elapsed() >= Duration::from_secs(30));
    }

    #[test]
    fn test_extract_host() {
        assert_eq!(extract_host("https://Example.COM/Path"), "example.com");
        assert_eq!(extract_host("https://api.example.com:8443/x"), "api.example.com");
        assert_eq!(extract_host("not a url"), "unknown");
        assert_eq!(extract_host(""), "unknown");
    }

    #[test]
    fn test_parse_retry_after_seconds() {
        assert_eq!(parse_retry_after("120"), Some(Duration::from_secs(120)));
        assert_eq!(parse_retry_after("  15 "), Some(Duration::from_secs(15)));
        assert_eq!(parse_retry_after("0"), Some(Duration::ZERO));
    }

    #[test]
    fn test_parse_retry_after_rejects_garbage() {
        assert_eq!(parse_retry_after("-5"), None);
        assert_eq!(parse_retry_after("soon"), None);
        assert_eq!(parse_retry_after(""), None);
    }

    #[test]
    fn test_parse_retry_after_caps_at_one_hour() {
        assert_eq!(parse_retry_after("7200"), Some(Duration::from_secs(3600)));
    }

    #[test]
    fn test_parse_retry_after_http_date_in_past() {
        assert_eq!(
            parse_retry_after("Wed, 01 Jan 2020 00:00:00 GMT"),
            Some(Duration::ZERO)
        );
    }

    #[test]
    fn test_parse_retry_after_http_date_in_future() {
        let future = std::time::SystemTime::now() + Duration::from_secs(60);
        let value = httpdate::fmt_http_date(future);
        let parsed = parse_retry_after(&value).unwrap();
        assert!(parsed > Duration::from_secs(55) && parsed <= Duration::from_secs(60));
    }
}
