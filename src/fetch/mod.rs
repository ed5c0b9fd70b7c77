//! The fetch engine and its collaborators.
//!
//! Candidate tasks flow through transport, validation, and the atomic
//! writer under the engine's bounded-parallel retry loop:
//!
//! - [`transport`] - one HTTP request per call, typed failures, no retries
//! - [`validate`] - size/magic/content-type rules on downloaded bytes
//! - [`retry`] - pure backoff policy and failure classification
//! - [`writer`] - write-to-temp-then-rename commits
//! - [`rate_limiter`] - per-host spacing of request starts
//! - [`engine`] - the state machine tying it all together

mod constants;
mod engine;
mod error;
pub mod rate_limiter;
mod retry;
pub mod transport;
mod validate;
pub mod writer;

pub use constants::{MAX_CONTENT_BYTES, MIN_CONTENT_BYTES, PAGE_TIMEOUT_SECS, REQUEST_TIMEOUT_SECS};
pub use engine::{DEFAULT_CONCURRENCY, EngineError, FetchEngine, artifact_path};
pub use error::FetchError;
pub use rate_limiter::{RateLimiter, extract_host, parse_retry_after};
pub use retry::{DEFAULT_MAX_ATTEMPTS, RetryPolicy, classify_error};
pub use transport::{ContentFetcher, FetchRequest, FetchedPayload, HttpTransport};
pub use validate::{InvalidReason, Validator};
