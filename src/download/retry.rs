//! Retry logic with exponential backoff for transient download failures.
//!
//! This module provides the [`RetryPolicy`] and [`FailureType`] types for
//! classifying download errors and running an operation with bounded retries.
//!
//! # Overview
//!
//! When a download fails, the error is classified into a [`FailureType`]:
//! - [`FailureType::Transient`] - Temporary failures that may succeed on retry
//! - [`FailureType::Permanent`] - Failures that won't succeed regardless of retries
//! - [`FailureType::NeedsAuth`] - Authentication required (never retried)
//! - [`FailureType::RateLimited`] - Server rate limiting (retries with backoff)
//!
//! Between attempts the policy sleeps `base^index` seconds, where `index`
//! counts failed attempts from 0: with the default base of 2 the waits are
//! 1s, 2s, 4s, ...
//!
//! # Example
//!
//! ```
//! use annales_core::download::{DownloadError, RetryPolicy, is_retryable};
//!
//! let policy = RetryPolicy::new(1, 2.0);
//! let result: Result<(), DownloadError> = policy.run(
//!     |_attempt| Err(DownloadError::http_status("https://example.com/a.pdf", 404)),
//!     is_retryable,
//! );
//! assert!(result.is_err());
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, instrument, warn};

use super::DownloadError;

/// Default maximum attempts (including the first).
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default backoff base in seconds.
pub const DEFAULT_BACKOFF_BASE: f64 = 2.0;

/// Classification of download failure types.
///
/// Used to determine whether a failed download should be retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureType {
    /// Temporary failure that may succeed on retry.
    ///
    /// Examples: network timeout, 5xx server errors, connection refused.
    Transient,

    /// Permanent failure that won't succeed regardless of retries.
    ///
    /// Examples: 404 Not Found, invalid URL, local IO, failed validation.
    Permanent,

    /// Authentication or authorization required.
    NeedsAuth,

    /// Server rate limiting (HTTP 429).
    RateLimited,
}

impl FailureType {
    /// Whether a failure of this type is worth another attempt.
    #[must_use]
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::Transient | Self::RateLimited)
    }
}

/// Blocking sleep used between retry attempts.
///
/// Swapped out in tests to observe waits without spending them.
pub trait Sleeper: Send + Sync + fmt::Debug {
    fn sleep(&self, duration: Duration);
}

/// [`Sleeper`] backed by [`std::thread::sleep`].
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Bounded retries with exponential backoff.
///
/// # Default Values
///
/// - `max_attempts`: 3
/// - `backoff_base`: 2.0
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the initial attempt).
    max_attempts: u32,

    /// Base of the exponential backoff, in seconds.
    backoff_base: f64,

    sleeper: Arc<dyn Sleeper>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RETRIES, DEFAULT_BACKOFF_BASE)
    }
}

impl RetryPolicy {
    /// Creates a policy; `max_attempts` is clamped to at least 1.
    #[must_use]
    pub fn new(max_attempts: u32, backoff_base: f64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff_base,
            sleeper: Arc::new(ThreadSleeper),
        }
    }

    /// Replaces the sleeper used between attempts.
    #[must_use]
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Returns the maximum number of attempts configured.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Returns the backoff base in seconds.
    #[must_use]
    pub fn backoff_base(&self) -> f64 {
        self.backoff_base
    }

    /// Wait after the failed attempt with the given 0-based index.
    #[must_use]
    pub fn delay_for(&self, attempt_index: u32) -> Duration {
        let exponent = i32::try_from(attempt_index).unwrap_or(i32::MAX);
        Duration::try_from_secs_f64(self.backoff_base.powi(exponent)).unwrap_or(Duration::ZERO)
    }

    /// Runs `op` until it succeeds, fails with a non-retryable error, or the
    /// attempts run out. `op` receives the 1-based attempt number.
    ///
    /// The last error is returned unchanged.
    #[instrument(skip_all, fields(max_attempts = self.max_attempts))]
    pub fn run<T, E, F, P>(&self, mut op: F, is_retryable: P) -> Result<T, E>
    where
        F: FnMut(u32) -> Result<T, E>,
        P: Fn(&E) -> bool,
        E: fmt::Display,
    {
        let mut index = 0;
        loop {
            let attempt = index + 1;
            match op(attempt) {
                Ok(value) => return Ok(value),
                Err(error) => {
                    if !is_retryable(&error) {
                        debug!(attempt, error = %error, "non-retryable failure");
                        return Err(error);
                    }
                    if attempt >= self.max_attempts {
                        debug!(attempt, max = self.max_attempts, "max attempts reached");
                        return Err(error);
                    }
                    let delay = self.delay_for(index);
                    warn!(
                        attempt,
                        next_attempt = attempt + 1,
                        delay_ms = delay.as_millis(),
                        error = %error,
                        "attempt failed, retrying"
                    );
                    self.sleeper.sleep(delay);
                    index += 1;
                }
            }
        }
    }
}

/// Retry predicate for [`DownloadError`], suitable for [`RetryPolicy::run`].
#[must_use]
pub fn is_retryable(error: &DownloadError) -> bool {
    classify_error(error).is_retryable()
}

/// Classifies a download error into a failure type for retry decisions.
///
/// # HTTP Status Code Classification
///
/// | Status | Type |
/// |--------|------|
/// | 401, 403, 407 | NeedsAuth |
/// | 408 | Transient |
/// | 429 | RateLimited |
/// | other 4xx | Permanent |
/// | 5xx | Transient |
///
/// # Non-HTTP Errors
///
/// | Error | Type |
/// |-------|------|
/// | Timeout, Stream | Transient |
/// | Network (including TLS handshakes) | Transient |
/// | IO, InvalidUrl | Permanent |
/// | Validation, UnresolvedType, DuplicateUrl | Permanent |
#[must_use]
pub fn classify_error(error: &DownloadError) -> FailureType {
    match error {
        DownloadError::HttpStatus { status, .. } => classify_http_status(*status),

        DownloadError::Timeout { .. }
        | DownloadError::Stream { .. }
        | DownloadError::Network { .. } => FailureType::Transient,

        DownloadError::Io { .. }
        | DownloadError::InvalidUrl { .. }
        | DownloadError::Validation { .. }
        | DownloadError::UnresolvedType { .. }
        | DownloadError::DuplicateUrl { .. } => FailureType::Permanent,
    }
}

/// Classifies an HTTP status code into a failure type.
#[allow(clippy::match_same_arms)]
fn classify_http_status(status: u16) -> FailureType {
    match status {
        401 | 403 | 407 => FailureType::NeedsAuth,
        408 => FailureType::Transient, // Request Timeout
        429 => FailureType::RateLimited,
        status if (400..500).contains(&status) => FailureType::Permanent,
        status if (500..600).contains(&status) => FailureType::Transient,
        _ => FailureType::Permanent,
    }
}
