//! Process-wide spacing of outbound request starts.
//!
//! The [`RateGate`] is a single slot shared by every worker thread: each call
//! to [`RateGate::acquire`] blocks until at least the configured delay has
//! passed since the previous permitted start, then records a new start.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use std::time::Duration;
//! use annales_core::download::RateGate;
//!
//! let gate = Arc::new(RateGate::new(Duration::from_millis(10)));
//! let first = gate.acquire();
//! let second = gate.acquire();
//! assert!(second.duration_since(first) >= Duration::from_millis(10));
//! ```

use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use tracing::{debug, instrument, trace};

use super::constants::DEFAULT_REQUEST_DELAY;

/// Single-slot serializer for request start times.
///
/// `RateGate` is `Send + Sync`; share it behind an `Arc`. The wait happens
/// while holding the lock, so concurrent callers leave the gate one at a time
/// and each leaves at least `delay` after the previous one.
#[derive(Debug)]
pub struct RateGate {
    /// Minimum spacing between successive starts.
    delay: Duration,

    /// Whether spacing is disabled (for `--rate-limit 0`).
    disabled: bool,

    /// Start time of the last permitted request. `None` until the first acquire.
    last_start: Mutex<Option<Instant>>,
}

impl Default for RateGate {
    fn default() -> Self {
        Self::new(DEFAULT_REQUEST_DELAY)
    }
}

impl RateGate {
    /// Creates a gate enforcing `delay` between request starts.
    #[must_use]
    #[instrument(skip_all, fields(delay_ms = delay.as_millis()))]
    pub fn new(delay: Duration) -> Self {
        debug!("creating rate gate");
        Self {
            delay,
            disabled: delay.is_zero(),
            last_start: Mutex::new(None),
        }
    }

    /// Creates a gate that never waits.
    #[must_use]
    pub fn disabled() -> Self {
        Self::new(Duration::ZERO)
    }

    /// Returns whether spacing is disabled.
    #[must_use]
    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    /// Returns the configured spacing.
    #[must_use]
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Blocks until a request may start, then returns its start instant.
    ///
    /// The first acquisition never waits.
    pub fn acquire(&self) -> Instant {
        // A poisoned gate still holds a valid timestamp.
        let mut last = self
            .last_start
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if !self.disabled {
            if let Some(previous) = *last {
                let elapsed = previous.elapsed();
                if elapsed < self.delay {
                    let wait = self.delay - elapsed;
                    trace!(wait_ms = wait.as_millis(), "rate gate waiting");
                    std::thread::sleep(wait);
                }
            }
        }

        let now = Instant::now();
        *last = Some(now);
        now
    }
}
