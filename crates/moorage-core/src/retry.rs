// crates/moorage-core/src/retry.rs
// ============================================================================
// Module: Retry Seam
// Description: Retry policy contract and the transient-retry loop.
// Purpose: Absorb transient backend errors without hard-coding a policy.
// Dependencies: tracing
// ============================================================================

//! ## Overview
//! Backend operations classify their own errors as transient or permanent
//! (see [`crate::backend`]); this module supplies the loop that retries
//! transient ones. The policy is a trait so callers can inject their own
//! backoff schedule. Only [`FixedBackoff`] ships here; anything smarter is
//! an external collaborator.

use std::thread;
use std::time::Duration;

use tracing::warn;

/// Default delay between attempts of the stock policy.
const DEFAULT_DELAY: Duration = Duration::from_secs(1);
/// Default number of attempts of the stock policy.
const DEFAULT_ATTEMPTS: u32 = 12;

/// Backoff schedule for retrying transient failures.
///
/// `backoff(attempt)` is asked after the attempt numbered `attempt`
/// (starting at zero) fails; `None` stops the loop.
pub trait RetryPolicy: Send + Sync {
    /// Returns the delay before the next attempt, or `None` to give up.
    fn backoff(&self, attempt: u32) -> Option<Duration>;
}

/// Fixed-delay policy with a bounded attempt count.
#[derive(Debug, Clone)]
pub struct FixedBackoff {
    /// Delay between attempts.
    delay: Duration,
    /// Total number of attempts allowed.
    attempts: u32,
}

impl FixedBackoff {
    /// Creates a policy sleeping `delay` between up to `attempts` attempts.
    #[must_use]
    pub const fn new(delay: Duration, attempts: u32) -> Self {
        Self {
            delay,
            attempts,
        }
    }
}

impl Default for FixedBackoff {
    fn default() -> Self {
        Self::new(DEFAULT_DELAY, DEFAULT_ATTEMPTS)
    }
}

impl RetryPolicy for FixedBackoff {
    fn backoff(&self, attempt: u32) -> Option<Duration> {
        (attempt + 1 < self.attempts).then_some(self.delay)
    }
}

/// Policy that never retries; every error is final.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRetry;

impl RetryPolicy for NoRetry {
    fn backoff(&self, _attempt: u32) -> Option<Duration> {
        None
    }
}

/// Runs `operation` until it succeeds, fails permanently, or exhausts the
/// policy.
///
/// `is_transient` decides which errors are worth another attempt.
///
/// # Errors
///
/// Returns the last error when it is permanent or the policy gives up.
pub fn with_retry<T, E, F>(
    policy: &dyn RetryPolicy,
    is_transient: impl Fn(&E) -> bool,
    mut operation: F,
) -> Result<T, E>
where
    E: std::fmt::Display,
    F: FnMut() -> Result<T, E>,
{
    let mut attempt = 0;
    loop {
        match operation() {
            Ok(value) => return Ok(value),
            Err(err) if is_transient(&err) => {
                let Some(delay) = policy.backoff(attempt) else {
                    return Err(err);
                };
                warn!(attempt, error = %err, "transient failure, retrying");
                thread::sleep(delay);
                attempt += 1;
            },
            Err(err) => return Err(err),
        }
    }
}
