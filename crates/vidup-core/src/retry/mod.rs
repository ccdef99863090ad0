//! Retry and backoff policy.
//!
//! Maps every failed exchange (HTTP status or transport error) to a verdict:
//! retry after a backoff, refresh the access token and retry, or abort. The
//! controller owns the attempt counter in a [`RetryAttempt`].

mod classify;
mod policy;

use std::time::Duration;

pub use classify::{classify_http_status, classify_transport_error};
pub use policy::{AbortReason, ErrorKind, RetryPolicy, RetryVerdict};

/// Attempt bookkeeping for the exchange currently being retried.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetryAttempt {
    /// Failures seen so far for this exchange (0 = none yet).
    pub attempt_number: u32,
    /// Status of the last failure; `None` if no response was received.
    pub last_status_code: Option<u16>,
    /// Delay chosen for the next attempt, if any.
    pub next_delay: Option<Duration>,
}

impl RetryAttempt {
    /// Record a failure and return the new 1-based attempt number.
    pub fn record_failure(&mut self, status: Option<u16>) -> u32 {
        self.attempt_number = self.attempt_number.saturating_add(1);
        self.last_status_code = status;
        self.next_delay = None;
        self.attempt_number
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_and_reset() {
        let mut a = RetryAttempt::default();
        assert_eq!(a.record_failure(Some(503)), 1);
        assert_eq!(a.record_failure(None), 2);
        assert_eq!(a.last_status_code, None);
        a.reset();
        assert_eq!(a, RetryAttempt::default());
    }
}
