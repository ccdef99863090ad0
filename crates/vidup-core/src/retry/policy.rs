use std::time::Duration;

use crate::config::RetryConfig;

/// High-level classification of a failed exchange for retry purposes.
///
/// Callers map HTTP status codes and transport failures into these kinds
/// (see [`super::classify`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// 401: the access token may have expired.
    Unauthorized,
    /// 403: never retried.
    Forbidden,
    /// 415: the server refuses the file format itself.
    UnsupportedMediaType,
    /// 503 or a transport timeout: transient overload, worth persisting.
    Unavailable,
    /// Generic retryable band: status < 400 (0 = no response) or 401..=500 not listed above.
    Retryable,
    /// Anything else; not retried.
    Fatal,
}

/// Why the policy gave up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    UnsupportedMediaType,
    AuthenticationFailed,
    Forbidden,
    TransferFailed,
}

/// Decision returned by the retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryVerdict {
    /// Retransmit after the given (advisory) delay.
    Retry(Duration),
    /// Refresh the access token, then retransmit immediately.
    RefreshAuthAndRetry,
    /// Stop; surface the reason.
    Abort(AbortReason),
}

/// Exponential backoff with two attempt ceilings.
///
/// 503/timeouts get `max_attempts_unavailable` (30 by default), everything
/// else retryable gets `max_attempts` (6). The asymmetry is intentional.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempt ceiling (including the first) for the generic retryable band.
    pub max_attempts: u32,
    /// Attempt ceiling (including the first) for 503 / timeouts.
    pub max_attempts_unavailable: u32,
    /// Base delay for backoff.
    pub base_delay: Duration,
    /// Upper bound on backoff delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 6,
            max_attempts_unavailable: 30,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(120),
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(cfg: &RetryConfig) -> Self {
        let base = if cfg.base_delay_secs.is_finite() && cfg.base_delay_secs > 0.0 {
            Duration::from_secs_f64(cfg.base_delay_secs)
        } else {
            Duration::ZERO
        };
        Self {
            max_attempts: cfg.max_attempts.max(1),
            max_attempts_unavailable: cfg.max_attempts_unavailable.max(1),
            base_delay: base,
            max_delay: Duration::from_secs(cfg.max_delay_secs),
        }
    }
}

impl RetryPolicy {
    /// Policy that never sleeps; handy for tests and tight loops against local servers.
    pub fn immediate() -> Self {
        Self {
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            ..Self::default()
        }
    }

    /// Backoff for the given 1-based attempt: `base * 2^(attempt-1)`, capped at `max_delay`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = 1u32 << attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(exp).min(self.max_delay)
    }

    /// Decide for an HTTP status. `attempt` is 1-based: 1 = the first failure of this exchange.
    pub fn decide(&self, status: u16, attempt: u32, has_refreshed_auth: bool) -> RetryVerdict {
        self.decide_kind(super::classify_http_status(status), attempt, has_refreshed_auth)
    }

    /// Decide for an already-classified failure.
    pub fn decide_kind(&self, kind: ErrorKind, attempt: u32, has_refreshed_auth: bool) -> RetryVerdict {
        match kind {
            ErrorKind::Unauthorized if has_refreshed_auth => {
                RetryVerdict::Abort(AbortReason::AuthenticationFailed)
            }
            ErrorKind::Unauthorized => RetryVerdict::RefreshAuthAndRetry,
            ErrorKind::Forbidden => RetryVerdict::Abort(AbortReason::Forbidden),
            ErrorKind::UnsupportedMediaType => {
                RetryVerdict::Abort(AbortReason::UnsupportedMediaType)
            }
            ErrorKind::Unavailable => self.bounded(attempt, self.max_attempts_unavailable),
            ErrorKind::Retryable => self.bounded(attempt, self.max_attempts),
            ErrorKind::Fatal => RetryVerdict::Abort(AbortReason::TransferFailed),
        }
    }

    fn bounded(&self, attempt: u32, ceiling: u32) -> RetryVerdict {
        if attempt >= ceiling {
            return RetryVerdict::Abort(AbortReason::TransferFailed);
        }
        RetryVerdict::Retry(self.backoff(attempt))
    }
}
