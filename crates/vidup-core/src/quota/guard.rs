//! Pure admission predicate for a candidate file.

use std::fmt;

use super::{QuotaSnapshot, UNLIMITED};

/// Why a file was refused before any upload request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaRejection {
    GlobalQuotaExceeded,
    DailyQuotaExceeded,
}

impl fmt::Display for QuotaRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuotaRejection::GlobalQuotaExceeded => write!(f, "global video quota exceeded"),
            QuotaRejection::DailyQuotaExceeded => write!(f, "daily video quota exceeded"),
        }
    }
}

/// Result of [`admit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admitted,
    Rejected(QuotaRejection),
}

impl Admission {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Admission::Admitted)
    }
}

fn exceeds(used: i64, size: u64, limit: i64) -> bool {
    if limit == UNLIMITED || limit < 0 {
        return false;
    }
    let size = i128::from(size);
    i128::from(used.max(0)) + size > i128::from(limit)
}

/// Checks `file_size` against the global limit first, then the daily one.
pub fn admit(file_size: u64, quota: &QuotaSnapshot) -> Admission {
    if exceeds(quota.used, file_size, quota.limit) {
        return Admission::Rejected(QuotaRejection::GlobalQuotaExceeded);
    }
    if exceeds(quota.used_daily, file_size, quota.limit_daily) {
        return Admission::Rejected(QuotaRejection::DailyQuotaExceeded);
    }
    Admission::Admitted
}
