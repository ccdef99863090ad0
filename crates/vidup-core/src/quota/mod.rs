//! Quota admission: snapshot types, the pure guard and the usage collaborator.
//!
//! Usage is read once, right before a session would be opened. A breach that
//! happens mid-transfer is the server's problem, not ours.

mod guard;
pub mod server;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use guard::{admit, Admission, QuotaRejection};

/// Limit value meaning "no ceiling".
pub const UNLIMITED: i64 = -1;

/// Byte limits of the uploading account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaLimits {
    pub limit: i64,
    pub limit_daily: i64,
}

impl QuotaLimits {
    pub const fn unlimited() -> Self {
        Self {
            limit: UNLIMITED,
            limit_daily: UNLIMITED,
        }
    }
}

impl Default for QuotaLimits {
    fn default() -> Self {
        Self::unlimited()
    }
}

/// Bytes already consumed, as reported by the quota collaborator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaUsage {
    pub used: i64,
    pub used_daily: i64,
}

/// Read-only view captured at admission time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaSnapshot {
    pub used: i64,
    pub used_daily: i64,
    pub limit: i64,
    pub limit_daily: i64,
}

impl QuotaSnapshot {
    pub fn new(usage: QuotaUsage, limits: QuotaLimits) -> Self {
        Self {
            used: usage.used,
            used_daily: usage.used_daily,
            limit: limits.limit,
            limit_daily: limits.limit_daily,
        }
    }
}

/// Source of current quota usage (the account's `getCurrentQuotaUsage`).
#[async_trait]
pub trait QuotaSource: Send + Sync {
    async fn current_usage(&self) -> anyhow::Result<QuotaUsage>;
}

/// Quota source for accounts without limits or when usage is known up front.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedUsage(pub QuotaUsage);

#[async_trait]
impl QuotaSource for FixedUsage {
    async fn current_usage(&self) -> anyhow::Result<QuotaUsage> {
        Ok(self.0)
    }
}
