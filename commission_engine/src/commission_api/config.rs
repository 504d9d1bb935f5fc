use std::time::Duration;

use crate::db_types::CommissionRate;

pub const DEFAULT_TRANSACTION_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_millis(50);
pub const DEFAULT_ATTRIBUTION_WINDOW_DAYS: i64 = 30;
pub const DEFAULT_REPORTING_WINDOW_DAYS: i64 = 30;
pub const DEFAULT_REFERRAL_CODE_ATTEMPTS: usize = 5;

/// Controls how the ledger engine runs each balance-changing operation.
#[derive(Debug, Clone, Copy)]
pub struct LedgerConfig {
    /// Upper bound on the wait for a partner lock. The store applies the same bound to a write up to its commit.
    pub transaction_timeout: Duration,
    /// How many times a transient failure is retried before it is reported.
    pub max_retries: u32,
    /// The delay before retry `n` is `n * retry_backoff`.
    pub retry_backoff: Duration,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            transaction_timeout: DEFAULT_TRANSACTION_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
        }
    }
}

impl LedgerConfig {
    pub fn timeout_millis(&self) -> u64 {
        u64::try_from(self.transaction_timeout.as_millis()).unwrap_or(u64::MAX)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct AttributionConfig {
    /// How long a referral linkage stays valid, measured from the moment the linkage was created to the moment the
    /// order was placed.
    pub window: chrono::Duration,
}

impl Default for AttributionConfig {
    fn default() -> Self {
        Self { window: chrono::Duration::days(DEFAULT_ATTRIBUTION_WINDOW_DAYS) }
    }
}

impl AttributionConfig {
    pub fn with_window_days(days: i64) -> Self {
        Self { window: chrono::Duration::days(days) }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PartnerConfig {
    pub default_commission_rate: CommissionRate,
    pub referral_code_attempts: usize,
}

impl Default for PartnerConfig {
    fn default() -> Self {
        Self {
            default_commission_rate: CommissionRate::default(),
            referral_code_attempts: DEFAULT_REFERRAL_CODE_ATTEMPTS,
        }
    }
}
