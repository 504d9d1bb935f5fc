use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    db_types::{Cents, CommissionTransaction, OrderId, PartnerStatus, ReferralCode, TransactionStatus, TransactionType},
    ledger::CommissionBalance,
};

pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 100;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TransactionQueryFilter {
    pub partner_id: Option<i64>,
    pub order_id: Option<OrderId>,
    #[serde(default)]
    pub tx_types: Vec<TransactionType>,
    #[serde(default)]
    pub statuses: Vec<TransactionStatus>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    /// Free-text search over the description, admin notes, order id and external reference.
    pub search: Option<String>,
}

impl TransactionQueryFilter {
    pub fn for_partner(partner_id: i64) -> Self {
        Self { partner_id: Some(partner_id), ..Default::default() }
    }

    pub fn with_type(mut self, tx_type: TransactionType) -> Self {
        self.tx_types.push(tx_type);
        self
    }

    pub fn with_status(mut self, status: TransactionStatus) -> Self {
        self.statuses.push(status);
        self
    }

    pub fn with_order_id(mut self, order_id: OrderId) -> Self {
        self.order_id = Some(order_id);
        self
    }

    pub fn since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    pub fn until(mut self, until: DateTime<Utc>) -> Self {
        self.until = Some(until);
        self
    }

    pub fn with_search<S: Into<String>>(mut self, text: S) -> Self {
        let text = text.into();
        if !text.trim().is_empty() {
            self.search = Some(text.trim().to_string());
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.partner_id.is_none() &&
            self.order_id.is_none() &&
            self.tx_types.is_empty() &&
            self.statuses.is_empty() &&
            self.since.is_none() &&
            self.until.is_none() &&
            self.search.is_none()
    }
}

/// One-based page selection. Only [`Pagination::new`] builds one, so the page size is always in range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Pagination {
    page: u32,
    page_size: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self { page: 1, page_size: DEFAULT_PAGE_SIZE }
    }
}

impl Pagination {
    /// Out-of-range values are clamped: page 0 becomes page 1, and the page size is kept between 1 and
    /// [`MAX_PAGE_SIZE`].
    pub fn new(page: u32, page_size: u32) -> Self {
        Self { page: page.max(1), page_size: page_size.clamp(1, MAX_PAGE_SIZE) }
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    pub fn limit(&self) -> i64 {
        i64::from(self.page_size)
    }

    pub fn offset(&self) -> i64 {
        i64::from(self.page.saturating_sub(1)) * i64::from(self.page_size)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionPage {
    pub transactions: Vec<CommissionTransaction>,
    pub total_count: i64,
    pub page: u32,
    pub page_size: u32,
}

impl TransactionPage {
    pub fn total_pages(&self) -> i64 {
        let size = i64::from(self.page_size.max(1));
        (self.total_count + size - 1) / size
    }

    pub fn has_more(&self) -> bool {
        i64::from(self.page) < self.total_pages()
    }
}

/// A partner's commission position at a point in time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommissionSummary {
    pub partner_id: i64,
    pub name: String,
    pub referral_code: ReferralCode,
    pub status: PartnerStatus,
    pub earned: Cents,
    pub paid: Cents,
    pub on_hold: Cents,
    pub available: Cents,
    pub withdrawable: Cents,
    /// `EARNED` and `BONUS` entries over the rolling reporting window.
    pub recent_earnings: Cents,
    pub lifetime_paid_out: Cents,
    pub referral_clicks: i64,
    pub referred_clients: i64,
    /// Referred clients per referral click. Zero when there have been no clicks.
    pub conversion_rate: f64,
    pub as_of: DateTime<Utc>,
}

/// Compares a partner's stored balance with the balance recomputed from its ledger history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerAudit {
    pub partner_id: i64,
    pub stored: CommissionBalance,
    pub recomputed: CommissionBalance,
    pub entries_checked: usize,
    /// Entries whose balance snapshots do not agree with their signed effect.
    pub inconsistent_entries: Vec<i64>,
}

impl LedgerAudit {
    pub fn balance_drift(&self) -> bool {
        self.stored != self.recomputed
    }

    pub fn is_consistent(&self) -> bool {
        !self.balance_drift() && self.inconsistent_entries.is_empty()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn pagination_is_clamped() {
        let p = Pagination::new(0, 0);
        assert_eq!((p.page(), p.page_size()), (1, 1));
        assert_eq!((p.limit(), p.offset()), (1, 0));
        let p = Pagination::new(3, u32::MAX);
        assert_eq!(p.page_size(), MAX_PAGE_SIZE);
        assert_eq!(p.offset(), 2 * i64::from(MAX_PAGE_SIZE));
        assert_eq!(Pagination::default().page_size(), DEFAULT_PAGE_SIZE);
    }
}
