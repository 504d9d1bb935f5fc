use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::{
    commission_api::transaction_objects::{Pagination, TransactionPage, TransactionQueryFilter},
    db_types::{Cents, CommissionTransaction, Partner},
};

#[derive(Debug, Clone, Error)]
pub enum ReportingError {
    #[error("Partner #{0} does not exist.")]
    PartnerNotFound(i64),
    #[error("Transaction #{0} does not exist.")]
    TransactionNotFound(i64),
    #[error("Invalid query. {0}")]
    InvalidQuery(String),
    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<sqlx::Error> for ReportingError {
    fn from(e: sqlx::Error) -> Self {
        ReportingError::DatabaseError(e.to_string())
    }
}

/// Everything needed to build a partner summary, read from a single snapshot.
#[derive(Debug, Clone)]
pub struct PartnerSnapshot {
    pub partner: Partner,
    /// `EARNED` and `BONUS` entries created since the window start.
    pub recent_earnings: Cents,
    /// `PAID_OUT` entries that have not been cancelled.
    pub lifetime_paid_out: Cents,
    pub referred_clients: i64,
}

/// Read-only queries over the ledger. Implementations must never write.
#[allow(async_fn_in_trait)]
pub trait ReportingQueries {
    async fn fetch_partner_snapshot(
        &self,
        partner_id: i64,
        window_start: DateTime<Utc>,
    ) -> Result<Option<PartnerSnapshot>, ReportingError>;

    /// Transactions matching `filter`, newest first.
    async fn search_transactions(
        &self,
        filter: &TransactionQueryFilter,
        pagination: &Pagination,
    ) -> Result<TransactionPage, ReportingError>;

    async fn fetch_transaction_by_id(&self, id: i64) -> Result<Option<CommissionTransaction>, ReportingError>;

    /// The partner and its full ledger history, oldest first, read from a single snapshot.
    async fn fetch_partner_history(
        &self,
        partner_id: i64,
    ) -> Result<Option<(Partner, Vec<CommissionTransaction>)>, ReportingError>;
}
