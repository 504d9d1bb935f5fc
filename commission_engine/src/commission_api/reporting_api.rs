use std::fmt::Debug;

use chrono::{Duration, Utc};
use log::*;

use crate::{
    commission_api::{
        config::DEFAULT_REPORTING_WINDOW_DAYS,
        transaction_objects::{CommissionSummary, LedgerAudit, Pagination, TransactionPage, TransactionQueryFilter},
    },
    db_types::{AdjustmentType, Cents, CommissionTransaction, TransactionType},
    ledger::CommissionBalance,
    traits::{ReportingError, ReportingQueries},
};

/// Read-only views over partners and their ledgers.
pub struct ReportingApi<B> {
    db: B,
    window: Duration,
}

impl<B: Clone> Clone for ReportingApi<B> {
    fn clone(&self) -> Self {
        Self { db: self.db.clone(), window: self.window }
    }
}

impl<B> Debug for ReportingApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ReportingApi ({} day window)", self.window.num_days())
    }
}

impl<B> ReportingApi<B> {
    pub fn new(db: B) -> Self {
        Self { db, window: Duration::days(DEFAULT_REPORTING_WINDOW_DAYS) }
    }

    pub fn with_window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }
}

impl<B> ReportingApi<B>
where B: ReportingQueries
{
    pub async fn partner_summary(&self, partner_id: i64) -> Result<CommissionSummary, ReportingError> {
        let now = Utc::now();
        let snapshot = self
            .db
            .fetch_partner_snapshot(partner_id, now - self.window)
            .await?
            .ok_or(ReportingError::PartnerNotFound(partner_id))?;
        let partner = snapshot.partner;
        let balance = partner.balance;
        let summary = CommissionSummary {
            partner_id,
            name: partner.name,
            referral_code: partner.referral_code,
            status: partner.status,
            earned: balance.earned(),
            paid: balance.paid(),
            on_hold: balance.on_hold(),
            available: balance.available(),
            withdrawable: balance.withdrawable(),
            recent_earnings: snapshot.recent_earnings,
            lifetime_paid_out: snapshot.lifetime_paid_out,
            referral_clicks: partner.referral_clicks,
            referred_clients: snapshot.referred_clients,
            conversion_rate: conversion_rate(snapshot.referred_clients, partner.referral_clicks),
            as_of: now,
        };
        trace!("📊 Summary for partner #{partner_id}: {summary:?}");
        Ok(summary)
    }

    /// A page of ledger entries matching `filter`, newest first.
    pub async fn transaction_history(
        &self,
        filter: &TransactionQueryFilter,
        pagination: &Pagination,
    ) -> Result<TransactionPage, ReportingError> {
        if let (Some(since), Some(until)) = (filter.since, filter.until) {
            if since > until {
                return Err(ReportingError::InvalidQuery(format!("The date range {since} to {until} is empty")));
            }
        }
        let page = self.db.search_transactions(filter, pagination).await?;
        debug!(
            "📊 Transaction search returned {} of {} entries (page {})",
            page.transactions.len(),
            page.total_count,
            page.page
        );
        Ok(page)
    }

    pub async fn transaction(&self, id: i64) -> Result<CommissionTransaction, ReportingError> {
        self.db.fetch_transaction_by_id(id).await?.ok_or(ReportingError::TransactionNotFound(id))
    }

    /// Recomputes the partner's balance from its ledger and compares it with the stored balance.
    pub async fn audit_partner(&self, partner_id: i64) -> Result<LedgerAudit, ReportingError> {
        let (partner, history) =
            self.db.fetch_partner_history(partner_id).await?.ok_or(ReportingError::PartnerNotFound(partner_id))?;
        let recomputed = recompute_balance(&history);
        let inconsistent_entries =
            history.iter().filter(|t| !t.snapshots_are_consistent()).map(|t| t.id).collect::<Vec<i64>>();
        let audit = LedgerAudit {
            partner_id,
            stored: partner.balance,
            recomputed,
            entries_checked: history.len(),
            inconsistent_entries,
        };
        if audit.balance_drift() {
            error!(
                "📊 Balance drift for partner #{partner_id}. Stored: {:?}. Recomputed from {} entries: {:?}",
                audit.stored, audit.entries_checked, audit.recomputed
            );
        }
        if !audit.inconsistent_entries.is_empty() {
            let ids = &audit.inconsistent_entries;
            error!("📊 Entries with inconsistent snapshots for partner #{partner_id}: {ids:?}");
        }
        Ok(audit)
    }
}

fn conversion_rate(referred_clients: i64, referral_clicks: i64) -> f64 {
    if referral_clicks <= 0 {
        0.0
    } else {
        referred_clients as f64 / referral_clicks as f64
    }
}

/// Replays a partner's ledger to rebuild its balance fields. A cancelled payout contributes nothing to the paid total,
/// since cancelling it reversed its effect.
pub fn recompute_balance(history: &[CommissionTransaction]) -> CommissionBalance {
    let mut earned = Cents::zero();
    let mut paid = Cents::zero();
    let mut on_hold = Cents::zero();
    for entry in history {
        match (entry.tx_type, entry.adjustment_type) {
            (TransactionType::Adjusted, Some(AdjustmentType::Deduct)) => earned -= entry.amount,
            (TransactionType::Earned | TransactionType::Bonus | TransactionType::Adjusted, _) => earned += entry.amount,
            (TransactionType::PaidOut, _) if entry.is_cancelled() => {},
            (TransactionType::PaidOut, _) => paid += entry.amount,
            (TransactionType::Hold, _) => on_hold += entry.amount,
            (TransactionType::HoldReleased, _) => on_hold -= entry.amount,
        }
    }
    CommissionBalance::from_parts(earned, paid, on_hold)
}

#[cfg(test)]
mod test {
    use chrono::Utc;
    use sqlx::types::Json;

    use super::*;
    use crate::db_types::TransactionStatus;

    fn entry(
        id: i64,
        tx_type: TransactionType,
        adjustment: Option<AdjustmentType>,
        amount: i64,
    ) -> CommissionTransaction {
        let now = Utc::now();
        CommissionTransaction {
            id,
            partner_id: 1,
            order_id: None,
            amount: Cents::from(amount),
            tx_type,
            status: TransactionStatus::Completed,
            adjustment_type: adjustment,
            description: String::new(),
            admin_notes: None,
            admin_id: None,
            payment_method: None,
            external_reference: None,
            balance_before: Cents::zero(),
            balance_after: Cents::zero(),
            related_transaction_id: None,
            hold_until: None,
            metadata: Json(serde_json::Value::Null),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn replaying_the_ledger() {
        let mut cancelled_payout = entry(5, TransactionType::PaidOut, None, 500);
        cancelled_payout.status = TransactionStatus::Cancelled;
        let history = vec![
            entry(1, TransactionType::Earned, None, 10_000),
            entry(2, TransactionType::Adjusted, Some(AdjustmentType::Deduct), 1_000),
            entry(3, TransactionType::Bonus, Some(AdjustmentType::Bonus), 2_000),
            entry(4, TransactionType::PaidOut, None, 3_000),
            cancelled_payout,
            entry(6, TransactionType::Hold, Some(AdjustmentType::Hold), 4_000),
            entry(7, TransactionType::HoldReleased, Some(AdjustmentType::ReleaseHold), 4_000),
            entry(8, TransactionType::Hold, Some(AdjustmentType::Hold), 1_500),
        ];
        let balance = recompute_balance(&history);
        assert_eq!(balance.earned(), Cents::from(11_000));
        assert_eq!(balance.paid(), Cents::from(3_000));
        assert_eq!(balance.on_hold(), Cents::from(1_500));
        assert_eq!(balance.available(), Cents::from(6_500));
    }

    #[test]
    fn conversion_rate_without_clicks_is_zero() {
        assert_eq!(conversion_rate(3, 0), 0.0);
        assert_eq!(conversion_rate(1, 4), 0.25);
    }
}
