//! `SqliteDatabase` is the SQLite implementation of the commission engine's record store.
//!
//! It implements all the traits defined in the [`crate::traits`] module. Every ledger method opens its own atomic
//! transaction, reads the partner inside it, validates the change with [`CommissionBalance::apply`] and writes the new
//! balance and the ledger entry before committing. Dropping the transaction on any early return rolls everything back.
//!
//! Only the work before the commit is bounded by the write deadline. A write that times out has written nothing, and a
//! write whose commit has been sent always runs to completion.
use std::{fmt::Debug, future::Future, time::Duration};

use chrono::{DateTime, Utc};
use log::*;
use serde_json::json;
use sqlx::{migrate::MigrateError, Sqlite, SqliteConnection, SqlitePool, Transaction};

use super::db::{clients, db_url, new_pool, orders, orders::Linkage, partners, transactions};
use crate::{
    commission_api::{
        config::DEFAULT_TRANSACTION_TIMEOUT,
        transaction_objects::{Pagination, TransactionPage, TransactionQueryFilter},
    },
    db_types::{
        AdjustmentType,
        Client,
        CommissionRate,
        CommissionTransaction,
        NewCommissionTransaction,
        NewOrder,
        NewPartner,
        Order,
        OrderId,
        OrderStatusType,
        Partner,
        PartnerStatus,
        ReferralCode,
        TransactionStatus,
        TransactionType,
    },
    ledger::{BalanceChange, BalanceEffect, CommissionBalance},
    traits::{
        AdjustmentRequest,
        CommissionLedgerDatabase,
        HoldRequest,
        InsertOrderResult,
        LedgerError,
        LedgerUpdate,
        OrderFlowError,
        OrderManagement,
        PartnerApiError,
        PartnerManagement,
        PartnerSnapshot,
        PayoutRequest,
        ReleaseHoldRequest,
        ReportingError,
        ReportingQueries,
        StatusCorrection,
        TransactionStatusChange,
    },
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
    write_timeout: Duration,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl CommissionLedgerDatabase for SqliteDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn earn_commission_for_order(&self, order_id: &OrderId) -> Result<Option<LedgerUpdate>, LedgerError> {
        let (tx, update) = self
            .before_commit(async {
                let mut tx = self.pool.begin().await?;
                let update = earn_for_order(order_id, &mut tx).await?;
                Ok::<_, LedgerError>((tx, update))
            })
            .await?;
        tx.commit().await?;
        if let Some(update) = &update {
            let t = &update.transaction;
            info!("🧾 Partner #{} earned {} on order {order_id}", t.partner_id, t.amount);
        }
        Ok(update)
    }

    async fn pay_out_commission(&self, request: &PayoutRequest) -> Result<LedgerUpdate, LedgerError> {
        let (tx, update) = self
            .before_commit(async {
                let mut tx = self.pool.begin().await?;
                let update = pay_out(request, &mut tx).await?;
                Ok::<_, LedgerError>((tx, update))
            })
            .await?;
        tx.commit().await?;
        info!("🧾 Paid out {} to partner #{} (entry #{})", request.amount, request.partner_id, update.transaction.id);
        Ok(update)
    }

    async fn adjust_commission(&self, request: &AdjustmentRequest) -> Result<LedgerUpdate, LedgerError> {
        let (tx, update) = self
            .before_commit(async {
                let mut tx = self.pool.begin().await?;
                let update = adjust(request, &mut tx).await?;
                Ok::<_, LedgerError>((tx, update))
            })
            .await?;
        tx.commit().await?;
        info!(
            "🧾 {} adjustment of {} applied to partner #{} by {}",
            request.adjustment_type, request.amount, request.partner_id, request.admin_id
        );
        Ok(update)
    }

    async fn place_hold(&self, request: &HoldRequest) -> Result<LedgerUpdate, LedgerError> {
        let (tx, update) = self
            .before_commit(async {
                let mut tx = self.pool.begin().await?;
                let update = hold(request, &mut tx).await?;
                Ok::<_, LedgerError>((tx, update))
            })
            .await?;
        tx.commit().await?;
        let (hold_id, partner_id) = (update.transaction.id, request.partner_id);
        info!("🧾 {} of partner #{partner_id}'s commission placed on hold (entry #{hold_id})", request.amount);
        Ok(update)
    }

    async fn release_hold(&self, request: &ReleaseHoldRequest) -> Result<LedgerUpdate, LedgerError> {
        let (tx, update) = self
            .before_commit(async {
                let mut tx = self.pool.begin().await?;
                let update = release(request, &mut tx).await?;
                Ok::<_, LedgerError>((tx, update))
            })
            .await?;
        tx.commit().await?;
        let t = &update.transaction;
        info!(
            "🧾 Hold #{} of {} released for partner #{} by {}",
            request.hold_transaction_id, t.amount, t.partner_id, request.admin_id
        );
        Ok(update)
    }

    async fn update_transaction_status(
        &self,
        correction: &StatusCorrection,
    ) -> Result<TransactionStatusChange, LedgerError> {
        let (tx, change) = self
            .before_commit(async {
                let mut tx = self.pool.begin().await?;
                let change = correct_status(correction, &mut tx).await?;
                Ok::<_, LedgerError>((tx, change))
            })
            .await?;
        tx.commit().await?;
        let t = &change.transaction;
        if change.payout_reversed {
            info!("🧾 Payout #{} of {} to partner #{} cancelled and reversed", t.id, t.amount, t.partner_id);
        } else {
            info!("🧾 Entry #{} moved from {} to {}", t.id, change.old_status, t.status);
        }
        Ok(change)
    }

    async fn fetch_transaction(&self, id: i64) -> Result<Option<CommissionTransaction>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let tx = transactions::fetch_transaction(id, &mut conn).await?;
        Ok(tx)
    }

    async fn fetch_partner_balance(&self, partner_id: i64) -> Result<CommissionBalance, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let partner = fetch_partner(partner_id, &mut conn).await?;
        Ok(partner.balance)
    }

    async fn fetch_expired_holds(&self, now: DateTime<Utc>) -> Result<Vec<CommissionTransaction>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let holds = transactions::fetch_expired_holds(now, &mut conn).await?;
        Ok(holds)
    }

    async fn close(&mut self) -> Result<(), LedgerError> {
        self.pool.close().await;
        Ok(())
    }
}

/// Fetches the partner inside the current transaction, failing if it does not exist.
async fn fetch_partner(partner_id: i64, conn: &mut SqliteConnection) -> Result<Partner, LedgerError> {
    partners::fetch_partner(partner_id, conn).await?.ok_or(LedgerError::PartnerNotFound(partner_id))
}

async fn earn_for_order(
    order_id: &OrderId,
    conn: &mut SqliteConnection,
) -> Result<Option<LedgerUpdate>, LedgerError> {
    let order = orders::fetch_order_by_order_id(order_id, conn)
        .await?
        .ok_or_else(|| LedgerError::OrderNotFound(order_id.clone()))?;
    if order.commission_processed {
        debug!("🧾 Commission for order {order_id} has already been processed. Nothing to do");
        return Ok(None);
    }
    if order.status != OrderStatusType::Paid {
        let reason = format!("The order is {}, not PAID.", order.status);
        return Err(LedgerError::NotEligible(order_id.clone(), reason));
    }
    let partner_id = match (order.attribution_resolved, order.attributed_partner_id) {
        (true, Some(id)) => id,
        (true, None) => {
            return Err(LedgerError::NotEligible(order_id.clone(), "The order has no eligible referral.".into()))
        },
        (false, _) => {
            let reason = "Attribution has not been resolved for this order.".to_string();
            return Err(LedgerError::NotEligible(order_id.clone(), reason));
        },
    };
    let partner = fetch_partner(partner_id, conn).await?;
    let rate = partner.commission_rate;
    let commission = rate.commission_for(order.original_price);
    if !orders::mark_commission_processed(order_id, conn).await? {
        debug!("🧾 Order {order_id} was processed concurrently. Nothing to do");
        return Ok(None);
    }
    if commission.is_zero() {
        info!("🧾 Commission on order {order_id} for partner #{partner_id} is zero. Order marked as processed");
        return Ok(None);
    }
    let change = partner.balance.apply(BalanceEffect::Earn(commission))?;
    let description = format!("Commission on order {order_id} ({rate} of {})", order.original_price);
    let mut entry = NewCommissionTransaction::new(partner_id, TransactionType::Earned, commission, description);
    entry.order_id = Some(order_id.clone());
    entry.metadata = json!({
        "order_price": order.original_price.value(),
        "currency": order.currency,
        "commission_rate_bps": rate.bps(),
    });
    let update = record_change(&partner, change, entry, TransactionStatus::Completed, conn).await?;
    Ok(Some(update))
}

async fn pay_out(request: &PayoutRequest, conn: &mut SqliteConnection) -> Result<LedgerUpdate, LedgerError> {
    let partner = fetch_partner(request.partner_id, conn).await?;
    let change = partner.balance.apply(BalanceEffect::Payout(request.amount))?;
    let description = match &request.payment_method {
        Some(method) => format!("Commission payout via {method}"),
        None => "Commission payout".to_string(),
    };
    let mut entry = NewCommissionTransaction::new(partner.id, TransactionType::PaidOut, request.amount, description);
    entry.admin_id = Some(request.admin_id.clone());
    entry.admin_notes = request.notes.clone();
    entry.payment_method = request.payment_method.clone();
    entry.external_reference = request.external_reference.clone();
    record_change(&partner, change, entry, TransactionStatus::Completed, conn).await
}

async fn adjust(request: &AdjustmentRequest, conn: &mut SqliteConnection) -> Result<LedgerUpdate, LedgerError> {
    let effect = match request.adjustment_type {
        AdjustmentType::Add | AdjustmentType::Bonus => BalanceEffect::Credit(request.amount),
        AdjustmentType::Deduct => BalanceEffect::Deduct(request.amount),
        other => {
            return Err(LedgerError::InvalidRequest(format!(
                "{other} adjustments must be applied as holds or hold releases"
            )))
        },
    };
    let partner = fetch_partner(request.partner_id, conn).await?;
    let change = partner.balance.apply(effect)?;
    let tx_type = request.adjustment_type.transaction_type();
    let mut entry = NewCommissionTransaction::new(partner.id, tx_type, request.amount, request.reason.clone());
    entry.adjustment_type = Some(request.adjustment_type);
    entry.order_id = request.reference_order_id.clone();
    entry.admin_id = Some(request.admin_id.clone());
    entry.admin_notes = request.notes.clone();
    record_change(&partner, change, entry, TransactionStatus::Completed, conn).await
}

async fn hold(request: &HoldRequest, conn: &mut SqliteConnection) -> Result<LedgerUpdate, LedgerError> {
    let partner = fetch_partner(request.partner_id, conn).await?;
    let change = partner.balance.apply(BalanceEffect::Hold(request.amount))?;
    let mut entry =
        NewCommissionTransaction::new(partner.id, TransactionType::Hold, request.amount, request.reason.clone());
    entry.adjustment_type = Some(AdjustmentType::Hold);
    entry.order_id = request.reference_order_id.clone();
    entry.admin_id = Some(request.admin_id.clone());
    entry.admin_notes = request.notes.clone();
    entry.hold_until = request.hold_until;
    record_change(&partner, change, entry, TransactionStatus::OnHold, conn).await
}

async fn release(request: &ReleaseHoldRequest, conn: &mut SqliteConnection) -> Result<LedgerUpdate, LedgerError> {
    let hold_id = request.hold_transaction_id;
    let hold = transactions::fetch_transaction(hold_id, conn)
        .await?
        .filter(|t| t.tx_type == TransactionType::Hold)
        .ok_or(LedgerError::HoldNotFound(hold_id))?;
    if let Some(partner_id) = request.partner_id {
        if hold.partner_id != partner_id {
            let msg = format!("Hold #{hold_id} does not belong to partner #{partner_id}");
            return Err(LedgerError::InvalidRequest(msg));
        }
    }
    if let Some(amount) = request.expected_amount {
        if amount != hold.amount {
            let msg = format!("Hold #{hold_id} is for {}, not {amount}", hold.amount);
            return Err(LedgerError::InvalidRequest(msg));
        }
    }
    if let Some(release) = transactions::fetch_release_for_hold(hold_id, conn).await? {
        debug!("🧾 Hold #{hold_id} was already released by entry #{}", release.id);
        return Err(LedgerError::HoldAlreadyReleased(hold_id));
    }
    let partner = fetch_partner(hold.partner_id, conn).await?;
    let change = partner.balance.apply(BalanceEffect::ReleaseHold(hold.amount))?;
    let description = request.reason.clone().unwrap_or_else(|| format!("Release of hold #{hold_id}"));
    let mut entry = NewCommissionTransaction::new(partner.id, TransactionType::HoldReleased, hold.amount, description);
    entry.adjustment_type = Some(AdjustmentType::ReleaseHold);
    entry.order_id = hold.order_id.clone();
    entry.admin_id = Some(request.admin_id.clone());
    entry.related_transaction_id = Some(hold_id);
    let update = record_change(&partner, change, entry, TransactionStatus::Completed, conn).await?;
    if hold.status == TransactionStatus::OnHold {
        let note = format!("Released by entry #{}", update.transaction.id);
        transactions::update_status(hold_id, TransactionStatus::Completed, None, &note, conn).await?;
    }
    Ok(update)
}

async fn correct_status(
    correction: &StatusCorrection,
    conn: &mut SqliteConnection,
) -> Result<TransactionStatusChange, LedgerError> {
    let id = correction.transaction_id;
    let new_status = correction.new_status;
    let entry = transactions::fetch_transaction(id, conn).await?.ok_or(LedgerError::TransactionNotFound(id))?;
    let old_status = entry.status;
    if old_status == new_status {
        return Err(LedgerError::StatusUnchanged { id, status: old_status });
    }
    if old_status == TransactionStatus::Cancelled {
        return Err(LedgerError::InvalidStatusTransition { id, from: old_status, to: new_status });
    }
    let partner = fetch_partner(entry.partner_id, conn).await?;
    let payout_reversed = entry.tx_type == TransactionType::PaidOut && new_status == TransactionStatus::Cancelled;
    let balance = if payout_reversed {
        let change = partner.balance.apply(BalanceEffect::ReversePayout(entry.amount))?;
        if !partners::write_balance(partner.id, partner.version, &change.after, conn).await? {
            return Err(LedgerError::Conflict(partner.id));
        }
        change.after
    } else {
        partner.balance
    };
    let mut note = format!(
        "[{}] Status changed from {old_status} to {new_status} by {}",
        Utc::now().format("%Y-%m-%d %H:%M:%S"),
        correction.admin_id
    );
    if let Some(notes) = correction.notes.as_ref().filter(|n| !n.trim().is_empty()) {
        note.push_str(": ");
        note.push_str(notes.trim());
    }
    let transaction = transactions::update_status(id, new_status, Some(&correction.admin_id), &note, conn).await?;
    Ok(TransactionStatusChange { old_status, transaction, balance, payout_reversed })
}

/// Writes the new balance, guarded by the version the partner was read at, and appends the ledger entry that
/// describes the change.
async fn record_change(
    partner: &Partner,
    change: BalanceChange,
    mut entry: NewCommissionTransaction,
    status: TransactionStatus,
    conn: &mut SqliteConnection,
) -> Result<LedgerUpdate, LedgerError> {
    entry.balance_before = change.available_before();
    entry.balance_after = change.available_after();
    if !partners::write_balance(partner.id, partner.version, &change.after, conn).await? {
        warn!("🧾 Partner #{} was modified since it was read at version {}", partner.id, partner.version);
        return Err(LedgerError::Conflict(partner.id));
    }
    let transaction = transactions::insert_transaction(entry, status, conn).await?;
    Ok(LedgerUpdate::new(transaction, change.after))
}

impl PartnerManagement for SqliteDatabase {
    async fn insert_partner(
        &self,
        partner: NewPartner,
        rate: CommissionRate,
        code: ReferralCode,
    ) -> Result<Partner, PartnerApiError> {
        let mut tx = self.pool.begin().await?;
        if partners::fetch_partner_by_email(&partner.email, &mut tx).await?.is_some() {
            return Err(PartnerApiError::EmailAlreadyRegistered(partner.email));
        }
        if partners::fetch_partner_by_referral_code(&code, &mut tx).await?.is_some() {
            return Err(PartnerApiError::ReferralCodeCollision(code));
        }
        let partner = partners::insert_partner(&partner, rate, &code, &mut tx).await?;
        tx.commit().await?;
        Ok(partner)
    }

    async fn fetch_partner(&self, partner_id: i64) -> Result<Option<Partner>, PartnerApiError> {
        let mut conn = self.pool.acquire().await?;
        let partner = partners::fetch_partner(partner_id, &mut conn).await?;
        Ok(partner)
    }

    async fn fetch_partner_by_email(&self, email: &str) -> Result<Option<Partner>, PartnerApiError> {
        let mut conn = self.pool.acquire().await?;
        let partner = partners::fetch_partner_by_email(email, &mut conn).await?;
        Ok(partner)
    }

    async fn fetch_partner_by_referral_code(&self, code: &ReferralCode) -> Result<Option<Partner>, PartnerApiError> {
        let mut conn = self.pool.acquire().await?;
        let partner = partners::fetch_partner_by_referral_code(code, &mut conn).await?;
        Ok(partner)
    }

    async fn fetch_partners(&self, status: Option<PartnerStatus>) -> Result<Vec<Partner>, PartnerApiError> {
        let mut conn = self.pool.acquire().await?;
        let partners = partners::fetch_partners(status, &mut conn).await?;
        Ok(partners)
    }

    async fn update_partner_status(&self, partner_id: i64, status: PartnerStatus) -> Result<Partner, PartnerApiError> {
        let mut tx = self.pool.begin().await?;
        let partner = partners::fetch_partner(partner_id, &mut tx)
            .await?
            .ok_or_else(|| PartnerApiError::PartnerNotFound(format!("#{partner_id}")))?;
        if !partner.status.can_transition_to(status) {
            return Err(PartnerApiError::InvalidStatusTransition { id: partner_id, from: partner.status, to: status });
        }
        let partner = partners::update_status(partner_id, status, &mut tx).await?;
        tx.commit().await?;
        Ok(partner)
    }

    async fn update_commission_rate(&self, partner_id: i64, rate: CommissionRate) -> Result<Partner, PartnerApiError> {
        let mut conn = self.pool.acquire().await?;
        partners::update_commission_rate(partner_id, rate, &mut conn)
            .await?
            .ok_or_else(|| PartnerApiError::PartnerNotFound(format!("#{partner_id}")))
    }

    async fn record_referral_click(&self, code: &ReferralCode) -> Result<Partner, PartnerApiError> {
        let mut conn = self.pool.acquire().await?;
        partners::increment_referral_clicks(code, &mut conn)
            .await?
            .ok_or_else(|| PartnerApiError::UnknownReferralCode(code.to_string()))
    }

    async fn insert_client(
        &self,
        code: &ReferralCode,
        email: &str,
        referred_at: DateTime<Utc>,
    ) -> Result<Client, PartnerApiError> {
        let mut tx = self.pool.begin().await?;
        let partner = partners::fetch_partner_by_referral_code(code, &mut tx)
            .await?
            .ok_or_else(|| PartnerApiError::UnknownReferralCode(code.to_string()))?;
        if !partner.is_active() {
            return Err(PartnerApiError::PartnerNotActive(partner.id));
        }
        if clients::fetch_client_by_email(email, &mut tx).await?.is_some() {
            return Err(PartnerApiError::ClientAlreadyExists(email.to_string()));
        }
        let client = clients::insert_client(email, partner.id, referred_at, &mut tx).await?;
        tx.commit().await?;
        Ok(client)
    }

    async fn fetch_client_by_email(&self, email: &str) -> Result<Option<Client>, PartnerApiError> {
        let mut conn = self.pool.acquire().await?;
        let client = clients::fetch_client_by_email(email, &mut conn).await?;
        Ok(client)
    }
}

impl OrderManagement for SqliteDatabase {
    async fn insert_order(&self, order: NewOrder) -> Result<InsertOrderResult, OrderFlowError> {
        let mut tx = self.pool.begin().await?;
        if let Some(existing) = orders::fetch_order_by_order_id(&order.order_id, &mut tx).await? {
            return Ok(InsertOrderResult::AlreadyExists(existing));
        }
        let linkage = resolve_linkage(&order, &mut tx).await?;
        let (order, inserted) = orders::idempotent_insert(&order, linkage, &mut tx).await?;
        tx.commit().await?;
        if inserted {
            Ok(InsertOrderResult::Inserted(order))
        } else {
            Ok(InsertOrderResult::AlreadyExists(order))
        }
    }

    async fn fetch_order(&self, order_id: &OrderId) -> Result<Option<Order>, OrderFlowError> {
        let mut conn = self.pool.acquire().await?;
        let order = orders::fetch_order_by_order_id(order_id, &mut conn).await?;
        Ok(order)
    }

    async fn update_order_status(&self, order_id: &OrderId, status: OrderStatusType) -> Result<Order, OrderFlowError> {
        let mut tx = self.pool.begin().await?;
        let order = orders::fetch_order_by_order_id(order_id, &mut tx)
            .await?
            .ok_or_else(|| OrderFlowError::OrderNotFound(order_id.clone()))?;
        if order.status == status {
            trace!("🔗 Order {order_id} is already {status}");
            return Ok(order);
        }
        if order.status == OrderStatusType::Paid {
            return Err(OrderFlowError::InvalidOrderTransition {
                order_id: order_id.clone(),
                from: order.status,
                to: status,
            });
        }
        let order = orders::update_order_status(order_id, status, &mut tx).await?;
        tx.commit().await?;
        Ok(order)
    }

    async fn stamp_attribution(&self, order_id: &OrderId, partner_id: Option<i64>) -> Result<Order, OrderFlowError> {
        let mut tx = self.pool.begin().await?;
        let stamped = orders::stamp_attribution(order_id, partner_id, &mut tx).await?;
        let order = orders::fetch_order_by_order_id(order_id, &mut tx)
            .await?
            .ok_or_else(|| OrderFlowError::OrderNotFound(order_id.clone()))?;
        tx.commit().await?;
        if !stamped {
            trace!("🔗 Order {order_id} already carried an attribution stamp");
        }
        Ok(order)
    }
}

/// Finds the referral linkage for a new order: its own referral code first, then the referred client with the same
/// email.
async fn resolve_linkage(order: &NewOrder, conn: &mut SqliteConnection) -> Result<Linkage, sqlx::Error> {
    if let Some(code) = order.referral_code.as_deref().filter(|c| !c.trim().is_empty()) {
        let code = ReferralCode::normalized(code);
        match partners::fetch_partner_by_referral_code(&code, conn).await? {
            Some(partner) => {
                return Ok(Linkage { partner_id: Some(partner.id), referred_at: Some(order.created_at) });
            },
            None => warn!("🔗 Order {} carries unknown referral code {code}. Ignoring it", order.order_id),
        }
    }
    if let Some(email) = order.client_email.as_deref() {
        if let Some(client) = clients::fetch_client_by_email(email, conn).await? {
            trace!("🔗 Order {} was placed by referred client #{}", order.order_id, client.id);
            return Ok(Linkage { partner_id: Some(client.referred_by), referred_at: Some(client.referred_at) });
        }
    }
    Ok(Linkage::default())
}

impl ReportingQueries for SqliteDatabase {
    async fn fetch_partner_snapshot(
        &self,
        partner_id: i64,
        window_start: DateTime<Utc>,
    ) -> Result<Option<PartnerSnapshot>, ReportingError> {
        let mut tx = self.pool.begin().await?;
        let partner = match partners::fetch_partner(partner_id, &mut tx).await? {
            Some(p) => p,
            None => return Ok(None),
        };
        let earning_types = [TransactionType::Earned, TransactionType::Bonus];
        let recent_earnings =
            transactions::sum_amounts(partner_id, &earning_types, None, Some(window_start), &mut tx).await?;
        let lifetime_paid_out = transactions::sum_amounts(
            partner_id,
            &[TransactionType::PaidOut],
            Some(TransactionStatus::Cancelled),
            None,
            &mut tx,
        )
        .await?;
        let referred_clients = clients::count_referred_clients(partner_id, &mut tx).await?;
        tx.commit().await?;
        Ok(Some(PartnerSnapshot { partner, recent_earnings, lifetime_paid_out, referred_clients }))
    }

    async fn search_transactions(
        &self,
        filter: &TransactionQueryFilter,
        pagination: &Pagination,
    ) -> Result<TransactionPage, ReportingError> {
        let mut tx = self.pool.begin().await?;
        let (transactions, total_count) = transactions::search_transactions(filter, pagination, &mut tx).await?;
        tx.commit().await?;
        Ok(TransactionPage { transactions, total_count, page: pagination.page(), page_size: pagination.page_size() })
    }

    async fn fetch_transaction_by_id(&self, id: i64) -> Result<Option<CommissionTransaction>, ReportingError> {
        let mut conn = self.pool.acquire().await?;
        let tx = transactions::fetch_transaction(id, &mut conn).await?;
        Ok(tx)
    }

    async fn fetch_partner_history(
        &self,
        partner_id: i64,
    ) -> Result<Option<(Partner, Vec<CommissionTransaction>)>, ReportingError> {
        let mut tx = self.pool.begin().await?;
        let partner = match partners::fetch_partner(partner_id, &mut tx).await? {
            Some(p) => p,
            None => return Ok(None),
        };
        let history = transactions::fetch_partner_history(partner_id, &mut tx).await?;
        tx.commit().await?;
        Ok(Some((partner, history)))
    }
}

impl SqliteDatabase {
    /// Creates a new database API object using the URL in `CMS_DATABASE_URL`.
    pub async fn new(max_connections: u32) -> Result<Self, sqlx::Error> {
        let url = db_url();
        SqliteDatabase::new_with_url(url.as_str(), max_connections).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        trace!("🧾 Creating new database connection pool with url {url}");
        let pool = new_pool(url, max_connections).await?;
        let url = url.to_string();
        Ok(Self { url, pool, write_timeout: DEFAULT_TRANSACTION_TIMEOUT })
    }

    /// Sets the deadline for the work a ledger write does before it commits.
    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Bounds the uncommitted part of a ledger write by the write deadline. The caller commits the returned
    /// transaction outside the deadline, so a commit that has been sent is never abandoned. A timeout therefore drops
    /// an uncommitted transaction, which rolls it back.
    async fn before_commit<T, F>(&self, work: F) -> Result<(Transaction<'static, Sqlite>, T), LedgerError>
    where F: Future<Output = Result<(Transaction<'static, Sqlite>, T), LedgerError>> {
        match tokio::time::timeout(self.write_timeout, work).await {
            Ok(result) => result,
            Err(_) => {
                let millis = u64::try_from(self.write_timeout.as_millis()).unwrap_or(u64::MAX);
                warn!("🧾 A ledger write did not reach its commit within {millis} ms and was rolled back");
                Err(LedgerError::Timeout(millis))
            },
        }
    }

    /// Brings the schema up to date with the migrations embedded in this crate.
    pub async fn run_migrations(&self) -> Result<(), MigrateError> {
        sqlx::migrate!("./src/sqlite/migrations").run(&self.pool).await?;
        info!("🧾 Migrations complete");
        Ok(())
    }

    /// Returns a reference to the database connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}
