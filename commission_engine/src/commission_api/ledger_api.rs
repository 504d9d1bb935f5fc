use std::{fmt::Debug, future::Future, str::FromStr};

use chrono::{DateTime, Utc};
use log::*;

use crate::{
    commission_api::config::LedgerConfig,
    db_types::{AdjustmentType, AdminId, Cents, Order, TransactionType},
    events::{
        CommissionEarnedEvent,
        EventProducers,
        LedgerAdjustedEvent,
        PayoutCompletedEvent,
        TransactionStatusChangedEvent,
    },
    ledger::{CommissionBalance, PartnerGuard, PartnerLocks},
    traits::{
        AdjustmentRequest,
        CommissionLedgerDatabase,
        HoldReleaseResult,
        HoldRequest,
        LedgerError,
        LedgerUpdate,
        PayoutRequest,
        ReleaseHoldRequest,
        StatusCorrection,
        TransactionStatusChange,
    },
};

/// `LedgerApi` is the commission ledger engine: the single choke point through which partner balances change.
///
/// Each operation validates its request, then runs the matching record-store transaction while holding the partner's
/// in-process lock. The wait for the lock is bounded by [`LedgerConfig::transaction_timeout`]; the store bounds its
/// own work up to the commit. Transient failures (version conflicts, timeouts, a busy store) are retried up to
/// [`LedgerConfig::max_retries`] times with a linear backoff. Business-rule rejections are returned straight away.
///
/// Events are published only after the store transaction has committed.
pub struct LedgerApi<B> {
    db: B,
    locks: PartnerLocks,
    config: LedgerConfig,
    producers: EventProducers,
}

impl<B: Clone> Clone for LedgerApi<B> {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
            locks: self.locks.clone(),
            config: self.config,
            producers: self.producers.clone(),
        }
    }
}

impl<B> Debug for LedgerApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "LedgerApi ({:?})", self.config)
    }
}

impl<B> LedgerApi<B> {
    pub fn new(db: B, producers: EventProducers) -> Self {
        Self { db, locks: PartnerLocks::new(), config: LedgerConfig::default(), producers }
    }

    pub fn with_config(mut self, config: LedgerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn db(&self) -> &B {
        &self.db
    }

    pub fn db_mut(&mut self) -> &mut B {
        &mut self.db
    }
}

impl<B> LedgerApi<B>
where B: CommissionLedgerDatabase
{
    /// Credits the commission for a paid, attributed order. Returns `None` if the order has been processed already,
    /// or if the commission is zero.
    pub async fn earn_commission(&self, order: &Order) -> Result<Option<LedgerUpdate>, LedgerError> {
        let partner_id = order.attributed_partner_id.ok_or_else(|| {
            LedgerError::NotEligible(order.order_id.clone(), "The order is not attributed to a partner.".into())
        })?;
        let result =
            self.with_retry(partner_id, "earn", || self.db.earn_commission_for_order(&order.order_id)).await?;
        if let Some(update) = &result {
            let event = CommissionEarnedEvent::new(order.order_id.clone(), update.clone());
            for producer in &self.producers.commission_earned_producer {
                producer.publish_event(event.clone()).await;
            }
        }
        Ok(result)
    }

    pub async fn pay_out(&self, request: PayoutRequest) -> Result<LedgerUpdate, LedgerError> {
        validate_admin(&request.admin_id)?;
        validate_amount(request.amount)?;
        let update = self.with_retry(request.partner_id, "payout", || self.db.pay_out_commission(&request)).await?;
        for producer in &self.producers.payout_completed_producer {
            producer.publish_event(PayoutCompletedEvent::from(update.clone())).await;
        }
        Ok(update)
    }

    /// Applies a manual adjustment. `HOLD` and `RELEASE_HOLD` adjustments are delegated to [`Self::place_hold`] and
    /// [`Self::release_hold`].
    pub async fn adjust(&self, request: AdjustmentRequest) -> Result<LedgerUpdate, LedgerError> {
        validate_admin(&request.admin_id)?;
        validate_amount(request.amount)?;
        validate_reason(&request.reason)?;
        match request.adjustment_type {
            AdjustmentType::Hold => self.place_hold(HoldRequest::from(request)).await,
            AdjustmentType::ReleaseHold => {
                let hold_id = request.hold_transaction_id.ok_or_else(|| {
                    LedgerError::InvalidRequest("A RELEASE_HOLD adjustment needs the id of the hold to release.".into())
                })?;
                let release = ReleaseHoldRequest {
                    hold_transaction_id: hold_id,
                    admin_id: request.admin_id,
                    reason: Some(request.reason),
                    partner_id: Some(request.partner_id),
                    expected_amount: Some(request.amount),
                };
                self.release_hold(release).await
            },
            AdjustmentType::Add | AdjustmentType::Deduct | AdjustmentType::Bonus => {
                let update =
                    self.with_retry(request.partner_id, "adjust", || self.db.adjust_commission(&request)).await?;
                self.publish_adjustment(&update).await;
                Ok(update)
            },
        }
    }

    pub async fn place_hold(&self, request: HoldRequest) -> Result<LedgerUpdate, LedgerError> {
        validate_admin(&request.admin_id)?;
        validate_amount(request.amount)?;
        validate_reason(&request.reason)?;
        let update = self.with_retry(request.partner_id, "hold", || self.db.place_hold(&request)).await?;
        self.publish_adjustment(&update).await;
        Ok(update)
    }

    pub async fn release_hold(&self, request: ReleaseHoldRequest) -> Result<LedgerUpdate, LedgerError> {
        validate_admin(&request.admin_id)?;
        let hold_id = request.hold_transaction_id;
        let hold = self
            .db
            .fetch_transaction(hold_id)
            .await?
            .filter(|t| t.tx_type == TransactionType::Hold)
            .ok_or(LedgerError::HoldNotFound(hold_id))?;
        let update = self.with_retry(hold.partner_id, "release hold", || self.db.release_hold(&request)).await?;
        self.publish_adjustment(&update).await;
        Ok(update)
    }

    /// Changes the status of a ledger entry. Cancelling a `PAID_OUT` entry restores the partner's paid and available
    /// commission.
    pub async fn correct_status(&self, correction: StatusCorrection) -> Result<TransactionStatusChange, LedgerError> {
        validate_admin(&correction.admin_id)?;
        let id = correction.transaction_id;
        let entry = self.db.fetch_transaction(id).await?.ok_or(LedgerError::TransactionNotFound(id))?;
        let change = self
            .with_retry(entry.partner_id, "status correction", || self.db.update_transaction_status(&correction))
            .await?;
        for producer in &self.producers.status_changed_producer {
            producer.publish_event(TransactionStatusChangedEvent::from(change.clone())).await;
        }
        Ok(change)
    }

    /// Releases every unreleased hold that expired at or before `now`. Each release is its own atomic operation,
    /// performed by the system actor. A failure to release one hold does not stop the others.
    pub async fn release_expired_holds(&self, now: DateTime<Utc>) -> Result<HoldReleaseResult, LedgerError> {
        let holds = self.db.fetch_expired_holds(now).await?;
        let mut result = HoldReleaseResult::default();
        for hold in holds {
            let expiry = hold.hold_until.map(|t| t.to_rfc3339()).unwrap_or_default();
            let request = ReleaseHoldRequest::new(hold.id, AdminId::system())
                .with_reason(format!("Hold #{} expired at {expiry}", hold.id));
            match self.release_hold(request).await {
                Ok(update) => result.released.push(update),
                Err(LedgerError::HoldAlreadyReleased(id)) => debug!("🧾 Hold #{id} was released in the meantime"),
                Err(e) => {
                    warn!("🧾 Could not release expired hold #{}: {e}", hold.id);
                    result.failed.push((hold.id, e.to_string()));
                },
            }
        }
        if !result.is_empty() {
            info!("🧾 Released {} expired holds. {} failed", result.count(), result.failed.len());
        }
        Ok(result)
    }

    pub async fn balance(&self, partner_id: i64) -> Result<CommissionBalance, LedgerError> {
        self.db.fetch_partner_balance(partner_id).await
    }

    async fn publish_adjustment(&self, update: &LedgerUpdate) {
        for producer in &self.producers.ledger_adjusted_producer {
            producer.publish_event(LedgerAdjustedEvent::from(update.clone())).await;
        }
    }

    /// Runs `op` under the partner's lock, retrying transient failures.
    ///
    /// `op` itself is never cut short here: it may already have sent its commit, and an abandoned commit cannot be
    /// told apart from one that never happened.
    async fn with_retry<T, F, Fut>(&self, partner_id: i64, operation: &str, op: F) -> Result<T, LedgerError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, LedgerError>>,
    {
        let mut retries = 0;
        loop {
            let result = match self.lock_partner(partner_id).await {
                Ok(_guard) => op().await,
                Err(e) => Err(e),
            };
            match result {
                Err(e) if e.is_retryable() && retries < self.config.max_retries => {
                    retries += 1;
                    let max = self.config.max_retries;
                    warn!("🧾 {operation} for partner #{partner_id} failed ({e}). Retry {retries} of {max}");
                    tokio::time::sleep(self.config.retry_backoff * retries).await;
                },
                Err(e) => {
                    if e.is_retryable() {
                        error!("🧾 {operation} for partner #{partner_id} gave up after {retries} retries: {e}");
                    } else {
                        debug!("🧾 {operation} for partner #{partner_id} rejected: {e}");
                    }
                    return Err(e);
                },
                Ok(value) => return Ok(value),
            }
        }
    }

    async fn lock_partner(&self, partner_id: i64) -> Result<PartnerGuard, LedgerError> {
        tokio::time::timeout(self.config.transaction_timeout, self.locks.acquire(partner_id))
            .await
            .map_err(|_| LedgerError::Timeout(self.config.timeout_millis()))
    }
}

/// Parses an adjustment type supplied at the edge of the system. Unknown types are validation errors.
pub fn parse_adjustment_type(s: &str) -> Result<AdjustmentType, LedgerError> {
    AdjustmentType::from_str(s).map_err(|e| LedgerError::InvalidRequest(e.to_string()))
}

fn validate_amount(amount: Cents) -> Result<(), LedgerError> {
    if amount.is_positive() {
        Ok(())
    } else {
        Err(LedgerError::InvalidAmount(format!("Amount must be greater than zero, got {amount}")))
    }
}

fn validate_reason(reason: &str) -> Result<(), LedgerError> {
    if reason.trim().is_empty() {
        Err(LedgerError::MissingReason)
    } else {
        Ok(())
    }
}

fn validate_admin(admin_id: &AdminId) -> Result<(), LedgerError> {
    if admin_id.is_blank() {
        Err(LedgerError::MissingAdminId)
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn request_validation() {
        assert!(validate_amount(Cents::from(1)).is_ok());
        assert!(matches!(validate_amount(Cents::zero()), Err(LedgerError::InvalidAmount(_))));
        assert!(matches!(validate_reason("   "), Err(LedgerError::MissingReason)));
        assert!(matches!(validate_admin(&AdminId::from("")), Err(LedgerError::MissingAdminId)));
        assert!(validate_admin(&AdminId::from("admin-7")).is_ok());
    }

    #[test]
    fn unknown_adjustment_types_are_rejected() {
        assert_eq!(parse_adjustment_type("deduct").unwrap(), AdjustmentType::Deduct);
        let err = parse_adjustment_type("REFUND").unwrap_err();
        assert_eq!(err.kind(), crate::traits::ErrorKind::Validation);
    }
}
