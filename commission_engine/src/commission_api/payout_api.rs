use std::fmt::Debug;

use log::*;
use thiserror::Error;

use crate::{
    commission_api::ledger_api::LedgerApi,
    db_types::{AdminId, Cents, TransactionStatus, TransactionType},
    traits::{
        CommissionLedgerDatabase,
        ErrorKind,
        LedgerError,
        LedgerUpdate,
        PayoutRequest,
        StatusCorrection,
        TransactionStatusChange,
    },
};

/// The errors a payout caller sees. Internal detail is logged, not returned.
#[derive(Debug, Clone, Error)]
pub enum PayoutError {
    #[error("Invalid payout request. {0}")]
    InvalidRequest(String),
    #[error(
        "Insufficient withdrawable funds. Requested {requested}, but only {withdrawable} can be withdrawn ({shortfall} \
         short)."
    )]
    InsufficientFunds { requested: Cents, withdrawable: Cents, shortfall: Cents },
    #[error("Partner #{0} does not exist.")]
    PartnerNotFound(i64),
    #[error("Transaction #{0} does not exist.")]
    TransactionNotFound(i64),
    #[error("The payout could not be completed right now. Please try again.")]
    Retryable,
    #[error("The payout could not be completed.")]
    Internal,
}

impl PayoutError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, PayoutError::Retryable)
    }
}

impl From<LedgerError> for PayoutError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::InsufficientFunds { requested, withdrawable, shortfall } => {
                PayoutError::InsufficientFunds { requested, withdrawable, shortfall }
            },
            LedgerError::PartnerNotFound(id) => PayoutError::PartnerNotFound(id),
            LedgerError::TransactionNotFound(id) => PayoutError::TransactionNotFound(id),
            e => match e.kind() {
                ErrorKind::Validation | ErrorKind::BusinessRule | ErrorKind::NotFound => {
                    PayoutError::InvalidRequest(e.to_string())
                },
                ErrorKind::Transient => {
                    warn!("💸 Payout failed with a transient error: {e}");
                    PayoutError::Retryable
                },
                ErrorKind::Internal => {
                    error!("💸 Payout failed: {e}");
                    PayoutError::Internal
                },
            },
        }
    }
}

/// The payout orchestrator. It never touches balances itself; every payout goes through [`LedgerApi::pay_out`], which
/// re-checks the withdrawable amount inside the store transaction.
pub struct PayoutApi<B> {
    ledger: LedgerApi<B>,
}

impl<B: Clone> Clone for PayoutApi<B> {
    fn clone(&self) -> Self {
        Self { ledger: self.ledger.clone() }
    }
}

impl<B> Debug for PayoutApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PayoutApi")
    }
}

impl<B> PayoutApi<B> {
    pub fn new(ledger: LedgerApi<B>) -> Self {
        Self { ledger }
    }

    pub fn ledger(&self) -> &LedgerApi<B> {
        &self.ledger
    }
}

impl<B> PayoutApi<B>
where B: CommissionLedgerDatabase
{
    pub async fn withdrawable(&self, partner_id: i64) -> Result<Cents, PayoutError> {
        let balance = self.ledger.balance(partner_id).await?;
        Ok(balance.withdrawable())
    }

    /// Pays out commission to a partner.
    ///
    /// Requests for more than the current withdrawable amount are turned away before a store transaction is opened.
    /// The ledger repeats the check under the partner's lock, so a concurrent payout can still make this one fail.
    pub async fn request_payout(&self, request: PayoutRequest) -> Result<LedgerUpdate, PayoutError> {
        if !request.amount.is_positive() {
            return Err(PayoutError::InvalidRequest(format!("Payout amount must be positive, got {}", request.amount)));
        }
        let withdrawable = self.withdrawable(request.partner_id).await?;
        if request.amount > withdrawable {
            let shortfall = request.amount - withdrawable;
            info!(
                "💸 Payout of {} to partner #{} refused. Only {withdrawable} is withdrawable",
                request.amount, request.partner_id
            );
            return Err(PayoutError::InsufficientFunds { requested: request.amount, withdrawable, shortfall });
        }
        let update = self.ledger.pay_out(request).await?;
        let entry = &update.transaction;
        info!("💸 Payout #{} of {} to partner #{} completed", entry.id, entry.amount, entry.partner_id);
        Ok(update)
    }

    /// Cancels a completed payout, restoring the partner's paid and available commission.
    pub async fn cancel_payout(
        &self,
        transaction_id: i64,
        admin_id: AdminId,
        notes: Option<String>,
    ) -> Result<TransactionStatusChange, PayoutError> {
        let entry = self
            .ledger
            .db()
            .fetch_transaction(transaction_id)
            .await?
            .ok_or(PayoutError::TransactionNotFound(transaction_id))?;
        if entry.tx_type != TransactionType::PaidOut {
            return Err(PayoutError::InvalidRequest(format!(
                "Transaction #{transaction_id} is a {} entry, not a payout",
                entry.tx_type
            )));
        }
        let mut correction = StatusCorrection::new(transaction_id, TransactionStatus::Cancelled, admin_id);
        if let Some(notes) = notes {
            correction = correction.with_notes(notes);
        }
        let change = self.ledger.correct_status(correction).await?;
        info!("💸 Payout #{transaction_id} cancelled. {} returned to partner #{}", entry.amount, entry.partner_id);
        Ok(change)
    }
}
