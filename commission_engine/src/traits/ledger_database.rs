use std::fmt::Display;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::{
    db_types::{Cents, CommissionTransaction, OrderId, TransactionStatus},
    ledger::CommissionBalance,
    traits::data_objects::{
        AdjustmentRequest,
        HoldRequest,
        LedgerUpdate,
        PayoutRequest,
        ReleaseHoldRequest,
        StatusCorrection,
        TransactionStatusChange,
    },
};

/// The record-store contract for the commission ledger.
///
/// Every method that changes a balance runs as one atomic store transaction that
/// * reads the partner's balance (and version) inside the transaction,
/// * validates the operation against that balance,
/// * writes the new balance, guarded by the version that was read, and
/// * appends the ledger entry that describes the change.
///
/// If any step fails, nothing is written. A lost version race is reported as [`LedgerError::Conflict`], which callers
/// may retry. Implementations must never report a transient error for a write whose commit may have taken effect: the
/// ledger engine retries transient errors, and these writes are not idempotent.
///
/// These are the only functions that write partner balance fields.
#[allow(async_fn_in_trait)]
pub trait CommissionLedgerDatabase: Clone {
    /// The URL of the database
    fn url(&self) -> &str;

    /// Credits the commission for a paid order to the partner the order is attributed to, and marks the order as
    /// commission-processed.
    ///
    /// Returns `None` if the order has already been processed, or if the commission works out to zero.
    async fn earn_commission_for_order(&self, order_id: &OrderId) -> Result<Option<LedgerUpdate>, LedgerError>;

    /// Records a payout to the partner. The amount may not exceed the partner's withdrawable commission.
    async fn pay_out_commission(&self, request: &PayoutRequest) -> Result<LedgerUpdate, LedgerError>;

    /// Applies an `ADD`, `DEDUCT` or `BONUS` adjustment. Holds and releases are handled by [`Self::place_hold`] and
    /// [`Self::release_hold`].
    async fn adjust_commission(&self, request: &AdjustmentRequest) -> Result<LedgerUpdate, LedgerError>;

    /// Freezes part of the partner's available commission.
    async fn place_hold(&self, request: &HoldRequest) -> Result<LedgerUpdate, LedgerError>;

    /// Releases a prior `HOLD` entry. A hold can only be released once.
    async fn release_hold(&self, request: &ReleaseHoldRequest) -> Result<LedgerUpdate, LedgerError>;

    /// Changes the status of a ledger entry. Cancelling a `PAID_OUT` entry reverses the payout.
    async fn update_transaction_status(
        &self,
        correction: &StatusCorrection,
    ) -> Result<TransactionStatusChange, LedgerError>;

    async fn fetch_transaction(&self, id: i64) -> Result<Option<CommissionTransaction>, LedgerError>;

    async fn fetch_partner_balance(&self, partner_id: i64) -> Result<CommissionBalance, LedgerError>;

    /// Unreleased holds whose `hold_until` is at or before `now`, oldest first.
    async fn fetch_expired_holds(&self, now: DateTime<Utc>) -> Result<Vec<CommissionTransaction>, LedgerError>;

    async fn close(&mut self) -> Result<(), LedgerError>;
}

/// Broad classification of ledger failures, used by callers to decide whether to retry and what to show.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The request itself is malformed. Never retried.
    Validation,
    /// The request is well-formed, but the current state does not allow it. Never retried.
    BusinessRule,
    NotFound,
    /// Nothing was written, and the same request may succeed if tried again.
    Transient,
    Internal,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::Validation => write!(f, "validation"),
            ErrorKind::BusinessRule => write!(f, "business rule"),
            ErrorKind::NotFound => write!(f, "not found"),
            ErrorKind::Transient => write!(f, "transient"),
            ErrorKind::Internal => write!(f, "internal"),
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum LedgerError {
    #[error("Invalid amount. {0}")]
    InvalidAmount(String),
    #[error("A reason is required for this operation.")]
    MissingReason,
    #[error("An authenticated admin id is required for this operation.")]
    MissingAdminId,
    #[error("Invalid request. {0}")]
    InvalidRequest(String),
    #[error("Transaction #{id} already has status {status}.")]
    StatusUnchanged { id: i64, status: TransactionStatus },
    #[error(
        "Insufficient withdrawable funds. Requested {requested}, but only {withdrawable} is withdrawable (short by \
         {shortfall})."
    )]
    InsufficientFunds { requested: Cents, withdrawable: Cents, shortfall: Cents },
    #[error("Insufficient available commission. Requested {requested}, but only {available} is available.")]
    InsufficientAvailable { requested: Cents, available: Cents },
    #[error("Order {0} is not eligible for commission. {1}")]
    NotEligible(OrderId, String),
    #[error("Hold #{0} has already been released.")]
    HoldAlreadyReleased(i64),
    #[error("Transaction #{id} cannot move from {from} to {to}.")]
    InvalidStatusTransition { id: i64, from: TransactionStatus, to: TransactionStatus },
    #[error("Partner #{0} does not exist.")]
    PartnerNotFound(i64),
    #[error("Order {0} does not exist.")]
    OrderNotFound(OrderId),
    #[error("Hold not found. #{0} does not exist or is not a hold.")]
    HoldNotFound(i64),
    #[error("Transaction #{0} does not exist.")]
    TransactionNotFound(i64),
    #[error("Partner #{0} was modified concurrently.")]
    Conflict(i64),
    #[error("The ledger operation did not complete within {0} ms.")]
    Timeout(u64),
    #[error("The record store is busy. {0}")]
    StoreBusy(String),
    #[error("Balance arithmetic overflowed.")]
    Overflow,
    #[error("Inconsistent balance. {0}")]
    InconsistentBalance(String),
    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl LedgerError {
    pub fn kind(&self) -> ErrorKind {
        use LedgerError::*;
        match self {
            InvalidAmount(_) | MissingReason | MissingAdminId | InvalidRequest(_) | StatusUnchanged { .. } => {
                ErrorKind::Validation
            },
            InsufficientFunds { .. }
            | InsufficientAvailable { .. }
            | NotEligible(..)
            | HoldAlreadyReleased(_)
            | InvalidStatusTransition { .. } => ErrorKind::BusinessRule,
            PartnerNotFound(_) | OrderNotFound(_) | HoldNotFound(_) | TransactionNotFound(_) => ErrorKind::NotFound,
            Conflict(_) | Timeout(_) | StoreBusy(_) => ErrorKind::Transient,
            Overflow | InconsistentBalance(_) | DatabaseError(_) => ErrorKind::Internal,
        }
    }

    /// True only for failures that left nothing behind and may succeed on another attempt.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }

    /// A message that is safe to show to non-administrative callers. Internal details are replaced with a generic
    /// message.
    pub fn public_message(&self) -> String {
        match self.kind() {
            ErrorKind::Internal => "An internal error occurred while updating the commission ledger.".to_string(),
            ErrorKind::Transient => "The commission ledger is busy. Please try again.".to_string(),
            _ => self.to_string(),
        }
    }
}

/// SQLite result codes for `SQLITE_BUSY`, `SQLITE_LOCKED` and their extended variants.
const TRANSIENT_SQLITE_CODES: [&str; 5] = ["5", "6", "261", "262", "517"];

pub(crate) fn is_transient_sqlx_error(e: &sqlx::Error) -> bool {
    match e {
        sqlx::Error::PoolTimedOut => true,
        sqlx::Error::Database(db_err) => {
            db_err.code().map(|code| TRANSIENT_SQLITE_CODES.iter().any(|c| code == *c)).unwrap_or(false)
        },
        _ => false,
    }
}

impl From<sqlx::Error> for LedgerError {
    fn from(e: sqlx::Error) -> Self {
        if is_transient_sqlx_error(&e) {
            LedgerError::StoreBusy(e.to_string())
        } else {
            LedgerError::DatabaseError(e.to_string())
        }
    }
}
