use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    db_types::{AdjustmentType, AdminId, Cents, CommissionTransaction, OrderId, TransactionStatus},
    ledger::CommissionBalance,
};

/// The outcome of a committed balance-changing operation: the ledger entry that was appended, and the partner's balance
/// after it was applied.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerUpdate {
    pub transaction: CommissionTransaction,
    pub balance: CommissionBalance,
}

impl LedgerUpdate {
    pub fn new(transaction: CommissionTransaction, balance: CommissionBalance) -> Self {
        Self { transaction, balance }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayoutRequest {
    pub partner_id: i64,
    pub amount: Cents,
    pub admin_id: AdminId,
    pub payment_method: Option<String>,
    pub external_reference: Option<String>,
    pub notes: Option<String>,
}

impl PayoutRequest {
    pub fn new(partner_id: i64, amount: Cents, admin_id: AdminId) -> Self {
        Self { partner_id, amount, admin_id, payment_method: None, external_reference: None, notes: None }
    }

    pub fn with_payment_method<S: Into<String>>(mut self, method: S) -> Self {
        self.payment_method = Some(method.into());
        self
    }

    pub fn with_external_reference<S: Into<String>>(mut self, reference: S) -> Self {
        self.external_reference = Some(reference.into());
        self
    }

    pub fn with_notes<S: Into<String>>(mut self, notes: S) -> Self {
        self.notes = Some(notes.into());
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdjustmentRequest {
    pub partner_id: i64,
    pub amount: Cents,
    pub adjustment_type: AdjustmentType,
    pub reason: String,
    pub admin_id: AdminId,
    pub reference_order_id: Option<OrderId>,
    pub notes: Option<String>,
    /// Required for `RELEASE_HOLD`: the id of the `HOLD` entry to release.
    pub hold_transaction_id: Option<i64>,
    /// Optional expiry for `HOLD` adjustments.
    pub hold_until: Option<DateTime<Utc>>,
}

impl AdjustmentRequest {
    pub fn new<S: Into<String>>(
        partner_id: i64,
        amount: Cents,
        adjustment_type: AdjustmentType,
        reason: S,
        admin_id: AdminId,
    ) -> Self {
        Self {
            partner_id,
            amount,
            adjustment_type,
            reason: reason.into(),
            admin_id,
            reference_order_id: None,
            notes: None,
            hold_transaction_id: None,
            hold_until: None,
        }
    }

    pub fn with_reference_order(mut self, order_id: OrderId) -> Self {
        self.reference_order_id = Some(order_id);
        self
    }

    pub fn with_notes<S: Into<String>>(mut self, notes: S) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn with_hold_transaction(mut self, id: i64) -> Self {
        self.hold_transaction_id = Some(id);
        self
    }

    pub fn with_hold_until(mut self, until: DateTime<Utc>) -> Self {
        self.hold_until = Some(until);
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HoldRequest {
    pub partner_id: i64,
    pub amount: Cents,
    pub reason: String,
    pub admin_id: AdminId,
    pub hold_until: Option<DateTime<Utc>>,
    pub reference_order_id: Option<OrderId>,
    pub notes: Option<String>,
}

impl HoldRequest {
    pub fn new<S: Into<String>>(partner_id: i64, amount: Cents, reason: S, admin_id: AdminId) -> Self {
        Self {
            partner_id,
            amount,
            reason: reason.into(),
            admin_id,
            hold_until: None,
            reference_order_id: None,
            notes: None,
        }
    }

    pub fn with_hold_until(mut self, until: DateTime<Utc>) -> Self {
        self.hold_until = Some(until);
        self
    }
}

impl From<AdjustmentRequest> for HoldRequest {
    fn from(req: AdjustmentRequest) -> Self {
        Self {
            partner_id: req.partner_id,
            amount: req.amount,
            reason: req.reason,
            admin_id: req.admin_id,
            hold_until: req.hold_until,
            reference_order_id: req.reference_order_id,
            notes: req.notes,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleaseHoldRequest {
    pub hold_transaction_id: i64,
    pub admin_id: AdminId,
    pub reason: Option<String>,
    /// If given, the partner the hold must belong to.
    pub partner_id: Option<i64>,
    /// If given, must match the held amount exactly.
    pub expected_amount: Option<Cents>,
}

impl ReleaseHoldRequest {
    pub fn new(hold_transaction_id: i64, admin_id: AdminId) -> Self {
        Self { hold_transaction_id, admin_id, reason: None, partner_id: None, expected_amount: None }
    }

    pub fn with_reason<S: Into<String>>(mut self, reason: S) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusCorrection {
    pub transaction_id: i64,
    pub new_status: TransactionStatus,
    pub admin_id: AdminId,
    pub notes: Option<String>,
}

impl StatusCorrection {
    pub fn new(transaction_id: i64, new_status: TransactionStatus, admin_id: AdminId) -> Self {
        Self { transaction_id, new_status, admin_id, notes: None }
    }

    pub fn with_notes<S: Into<String>>(mut self, notes: S) -> Self {
        self.notes = Some(notes.into());
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionStatusChange {
    pub old_status: TransactionStatus,
    pub transaction: CommissionTransaction,
    /// The partner's balance after the change. Only differs from before the change if a payout was reversed.
    pub balance: CommissionBalance,
    pub payout_reversed: bool,
}

/// The result of a sweep of expired holds.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HoldReleaseResult {
    pub released: Vec<LedgerUpdate>,
    /// Holds that could not be released, with the reason.
    pub failed: Vec<(i64, String)>,
}

impl HoldReleaseResult {
    pub fn count(&self) -> usize {
        self.released.len()
    }

    pub fn is_empty(&self) -> bool {
        self.released.is_empty() && self.failed.is_empty()
    }
}
