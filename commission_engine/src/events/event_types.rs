use serde::{Deserialize, Serialize};

use crate::{
    db_types::{CommissionTransaction, OrderId, TransactionStatus},
    ledger::CommissionBalance,
    traits::{LedgerUpdate, TransactionStatusChange},
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommissionEarnedEvent {
    pub partner_id: i64,
    pub order_id: OrderId,
    pub transaction: CommissionTransaction,
    pub balance: CommissionBalance,
}

impl CommissionEarnedEvent {
    pub fn new(order_id: OrderId, update: LedgerUpdate) -> Self {
        let partner_id = update.transaction.partner_id;
        Self { partner_id, order_id, transaction: update.transaction, balance: update.balance }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayoutCompletedEvent {
    pub partner_id: i64,
    pub transaction: CommissionTransaction,
    pub balance: CommissionBalance,
}

impl From<LedgerUpdate> for PayoutCompletedEvent {
    fn from(update: LedgerUpdate) -> Self {
        Self { partner_id: update.transaction.partner_id, transaction: update.transaction, balance: update.balance }
    }
}

/// Published for `ADJUSTED`, `BONUS`, `HOLD` and `HOLD_RELEASED` entries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerAdjustedEvent {
    pub partner_id: i64,
    pub transaction: CommissionTransaction,
    pub balance: CommissionBalance,
}

impl From<LedgerUpdate> for LedgerAdjustedEvent {
    fn from(update: LedgerUpdate) -> Self {
        Self { partner_id: update.transaction.partner_id, transaction: update.transaction, balance: update.balance }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionStatusChangedEvent {
    pub old_status: TransactionStatus,
    pub transaction: CommissionTransaction,
    pub payout_reversed: bool,
    pub balance: CommissionBalance,
}

impl From<TransactionStatusChange> for TransactionStatusChangedEvent {
    fn from(change: TransactionStatusChange) -> Self {
        Self {
            old_status: change.old_status,
            transaction: change.transaction,
            payout_reversed: change.payout_reversed,
            balance: change.balance,
        }
    }
}
