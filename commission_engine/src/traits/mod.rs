//! # Record-store contracts
//!
//! This module defines the behaviour a storage backend needs to expose in order to back the commission engine.
//!
//! * [`CommissionLedgerDatabase`] owns every write to a partner's balance. Each of its mutating methods is one atomic
//!   store transaction that updates the balance and appends the ledger entry describing the change.
//! * [`PartnerManagement`] handles partner registration, lifecycle, referral clicks and referred clients.
//! * [`OrderManagement`] keeps the minimal order records needed for attribution and commission idempotency.
//! * [`ReportingQueries`] provides read-only views over partners and their ledgers.
mod data_objects;
mod ledger_database;
mod order_management;
mod partner_management;
mod reporting;

pub use data_objects::{
    AdjustmentRequest,
    HoldReleaseResult,
    HoldRequest,
    LedgerUpdate,
    PayoutRequest,
    ReleaseHoldRequest,
    StatusCorrection,
    TransactionStatusChange,
};
pub use ledger_database::{CommissionLedgerDatabase, ErrorKind, LedgerError};
pub use order_management::{InsertOrderResult, OrderFlowError, OrderManagement};
pub use partner_management::{PartnerApiError, PartnerManagement};
pub use reporting::{PartnerSnapshot, ReportingError, ReportingQueries};
