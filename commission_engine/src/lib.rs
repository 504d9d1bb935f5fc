//! Commission Engine
//!
//! The commission engine tracks the commission that referral partners earn on the orders their referrals bring in, and
//! pays it out. Every change to a partner's balance is recorded in an append-only ledger, inside the same atomic store
//! transaction as the balance change itself.
//!
//! The library is divided into these sections:
//! 1. The record-store contracts ([`mod@traits`]) and their SQLite implementation, [`SqliteDatabase`]. You should
//!    never need to touch the database directly. The data types stored in it live in [`mod@db_types`].
//! 2. Balance arithmetic ([`mod@ledger`]). [`ledger::CommissionBalance`] derives available and withdrawable
//!    commission and validates every balance change.
//! 3. The public API ([`mod@commission_api`]): the ledger engine, payouts, order intake and attribution, partner
//!    management and reporting.
//!
//! The engine publishes events after each ledger change commits. Hook into them with [`events::EventHooks`].
#[cfg(feature = "sqlite")]
mod sqlite;

pub mod commission_api;
pub mod db_types;
pub mod events;
pub mod helpers;
pub mod ledger;
pub mod traits;

#[cfg(any(feature = "test_utils", test))]
pub mod test_utils;

pub use commission_api::{
    config::{AttributionConfig, LedgerConfig, PartnerConfig},
    ledger_api::LedgerApi,
    order_flow_api::OrderFlowApi,
    partner_api::PartnerApi,
    payout_api::{PayoutApi, PayoutError},
    reporting_api::ReportingApi,
};
pub use commission_common::Cents;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDatabase;
