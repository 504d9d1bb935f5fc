//! # Commission engine public API
//!
//! The `commission_api` module exposes the programmatic API of the commission engine. Each API wraps a record-store
//! backend that implements the traits it needs, so callers only pick up the functionality they use.
//!
//! * [`ledger_api`] is the ledger engine. Every change to a partner's balance goes through it.
//! * [`payout_api`] validates payout requests and translates ledger errors into caller-facing ones.
//! * [`order_flow_api`] reacts to storefront and payment events, resolves referral attribution and credits
//!   commission.
//! * [`partner_api`] registers partners, manages their lifecycle and tracks referral clicks and referred clients.
//! * [`reporting_api`] provides read-only summaries, transaction history and ledger audits.
//!
//! # API usage
//!
//! ```rust,ignore
//! use commission_engine::{events::EventProducers, LedgerApi, PayoutApi, SqliteDatabase};
//! let db = SqliteDatabase::new_with_url("sqlite://data/commission_store.db", 25).await?;
//! let ledger = LedgerApi::new(db, EventProducers::default());
//! let payouts = PayoutApi::new(ledger.clone());
//! let update = payouts.request_payout(PayoutRequest::new(partner_id, amount, admin_id)).await?;
//! ```
pub mod config;
pub mod ledger_api;
pub mod order_flow_api;
pub mod partner_api;
pub mod payout_api;
pub mod reporting_api;
pub mod transaction_objects;
