//! Balance arithmetic for the commission ledger.
//!
//! [`CommissionBalance`] is the only place where available and withdrawable commission are derived, and the only place
//! where the preconditions of a balance change are checked. The record store persists the result of
//! [`CommissionBalance::apply`] together with the ledger entry that describes it.
mod balance;
mod locks;

pub use balance::{BalanceChange, BalanceEffect, CommissionBalance};
pub use locks::{PartnerGuard, PartnerLocks};
