use commission_common::Cents;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::traits::LedgerError;

/// The stored balance fields of a partner.
///
/// Only the three lifetime/frozen totals are persisted. Available and withdrawable commission are always derived from
/// them here, and nowhere else:
///
/// ```text
/// available    = earned - paid - on_hold
/// withdrawable = max(0, available)
/// ```
///
/// The fields are private. A balance can only change by applying a [`BalanceEffect`], which validates the
/// preconditions of the effect against the current values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct CommissionBalance {
    commission_earned: Cents,
    commission_paid: Cents,
    commission_on_hold: Cents,
}

/// A single change to a partner's balance. Every variant carries a strictly positive amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BalanceEffect {
    /// Commission earned on a referred order.
    Earn(Cents),
    /// A manual `ADD` or `BONUS` credit.
    Credit(Cents),
    /// A manual `DEDUCT`. May not exceed available commission.
    Deduct(Cents),
    /// Commission paid out to the partner. May not exceed withdrawable commission.
    Payout(Cents),
    /// Freeze part of the available commission.
    Hold(Cents),
    /// Unfreeze a previously held amount.
    ReleaseHold(Cents),
    /// Undo a payout whose transaction was cancelled.
    ReversePayout(Cents),
}

impl BalanceEffect {
    pub fn amount(&self) -> Cents {
        match *self {
            BalanceEffect::Earn(a)
            | BalanceEffect::Credit(a)
            | BalanceEffect::Deduct(a)
            | BalanceEffect::Payout(a)
            | BalanceEffect::Hold(a)
            | BalanceEffect::ReleaseHold(a)
            | BalanceEffect::ReversePayout(a) => a,
        }
    }
}

/// The balance immediately before and after a [`BalanceEffect`] was applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BalanceChange {
    pub before: CommissionBalance,
    pub after: CommissionBalance,
}

impl BalanceChange {
    pub fn available_before(&self) -> Cents {
        self.before.available()
    }

    pub fn available_after(&self) -> Cents {
        self.after.available()
    }
}

impl CommissionBalance {
    pub(crate) fn from_parts(earned: Cents, paid: Cents, on_hold: Cents) -> Self {
        Self { commission_earned: earned, commission_paid: paid, commission_on_hold: on_hold }
    }

    /// Lifetime accrued commission, net of deductions.
    pub fn earned(&self) -> Cents {
        self.commission_earned
    }

    /// Lifetime commission paid out, net of cancelled payouts.
    pub fn paid(&self) -> Cents {
        self.commission_paid
    }

    pub fn on_hold(&self) -> Cents {
        self.commission_on_hold
    }

    pub fn available(&self) -> Cents {
        self.commission_earned - self.commission_paid - self.commission_on_hold
    }

    pub fn withdrawable(&self) -> Cents {
        self.available().max(Cents::zero())
    }

    /// Validates `effect` against this balance and returns the resulting balance. `self` is left untouched, so a
    /// rejected effect can never leave a half-applied balance behind.
    pub(crate) fn apply(&self, effect: BalanceEffect) -> Result<BalanceChange, LedgerError> {
        let amount = effect.amount();
        if !amount.is_positive() {
            return Err(LedgerError::InvalidAmount(format!("Amount must be greater than zero, got {amount}")));
        }
        let mut after = *self;
        match effect {
            BalanceEffect::Earn(a) | BalanceEffect::Credit(a) => {
                after.commission_earned = checked_add(self.commission_earned, a)?;
            },
            BalanceEffect::Deduct(a) => {
                self.check_available(a)?;
                after.commission_earned = checked_sub(self.commission_earned, a)?;
            },
            BalanceEffect::Payout(a) => {
                let withdrawable = self.withdrawable();
                if a > withdrawable {
                    return Err(LedgerError::InsufficientFunds {
                        requested: a,
                        withdrawable,
                        shortfall: a - withdrawable,
                    });
                }
                after.commission_paid = checked_add(self.commission_paid, a)?;
            },
            BalanceEffect::Hold(a) => {
                self.check_available(a)?;
                after.commission_on_hold = checked_add(self.commission_on_hold, a)?;
            },
            BalanceEffect::ReleaseHold(a) => {
                if a > self.commission_on_hold {
                    return Err(LedgerError::InconsistentBalance(format!(
                        "Cannot release {a}; only {} is on hold",
                        self.commission_on_hold
                    )));
                }
                after.commission_on_hold = checked_sub(self.commission_on_hold, a)?;
            },
            BalanceEffect::ReversePayout(a) => {
                if a > self.commission_paid {
                    return Err(LedgerError::InconsistentBalance(format!(
                        "Cannot reverse a payout of {a}; only {} has been paid",
                        self.commission_paid
                    )));
                }
                after.commission_paid = checked_sub(self.commission_paid, a)?;
            },
        }
        Ok(BalanceChange { before: *self, after })
    }

    fn check_available(&self, amount: Cents) -> Result<(), LedgerError> {
        let available = self.available();
        if amount > available {
            Err(LedgerError::InsufficientAvailable { requested: amount, available })
        } else {
            Ok(())
        }
    }
}

fn checked_add(a: Cents, b: Cents) -> Result<Cents, LedgerError> {
    a.checked_add(b).ok_or(LedgerError::Overflow)
}

fn checked_sub(a: Cents, b: Cents) -> Result<Cents, LedgerError> {
    a.checked_sub(b).ok_or(LedgerError::Overflow)
}

#[cfg(test)]
mod test {
    use super::*;

    fn cents(v: i64) -> Cents {
        Cents::from(v)
    }

    fn funded(amount: i64) -> CommissionBalance {
        CommissionBalance::default().apply(BalanceEffect::Earn(cents(amount))).unwrap().after
    }

    #[test]
    fn earn_increases_available() {
        let balance = funded(10_000);
        assert_eq!(balance.earned(), cents(10_000));
        assert_eq!(balance.available(), cents(10_000));
        assert_eq!(balance.withdrawable(), cents(10_000));
    }

    #[test]
    fn payout_beyond_withdrawable_is_rejected() {
        let balance = funded(10_000);
        let err = balance.apply(BalanceEffect::Payout(cents(12_000))).unwrap_err();
        match err {
            LedgerError::InsufficientFunds { requested, withdrawable, shortfall } => {
                assert_eq!(requested, cents(12_000));
                assert_eq!(withdrawable, cents(10_000));
                assert_eq!(shortfall, cents(2_000));
            },
            e => panic!("Unexpected error: {e}"),
        }
        assert_eq!(balance.available(), cents(10_000));
    }

    #[test]
    fn hold_and_release() {
        let balance = funded(10_000);
        let held = balance.apply(BalanceEffect::Hold(cents(4_000))).unwrap();
        assert_eq!(held.available_before(), cents(10_000));
        assert_eq!(held.available_after(), cents(6_000));
        assert_eq!(held.after.on_hold(), cents(4_000));
        assert_eq!(held.after.withdrawable(), cents(6_000));
        let released = held.after.apply(BalanceEffect::ReleaseHold(cents(4_000))).unwrap();
        assert_eq!(released.after.on_hold(), Cents::zero());
        assert_eq!(released.after.available(), cents(10_000));
    }

    #[test]
    fn hold_cannot_exceed_available() {
        let balance = funded(10_000);
        assert!(matches!(
            balance.apply(BalanceEffect::Hold(cents(10_001))),
            Err(LedgerError::InsufficientAvailable { .. })
        ));
    }

    #[test]
    fn deduct_beyond_available_is_rejected() {
        let balance = funded(10_000);
        let err = balance.apply(BalanceEffect::Deduct(cents(15_000))).unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientAvailable { .. }));
        let ok = balance.apply(BalanceEffect::Deduct(cents(2_500))).unwrap();
        assert_eq!(ok.after.earned(), cents(7_500));
    }

    #[test]
    fn payout_and_reversal() {
        let balance = funded(10_000);
        let paid = balance.apply(BalanceEffect::Payout(cents(4_000))).unwrap().after;
        assert_eq!(paid.paid(), cents(4_000));
        assert_eq!(paid.available(), cents(6_000));
        let reversed = paid.apply(BalanceEffect::ReversePayout(cents(4_000))).unwrap().after;
        assert_eq!(reversed, balance);
        assert!(reversed.apply(BalanceEffect::ReversePayout(cents(1))).is_err());
    }

    #[test]
    fn amounts_must_be_positive() {
        let balance = funded(100);
        assert!(matches!(balance.apply(BalanceEffect::Credit(Cents::zero())), Err(LedgerError::InvalidAmount(_))));
        assert!(matches!(balance.apply(BalanceEffect::Payout(cents(-5))), Err(LedgerError::InvalidAmount(_))));
    }

    #[test]
    fn overflow_is_reported() {
        let balance = CommissionBalance::from_parts(Cents::from(i64::MAX), Cents::zero(), Cents::zero());
        assert!(matches!(balance.apply(BalanceEffect::Earn(cents(1))), Err(LedgerError::Overflow)));
    }
}
