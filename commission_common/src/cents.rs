use std::{
    fmt::Display,
    iter::Sum,
    ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign},
    str::FromStr,
};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlx::Type;
use thiserror::Error;

use crate::op;

pub const DEFAULT_CURRENCY_CODE: &str = "EUR";
pub const CENTS_PER_UNIT: i64 = 100;

static DECIMAL_AMOUNT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(-)?(\d{1,15})(?:\.(\d{1,2}))?\s*$").expect("static regex is valid"));

//--------------------------------------        Cents          ---------------------------------------------------------
/// A monetary amount in integer minor units (cents).
///
/// Every amount inside the ledger is a `Cents` value. Decimal major-unit strings such as `"40.00"` are converted with
/// [`Cents::from_str`] at the edges of the system, and rendered back with [`Display`]. Floating point is never
/// involved.
#[derive(Debug, Clone, Copy, Default, Type, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct Cents(i64);

op!(binary Cents, Add, add);
op!(binary Cents, Sub, sub);
op!(inplace Cents, AddAssign, add_assign);
op!(inplace Cents, SubAssign, sub_assign);
op!(unary Cents, Neg, neg);

impl Mul<i64> for Cents {
    type Output = Self;

    fn mul(self, rhs: i64) -> Self::Output {
        Self::from(self.value() * rhs)
    }
}

impl Sum for Cents {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Value cannot be represented in cents: {0}")]
pub struct CentsConversionError(String);

impl From<i64> for Cents {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl PartialEq for Cents {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for Cents {}

impl TryFrom<u64> for Cents {
    type Error = CentsConversionError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        if value > i64::MAX as u64 {
            Err(CentsConversionError(format!("Value {value} is too large to convert to Cents")))
        } else {
            #[allow(clippy::cast_possible_wrap)]
            Ok(Self(value as i64))
        }
    }
}

impl Display for Cents {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        let per_unit = CENTS_PER_UNIT.unsigned_abs();
        write!(f, "{sign}{}.{:02}", abs / per_unit, abs % per_unit)
    }
}

/// Parses a decimal amount in major units, e.g. `"40"`, `"40.5"` or `"-12.34"`. At most two decimal places are
/// accepted, since anything finer cannot be represented in cents without rounding.
impl FromStr for Cents {
    type Err = CentsConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let caps = DECIMAL_AMOUNT
            .captures(s)
            .ok_or_else(|| CentsConversionError(format!("'{s}' is not a decimal amount with at most 2 decimals")))?;
        let major = caps[2].parse::<i64>().map_err(|e| CentsConversionError(format!("{s}: {e}")))?;
        let minor = match caps.get(3).map(|m| m.as_str()) {
            Some(d) if d.len() == 1 => d.parse::<i64>().map(|v| v * 10),
            Some(d) => d.parse::<i64>(),
            None => Ok(0),
        }
        .map_err(|e| CentsConversionError(format!("{s}: {e}")))?;
        let value = major
            .checked_mul(CENTS_PER_UNIT)
            .and_then(|v| v.checked_add(minor))
            .ok_or_else(|| CentsConversionError(format!("{s} is too large")))?;
        if caps.get(1).is_some() {
            Ok(Self(-value))
        } else {
            Ok(Self(value))
        }
    }
}

impl Cents {
    pub const fn zero() -> Self {
        Self(0)
    }

    pub fn value(&self) -> i64 {
        self.0
    }

    pub fn from_major(units: i64) -> Self {
        Self(units * CENTS_PER_UNIT)
    }

    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }

    pub fn is_negative(&self) -> bool {
        self.0 < 0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, rhs: Self) -> Option<Self> {
        self.0.checked_add(rhs.0).map(Self)
    }

    pub fn checked_sub(self, rhs: Self) -> Option<Self> {
        self.0.checked_sub(rhs.0).map(Self)
    }
}
