use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{LedgerError, LedgerResult};

/// Monetary value backed by an arbitrary-precision decimal
///
/// Money can be negative as a raw value; the ledger rejects non-positive
/// amounts at its boundary and never lets a balance drop below zero.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money(Decimal);

impl Money {
    pub const ZERO: Money = Money(Decimal::ZERO);

    pub fn new(value: Decimal) -> Self {
        Self(value)
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    pub fn is_positive(&self) -> bool {
        self.0 > Decimal::ZERO
    }

    pub fn is_negative(&self) -> bool {
        self.0 < Decimal::ZERO
    }

    /// Parse a raw amount and require it to be strictly positive
    pub fn parse_amount(raw: &str) -> LedgerResult<Self> {
        let amount: Money = raw.parse()?;
        amount.ensure_positive()?;
        Ok(amount)
    }

    /// Fail with `InvalidAmount` unless the value is greater than zero
    pub fn ensure_positive(&self) -> LedgerResult<()> {
        if self.is_positive() {
            Ok(())
        } else {
            Err(LedgerError::InvalidAmount(format!(
                "amount must be positive, got {}",
                self.0
            )))
        }
    }

    /// Fee owed on this amount at the given rate, without trailing zeros
    pub fn fee(&self, rate: Decimal) -> LedgerResult<Money> {
        self.0
            .checked_mul(rate)
            .map(|fee| Money(fee.normalize()))
            .ok_or_else(|| LedgerError::InvalidAmount(format!("fee on {} overflows", self.0)))
    }

    pub fn checked_add(self, rhs: Money) -> Option<Money> {
        self.0.checked_add(rhs.0).map(Money)
    }

    pub fn checked_sub(self, rhs: Money) -> Option<Money> {
        self.0.checked_sub(rhs.0).map(Money)
    }

    /// `self + rhs`, failing with `InvalidAmount` instead of overflowing
    pub fn try_add(self, rhs: Money) -> LedgerResult<Money> {
        self.checked_add(rhs)
            .ok_or_else(|| LedgerError::InvalidAmount(format!("{} + {} overflows", self, rhs)))
    }

    /// `self - rhs`, failing with `InvalidAmount` instead of overflowing
    pub fn try_sub(self, rhs: Money) -> LedgerResult<Money> {
        self.checked_sub(rhs)
            .ok_or_else(|| LedgerError::InvalidAmount(format!("{} - {} overflows", self, rhs)))
    }
}

impl FromStr for Money {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        Decimal::from_str(trimmed)
            .map(Money)
            .map_err(|_| LedgerError::InvalidAmount(format!("cannot parse {:?}", trimmed)))
    }
}

impl From<Decimal> for Money {
    fn from(value: Decimal) -> Self {
        Money(value)
    }
}

impl From<Money> for Decimal {
    fn from(value: Money) -> Self {
        value.0
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
