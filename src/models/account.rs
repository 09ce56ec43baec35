use std::fmt;

use serde::{Deserialize, Serialize};

use super::Money;
use crate::error::{LedgerError, LedgerResult};

/// Lifecycle status of an account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    Active,
    Inactive,
    Closed,
}

impl fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AccountStatus::Active => "active",
            AccountStatus::Inactive => "inactive",
            AccountStatus::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Account state
///
/// The balance is the ledger balance (no holds or overdraft) and can only be
/// changed through the methods below, which never let it go negative.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Account {
    #[serde(rename = "account")]
    pub id: String,
    balance: Money,
    status: AccountStatus,
}

impl Account {
    /// Create an active account with the given opening balance
    pub fn new(id: impl Into<String>, opening_balance: Money) -> LedgerResult<Self> {
        let id = id.into();
        if opening_balance.is_negative() {
            return Err(LedgerError::InvalidAmount(format!(
                "opening balance of {} cannot be negative",
                id
            )));
        }
        Ok(Self {
            id,
            balance: opening_balance,
            status: AccountStatus::Active,
        })
    }

    pub fn balance(&self) -> Money {
        self.balance
    }

    pub fn status(&self) -> AccountStatus {
        self.status
    }

    pub fn is_active(&self) -> bool {
        self.status == AccountStatus::Active
    }

    pub fn set_status(&mut self, status: AccountStatus) {
        self.status = status;
    }

    /// Add funds to the balance
    pub fn credit(&mut self, amount: Money) -> LedgerResult<()> {
        amount.ensure_positive()?;
        self.ensure_active()?;
        self.balance = self.add_checked(amount)?;
        Ok(())
    }

    /// Remove funds from the balance
    /// Fails without touching the balance if the account cannot cover the amount
    pub fn debit(&mut self, amount: Money) -> LedgerResult<()> {
        amount.ensure_positive()?;
        self.ensure_active()?;
        if self.balance < amount {
            return Err(LedgerError::InsufficientFunds {
                account: self.id.clone(),
                needed: amount,
                available: self.balance,
            });
        }
        self.balance = self.balance.try_sub(amount)?;
        Ok(())
    }

    /// Undo an earlier debit, regardless of the current status
    pub(crate) fn reverse_debit(&mut self, amount: Money) -> LedgerResult<()> {
        self.balance = self.add_checked(amount)?;
        Ok(())
    }

    /// Undo an earlier credit, regardless of the current status
    pub(crate) fn reverse_credit(&mut self, amount: Money) -> LedgerResult<()> {
        if self.balance < amount {
            return Err(LedgerError::InternalInvariantViolation(format!(
                "reversing credit of {} would leave {} negative",
                amount, self.id
            )));
        }
        self.balance = self.balance.try_sub(amount)?;
        Ok(())
    }

    fn ensure_active(&self) -> LedgerResult<()> {
        if self.is_active() {
            Ok(())
        } else {
            Err(LedgerError::AccountInactive(self.id.clone()))
        }
    }

    fn add_checked(&self, amount: Money) -> LedgerResult<Money> {
        self.balance.checked_add(amount).ok_or_else(|| {
            LedgerError::InvalidAmount(format!("balance of {} would overflow", self.id))
        })
    }
}
