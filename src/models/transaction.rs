use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Money;
use crate::error::{LedgerError, LedgerResult};

/// Sequence number assigned by the processor, starting at 1
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(pub u64);

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tx-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
}

/// Free-text metadata attached to a record
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordMeta {
    pub narration: String,
    pub initiator: String,
}

/// Entry in the transaction log
///
/// `from_account` is `None` for money entering the ledger (deposits) and
/// `to_account` is `None` for money leaving it (withdrawals).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub id: TransactionId,
    pub from_account: Option<String>,
    pub to_account: Option<String>,
    pub amount: Money,
    pub fee: Money,
    pub narration: String,
    pub initiator: String,
    pub timestamp: DateTime<Utc>,
    pub status: TransactionStatus,
}

impl TransactionRecord {
    pub(crate) fn pending(
        id: TransactionId,
        from_account: Option<String>,
        to_account: Option<String>,
        amount: Money,
        fee: Money,
        meta: RecordMeta,
    ) -> Self {
        Self {
            id,
            from_account,
            to_account,
            amount,
            fee,
            narration: meta.narration,
            initiator: meta.initiator,
            timestamp: Utc::now(),
            status: TransactionStatus::Pending,
        }
    }

    /// Move a pending record to a terminal status
    /// A record settles exactly once
    pub fn settle(&mut self, status: TransactionStatus) -> LedgerResult<()> {
        if self.status != TransactionStatus::Pending {
            return Err(LedgerError::InternalInvariantViolation(format!(
                "{} already settled as {:?}",
                self.id, self.status
            )));
        }
        if status == TransactionStatus::Pending {
            return Err(LedgerError::InternalInvariantViolation(format!(
                "{} cannot settle back to pending",
                self.id
            )));
        }
        self.status = status;
        Ok(())
    }

    /// Total taken from the sending side
    pub fn debited(&self) -> LedgerResult<Money> {
        self.amount.try_add(self.fee)
    }
}
