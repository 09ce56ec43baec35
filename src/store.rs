use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::StoreError;
use crate::models::{Account, AccountStatus, Money, TransactionRecord};

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Durable side of the ledger
///
/// The processor keeps balances in memory and talks to the store for
/// everything that must outlive the process: the account directory, the
/// committed transaction records and the collected fees.
///
/// # Call Contract
///
/// During a payment the store is called while the ledger lock is held:
///
/// 1. `exists` / `is_active` during validation
/// 2. `credit_fee` once the balances are updated (only for a non-zero fee)
/// 3. `persist` with the record in its `Completed` state
///
/// A failure in step 2 or 3 makes the payment processor undo the balance
/// change, and `refund_fee` is called if step 2 had already succeeded.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Whether the account is known to the directory
    async fn exists(&self, account_id: &str) -> StoreResult<bool>;

    /// Whether the account is known and active; unknown accounts are not active
    async fn is_active(&self, account_id: &str) -> StoreResult<bool>;

    /// Record the current state of an account in the directory
    async fn save_account(&self, account: &Account) -> StoreResult<()>;

    /// Persist a committed transaction record
    async fn persist(&self, record: &TransactionRecord) -> StoreResult<()>;

    /// Credit a collected fee to the fee-collection account
    async fn credit_fee(&self, amount: Money) -> StoreResult<()>;

    /// Reverse a previous `credit_fee`
    async fn refund_fee(&self, amount: Money) -> StoreResult<()>;
}

/// In-memory store
///
/// Keeps the directory, the records and the fee total behind async locks so
/// it can be shared between tasks. Nothing survives a restart.
#[derive(Debug, Default)]
pub struct InMemoryLedgerStore {
    directory: RwLock<HashMap<String, AccountStatus>>,
    records: RwLock<Vec<TransactionRecord>>,
    fees: RwLock<Money>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records persisted so far, in persistence order
    pub async fn records(&self) -> Vec<TransactionRecord> {
        self.records.read().await.clone()
    }

    /// Total fees credited minus refunds
    pub async fn fees_collected(&self) -> Money {
        *self.fees.read().await
    }

    pub async fn status_of(&self, account_id: &str) -> Option<AccountStatus> {
        self.directory.read().await.get(account_id).copied()
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn exists(&self, account_id: &str) -> StoreResult<bool> {
        Ok(self.directory.read().await.contains_key(account_id))
    }

    async fn is_active(&self, account_id: &str) -> StoreResult<bool> {
        Ok(self.status_of(account_id).await == Some(AccountStatus::Active))
    }

    async fn save_account(&self, account: &Account) -> StoreResult<()> {
        self.directory
            .write()
            .await
            .insert(account.id.clone(), account.status());
        Ok(())
    }

    async fn persist(&self, record: &TransactionRecord) -> StoreResult<()> {
        self.records.write().await.push(record.clone());
        Ok(())
    }

    async fn credit_fee(&self, amount: Money) -> StoreResult<()> {
        let mut fees = self.fees.write().await;
        *fees = fees
            .checked_add(amount)
            .ok_or_else(|| StoreError::Unavailable(format!("fee total overflows adding {}", amount)))?;
        Ok(())
    }

    async fn refund_fee(&self, amount: Money) -> StoreResult<()> {
        let mut fees = self.fees.write().await;
        if *fees < amount {
            return Err(StoreError::Unavailable(format!(
                "cannot refund {} from collected fees of {}",
                amount, *fees
            )));
        }
        *fees = fees.checked_sub(amount).ok_or_else(|| {
            StoreError::Unavailable(format!("cannot refund {} from collected fees", amount))
        })?;
        Ok(())
    }
}
