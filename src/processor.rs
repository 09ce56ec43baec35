use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, MutexGuard};
use tracing::debug;

use crate::config::LedgerConfig;
use crate::error::{LedgerError, LedgerResult};
use crate::models::{
    Account, AccountStatus, Money, RecordMeta, TransactionId, TransactionRecord,
    TransactionStatus,
};
use crate::store::{InMemoryLedgerStore, LedgerStore};

/// Balances and transaction log guarded by the processor lock
///
/// Every mutation appends a `Pending` record and re-checks the conservation
/// law: the sum of all balances must equal opening balances plus deposits
/// minus withdrawals minus fees routed out of the ledger.
#[derive(Debug, Default)]
pub struct LedgerState {
    accounts: HashMap<String, Account>,
    transactions: Vec<TransactionRecord>,
    /// References of committed payments
    references: HashSet<String>,
    /// What the balances must add up to
    expected_total: Money,
}

impl LedgerState {
    pub fn account(&self, id: &str) -> LedgerResult<&Account> {
        self.accounts
            .get(id)
            .ok_or_else(|| LedgerError::AccountNotFound(id.to_string()))
    }

    /// Ledger balance of an account
    pub fn balance(&self, id: &str) -> LedgerResult<Money> {
        self.account(id).map(Account::balance)
    }

    pub fn total_balance(&self) -> LedgerResult<Money> {
        self.accounts
            .values()
            .try_fold(Money::ZERO, |total, account| {
                total.checked_add(account.balance())
            })
            .ok_or_else(|| {
                LedgerError::InternalInvariantViolation("sum of balances overflows".to_string())
            })
    }

    pub fn record(&self, id: TransactionId) -> LedgerResult<&TransactionRecord> {
        record_index(id)
            .and_then(|index| self.transactions.get(index))
            .ok_or_else(|| missing_record(id))
    }

    pub fn has_reference(&self, reference: &str) -> bool {
        self.references.contains(reference)
    }

    pub(crate) fn remember_reference(&mut self, reference: String) {
        self.references.insert(reference);
    }

    pub(crate) fn add_account(&mut self, id: &str, opening_balance: Money) -> LedgerResult<()> {
        if self.accounts.contains_key(id) {
            return Err(LedgerError::DuplicateAccount(id.to_string()));
        }
        let account = Account::new(id, opening_balance)?;
        self.expected_total = self.expected_total.try_add(opening_balance)?;
        self.accounts.insert(id.to_string(), account);
        Ok(())
    }

    /// Drop an account that was just added and has no history
    pub(crate) fn remove_account(&mut self, id: &str) -> LedgerResult<()> {
        let account = self
            .accounts
            .remove(id)
            .ok_or_else(|| LedgerError::AccountNotFound(id.to_string()))?;
        self.expected_total = self
            .expected_total
            .try_sub(account.balance())
            .map_err(invariant)?;
        Ok(())
    }

    /// Change the status of an account, returning the previous one
    pub(crate) fn set_status(
        &mut self,
        id: &str,
        status: AccountStatus,
    ) -> LedgerResult<AccountStatus> {
        let account = self.account_mut(id)?;
        let previous = account.status();
        account.set_status(status);
        Ok(previous)
    }

    pub(crate) fn apply_deposit(
        &mut self,
        id: &str,
        amount: Money,
        meta: RecordMeta,
    ) -> LedgerResult<TransactionRecord> {
        amount.ensure_positive()?;
        let expected_total = self.expected_total.try_add(amount)?;
        self.account_mut(id)?.credit(amount)?;
        self.expected_total = expected_total;

        let record = self.append(None, Some(id), amount, Money::ZERO, meta);
        self.verify_conservation(record.id)?;
        Ok(record)
    }

    pub(crate) fn apply_withdraw(
        &mut self,
        id: &str,
        amount: Money,
        meta: RecordMeta,
    ) -> LedgerResult<TransactionRecord> {
        amount.ensure_positive()?;
        let expected_total = self.expected_total.try_sub(amount)?;
        self.account_mut(id)?.debit(amount)?;
        self.expected_total = expected_total;

        let record = self.append(Some(id), None, amount, Money::ZERO, meta);
        self.verify_conservation(record.id)?;
        Ok(record)
    }

    /// Withdraw `amount + fee` from `from`, then deposit `amount` into `to`
    ///
    /// If the deposit step fails the withdrawal is undone and the cause is
    /// wrapped in `TransferRolledBack`. The fee leaves the ledger.
    pub(crate) fn apply_transfer(
        &mut self,
        from: &str,
        to: &str,
        amount: Money,
        fee: Money,
        meta: RecordMeta,
    ) -> LedgerResult<TransactionRecord> {
        amount.ensure_positive()?;
        if fee.is_negative() {
            return Err(LedgerError::InvalidAmount(format!(
                "fee cannot be negative, got {}",
                fee
            )));
        }
        if from == to {
            return Err(LedgerError::SameAccount(from.to_string()));
        }

        let debited = amount.try_add(fee)?;
        let expected_total = self.expected_total.try_sub(fee)?;
        self.account_mut(from)?.debit(debited)?;

        if let Err(cause) = self.account_mut(to).and_then(|account| account.credit(amount)) {
            self.compensation_target(from)?.reverse_debit(debited)?;
            debug!(from, to, %amount, error = %cause, "transfer rolled back");
            return Err(LedgerError::TransferRolledBack(Box::new(cause)));
        }
        self.expected_total = expected_total;

        let record = self.append(Some(from), Some(to), amount, fee, meta);
        self.verify_conservation(record.id)?;
        Ok(record)
    }

    /// Undo the balance effects of a pending record and mark it failed
    pub(crate) fn revert(&mut self, id: TransactionId) -> LedgerResult<()> {
        let record = self.record(id)?.clone();
        if record.status != TransactionStatus::Pending {
            return Err(LedgerError::InternalInvariantViolation(format!(
                "cannot revert {} in state {:?}",
                id, record.status
            )));
        }

        let debited = record.debited().map_err(invariant)?;
        let mut expected_total = self.expected_total.try_add(record.fee).map_err(invariant)?;
        expected_total = match (&record.from_account, &record.to_account) {
            (None, Some(_)) => expected_total.try_sub(record.amount),
            (Some(_), None) => expected_total.try_add(record.amount),
            _ => Ok(expected_total),
        }
        .map_err(invariant)?;

        if let Some(to) = &record.to_account {
            self.compensation_target(to)?.reverse_credit(record.amount)?;
        }
        if let Some(from) = &record.from_account {
            self.compensation_target(from)?
                .reverse_debit(debited)
                .map_err(invariant)?;
        }
        self.expected_total = expected_total;

        self.record_mut(id)?.settle(TransactionStatus::Failed)
    }

    /// Settle a pending record and return a copy of it
    pub(crate) fn settle(
        &mut self,
        id: TransactionId,
        status: TransactionStatus,
    ) -> LedgerResult<TransactionRecord> {
        let record = self.record_mut(id)?;
        record.settle(status)?;
        Ok(record.clone())
    }

    fn append(
        &mut self,
        from: Option<&str>,
        to: Option<&str>,
        amount: Money,
        fee: Money,
        meta: RecordMeta,
    ) -> TransactionRecord {
        let id = TransactionId(self.transactions.len() as u64 + 1);
        let record = TransactionRecord::pending(
            id,
            from.map(str::to_string),
            to.map(str::to_string),
            amount,
            fee,
            meta,
        );
        self.transactions.push(record.clone());
        record
    }

    fn verify_conservation(&mut self, id: TransactionId) -> LedgerResult<()> {
        let expected = self.expected_total;
        let detail = match self.total_balance() {
            Ok(total) if total == expected => return Ok(()),
            Ok(total) => format!("balances sum to {} after {}, expected {}", total, id, expected),
            Err(err) => format!("cannot total balances after {}: {}", id, err),
        };
        self.revert(id)?;
        Err(LedgerError::InternalInvariantViolation(detail))
    }

    fn account_mut(&mut self, id: &str) -> LedgerResult<&mut Account> {
        self.accounts
            .get_mut(id)
            .ok_or_else(|| LedgerError::AccountNotFound(id.to_string()))
    }

    fn compensation_target(&mut self, id: &str) -> LedgerResult<&mut Account> {
        self.accounts.get_mut(id).ok_or_else(|| {
            LedgerError::InternalInvariantViolation(format!(
                "account {} vanished during compensation",
                id
            ))
        })
    }

    fn record_mut(&mut self, id: TransactionId) -> LedgerResult<&mut TransactionRecord> {
        record_index(id)
            .and_then(|index| self.transactions.get_mut(index))
            .ok_or_else(|| missing_record(id))
    }
}

fn record_index(id: TransactionId) -> Option<usize> {
    (id.0 as usize).checked_sub(1)
}

fn missing_record(id: TransactionId) -> LedgerError {
    LedgerError::InternalInvariantViolation(format!("unknown transaction {}", id))
}

/// Arithmetic on amounts already in the ledger cannot overflow unless the
/// books are corrupt
fn invariant(err: LedgerError) -> LedgerError {
    LedgerError::InternalInvariantViolation(err.to_string())
}

/// In-memory authoritative store of account balances
///
/// All balances and the transaction log live in a single [`LedgerState`]
/// behind one async mutex owned by the processor. Every mutation and every
/// read goes through that lock, so no two operations can interleave a
/// read-modify-write on the same balance.
///
/// Opening an account or changing its status is mirrored to the processor's
/// [`LedgerStore`] under the same lock, so the account directory the payment
/// validator reads always matches the ledger. A store failure undoes the
/// in-memory change. Without an explicit store the processor keeps an
/// [`InMemoryLedgerStore`].
///
/// # Lock Timeout
///
/// If a lock timeout is configured, operations that cannot acquire the lock
/// in time fail with [`LedgerError::Timeout`] without applying anything.
///
/// # Example
///
/// ```
/// use ledger_core::models::Money;
/// use ledger_core::processor::TransactionProcessor;
/// use rust_decimal_macros::dec;
///
/// # #[tokio::main]
/// # async fn main() {
/// let processor = TransactionProcessor::new();
/// processor.add_account("alice", Money::new(dec!(100))).await.unwrap();
/// processor.add_account("bob", Money::ZERO).await.unwrap();
///
/// processor
///     .transfer("alice", "bob", Money::new(dec!(40)))
///     .await
///     .unwrap();
///
/// assert_eq!(processor.balance("alice").await.unwrap(), Money::new(dec!(60)));
/// assert_eq!(processor.balance("bob").await.unwrap(), Money::new(dec!(40)));
/// # }
/// ```
pub struct TransactionProcessor {
    state: Mutex<LedgerState>,
    store: Arc<dyn LedgerStore>,
    lock_timeout: Option<Duration>,
}

impl Default for TransactionProcessor {
    fn default() -> Self {
        Self {
            state: Mutex::default(),
            store: Arc::new(InMemoryLedgerStore::new()),
            lock_timeout: None,
        }
    }
}

impl fmt::Debug for TransactionProcessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionProcessor")
            .field("state", &self.state)
            .field("lock_timeout", &self.lock_timeout)
            .finish_non_exhaustive()
    }
}

impl TransactionProcessor {
    /// Create an empty processor that waits for the lock indefinitely
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &LedgerConfig) -> Self {
        Self::new().with_lock_timeout(config.lock_timeout)
    }

    pub fn with_lock_timeout(mut self, lock_timeout: Option<Duration>) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }

    /// Mirror account changes to `store` instead of a private in-memory one
    pub fn with_store(mut self, store: Arc<dyn LedgerStore>) -> Self {
        self.store = store;
        self
    }

    pub fn lock_timeout(&self) -> Option<Duration> {
        self.lock_timeout
    }

    pub fn store(&self) -> &Arc<dyn LedgerStore> {
        &self.store
    }

    /// Acquire the ledger lock, giving up after `timeout`
    pub(crate) async fn lock(
        &self,
        timeout: Option<Duration>,
    ) -> LedgerResult<MutexGuard<'_, LedgerState>> {
        match timeout {
            Some(limit) => tokio::time::timeout(limit, self.state.lock())
                .await
                .map_err(|_| LedgerError::Timeout(limit)),
            None => Ok(self.state.lock().await),
        }
    }

    /// Open an active account with the given balance and record it in the store
    pub async fn add_account(&self, id: &str, opening_balance: Money) -> LedgerResult<()> {
        let mut ledger = self.lock(self.lock_timeout).await?;
        ledger.add_account(id, opening_balance)?;
        let account = ledger.account(id)?.clone();

        if let Err(err) = self.store.save_account(&account).await {
            ledger.remove_account(id)?;
            return Err(err.into());
        }
        debug!(account = id, %opening_balance, "account added");
        Ok(())
    }

    /// Change an account's status in the ledger and the store
    pub async fn set_status(&self, id: &str, status: AccountStatus) -> LedgerResult<()> {
        let mut ledger = self.lock(self.lock_timeout).await?;
        let previous = ledger.set_status(id, status)?;
        let account = ledger.account(id)?.clone();

        if let Err(err) = self.store.save_account(&account).await {
            ledger.set_status(id, previous)?;
            return Err(err.into());
        }
        debug!(account = id, %previous, %status, "account status changed");
        Ok(())
    }

    pub async fn deposit(&self, id: &str, amount: Money) -> LedgerResult<TransactionRecord> {
        let mut ledger = self.lock(self.lock_timeout).await?;
        let pending = ledger.apply_deposit(id, amount, RecordMeta::default())?;
        let record = ledger.settle(pending.id, TransactionStatus::Completed)?;
        debug!(tx = %record.id, account = id, %amount, "deposit applied");
        Ok(record)
    }

    pub async fn withdraw(&self, id: &str, amount: Money) -> LedgerResult<TransactionRecord> {
        let mut ledger = self.lock(self.lock_timeout).await?;
        let pending = ledger.apply_withdraw(id, amount, RecordMeta::default())?;
        let record = ledger.settle(pending.id, TransactionStatus::Completed)?;
        debug!(tx = %record.id, account = id, %amount, "withdrawal applied");
        Ok(record)
    }

    /// Move `amount` from one account to another
    ///
    /// Either both balances change or neither does: a failure on the
    /// receiving side is reported as `TransferRolledBack` after the debit has
    /// been undone.
    pub async fn transfer(
        &self,
        from: &str,
        to: &str,
        amount: Money,
    ) -> LedgerResult<TransactionRecord> {
        let mut ledger = self.lock(self.lock_timeout).await?;
        let pending = ledger.apply_transfer(from, to, amount, Money::ZERO, RecordMeta::default())?;
        let record = ledger.settle(pending.id, TransactionStatus::Completed)?;
        debug!(tx = %record.id, from, to, %amount, "transfer applied");
        Ok(record)
    }

    pub async fn balance(&self, id: &str) -> LedgerResult<Money> {
        self.lock(self.lock_timeout).await?.balance(id)
    }

    /// Snapshot of a single account
    pub async fn account(&self, id: &str) -> LedgerResult<Account> {
        self.lock(self.lock_timeout).await?.account(id).cloned()
    }

    /// Snapshot of all accounts, sorted by id
    pub async fn accounts(&self) -> LedgerResult<Vec<Account>> {
        let ledger = self.lock(self.lock_timeout).await?;
        let mut accounts: Vec<Account> = ledger.accounts.values().cloned().collect();
        accounts.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(accounts)
    }

    /// Copy of the transaction log, oldest first
    pub async fn transactions(&self) -> LedgerResult<Vec<TransactionRecord>> {
        Ok(self.lock(self.lock_timeout).await?.transactions.clone())
    }

    pub async fn total_balance(&self) -> LedgerResult<Money> {
        self.lock(self.lock_timeout).await?.total_balance()
    }
}
