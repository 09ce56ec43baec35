#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ledger_core::config::LedgerConfig;
use ledger_core::error::StoreError;
use ledger_core::models::{Account, Money, TransactionRecord};
use ledger_core::payment::PaymentProcessor;
use ledger_core::processor::TransactionProcessor;
use ledger_core::store::{InMemoryLedgerStore, LedgerStore, StoreResult};
use rust_decimal::Decimal;

/// Helper to wrap a decimal literal
pub fn money(value: Decimal) -> Money {
    Money::new(value)
}

/// Store that can be told to fail or stall individual calls
#[derive(Debug, Default)]
pub struct FlakyStore {
    pub inner: InMemoryLedgerStore,
    pub fail_lookups: AtomicBool,
    pub fail_save: AtomicBool,
    pub fail_persist: AtomicBool,
    pub fail_fee: AtomicBool,
    pub fail_refund: AtomicBool,
    pub lookup_delay_ms: AtomicU64,
}

impl FlakyStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set(flag: &AtomicBool, value: bool) {
        flag.store(value, Ordering::SeqCst);
    }

    fn check(flag: &AtomicBool, what: &str) -> StoreResult<()> {
        if flag.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable(format!("{} failed", what)))
        } else {
            Ok(())
        }
    }

    async fn stall(&self) {
        let delay = self.lookup_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
    }
}

#[async_trait]
impl LedgerStore for FlakyStore {
    async fn exists(&self, account_id: &str) -> StoreResult<bool> {
        self.stall().await;
        Self::check(&self.fail_lookups, "exists")?;
        self.inner.exists(account_id).await
    }

    async fn is_active(&self, account_id: &str) -> StoreResult<bool> {
        Self::check(&self.fail_lookups, "is_active")?;
        self.inner.is_active(account_id).await
    }

    async fn save_account(&self, account: &Account) -> StoreResult<()> {
        Self::check(&self.fail_save, "save_account")?;
        self.inner.save_account(account).await
    }

    async fn persist(&self, record: &TransactionRecord) -> StoreResult<()> {
        Self::check(&self.fail_persist, "persist")?;
        self.inner.persist(record).await
    }

    async fn credit_fee(&self, amount: Money) -> StoreResult<()> {
        Self::check(&self.fail_fee, "credit_fee")?;
        self.inner.credit_fee(amount).await
    }

    async fn refund_fee(&self, amount: Money) -> StoreResult<()> {
        Self::check(&self.fail_refund, "refund_fee")?;
        self.inner.refund_fee(amount).await
    }
}

/// A payment processor over a fresh ledger and a controllable store
pub struct Harness {
    pub processor: Arc<TransactionProcessor>,
    pub store: Arc<FlakyStore>,
    pub payments: PaymentProcessor,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(LedgerConfig::default())
    }

    pub fn with_config(config: LedgerConfig) -> Self {
        let store = FlakyStore::new();
        let processor =
            Arc::new(TransactionProcessor::from_config(&config).with_store(store.clone()));
        let payments = PaymentProcessor::new(processor.clone(), &config);
        Self {
            processor,
            store,
            payments,
        }
    }

    /// Open accounts with the given opening balances
    pub async fn open(&self, accounts: &[(&str, Decimal)]) {
        for (id, balance) in accounts {
            self.processor
                .add_account(id, Money::new(*balance))
                .await
                .unwrap();
        }
    }

    pub async fn balance(&self, id: &str) -> Money {
        self.processor.balance(id).await.unwrap()
    }
}

/// Process a CSV string through the driver and return the output
pub async fn process_csv_string(csv_input: &str) -> Result<String, Box<dyn std::error::Error>> {
    let mut output = Vec::new();
    ledger_core::process_commands(csv_input.as_bytes(), &mut output, &LedgerConfig::default())
        .await?;
    Ok(String::from_utf8(output)?)
}

/// Create a command CSV from (type, account, counterparty, amount) rows
pub fn build_csv(commands: &[(&str, &str, &str, &str)]) -> String {
    let mut csv = String::from("type,account,counterparty,amount,narration\n");

    for (command_type, account, counterparty, amount) in commands {
        csv.push_str(&format!(
            "{},{},{},{},\n",
            command_type, account, counterparty, amount
        ));
    }

    csv
}

/// Assert that the output has a row for `account` with the given balance and status
pub fn assert_account_row(output: &str, account: &str, balance: &str, status: &str) {
    let expected = format!("{},{},{}", account, balance, status);
    assert!(
        output.lines().any(|line| line == expected),
        "Expected output to contain {:?}\nActual output:\n{}",
        expected,
        output
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_csv() {
        let csv = build_csv(&[("open", "alice", "", "100"), ("deposit", "alice", "", "5")]);

        assert!(csv.starts_with("type,account,counterparty,amount,narration\n"));
        assert!(csv.contains("open,alice,,100,\n"));
        assert!(csv.contains("deposit,alice,,5,\n"));
    }
}
