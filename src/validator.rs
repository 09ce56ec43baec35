use std::fmt;
use std::sync::Arc;

use rust_decimal::Decimal;

use crate::config::LedgerConfig;
use crate::error::{LedgerError, LedgerResult};
use crate::models::{Money, PaymentKind, PaymentRequest};
use crate::processor::LedgerState;
use crate::store::LedgerStore;

/// Account and bank parts of a compound identifier such as `alice@bank01`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    pub account_id: String,
    pub bank_id: String,
    /// Delimiter the identifier was parsed with
    pub delimiter: char,
}

impl fmt::Display for Participant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.account_id, self.delimiter, self.bank_id)
    }
}

/// Split a compound identifier on the first `delimiter`
pub fn parse_participant(raw: &str, delimiter: char) -> LedgerResult<Participant> {
    let malformed = || LedgerError::MalformedParticipant(raw.to_string());
    let (account, bank) = raw.trim().split_once(delimiter).ok_or_else(malformed)?;
    let (account, bank) = (account.trim(), bank.trim());
    if account.is_empty() || bank.is_empty() {
        return Err(malformed());
    }
    Ok(Participant {
        account_id: account.to_string(),
        bank_id: bank.to_string(),
        delimiter,
    })
}

/// A request that passed every check, ready to be applied
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedPayment {
    pub kind: PaymentKind,
    pub sender: Participant,
    pub receiver: Participant,
    /// Account debited, `None` for deposits from outside the ledger
    pub payer: Option<String>,
    /// Account credited
    pub payee: String,
    pub amount: Money,
    pub fee: Money,
}

/// Pre-flight checks run before a payment touches any balance
///
/// The checks always run in the same order and stop at the first failure:
///
/// 1. parse sender
/// 2. parse receiver
/// 3. receiver exists
/// 4. sender is active
/// 5. amount parses and is positive
/// 6. payer can cover amount plus fee
///
/// For credits and full-access transfers the payer is the sender; a debit
/// pulls funds from the receiver, who pays. Deposits come from outside the
/// ledger, so steps 4 and 6 are skipped. Conditions not covered here, such as
/// an inactive paying receiver on a debit, are refused by the ledger itself
/// while the payment is applied.
pub struct PaymentValidator {
    store: Arc<dyn LedgerStore>,
    delimiter: char,
    fee_rate: Decimal,
}

impl PaymentValidator {
    pub fn new(store: Arc<dyn LedgerStore>, config: &LedgerConfig) -> Self {
        Self {
            store,
            delimiter: config.participant_delimiter,
            fee_rate: config.fee_rate,
        }
    }

    pub fn parse_participant(&self, raw: &str) -> LedgerResult<Participant> {
        parse_participant(raw, self.delimiter)
    }

    pub async fn check_exists(&self, account_id: &str) -> LedgerResult<bool> {
        Ok(self.store.exists(account_id).await?)
    }

    pub async fn check_active(&self, account_id: &str) -> LedgerResult<bool> {
        Ok(self.store.is_active(account_id).await?)
    }

    /// Compare the ledger balance (no overdraft) against `amount`
    pub fn check_sufficient_funds(
        &self,
        ledger: &LedgerState,
        account_id: &str,
        amount: Money,
    ) -> LedgerResult<bool> {
        Ok(ledger.balance(account_id)? >= amount)
    }

    pub fn fee_for(&self, kind: PaymentKind, amount: Money) -> LedgerResult<Money> {
        if kind.charges_fee() {
            amount.fee(self.fee_rate)
        } else {
            Ok(Money::ZERO)
        }
    }

    pub async fn validate(
        &self,
        request: &PaymentRequest,
        ledger: &LedgerState,
    ) -> LedgerResult<ValidatedPayment> {
        let sender = self.parse_participant(&request.sender)?;
        let receiver = self.parse_participant(&request.receiver)?;

        if !self.check_exists(&receiver.account_id).await? {
            return Err(LedgerError::AccountNotFound(receiver.account_id));
        }

        if request.kind != PaymentKind::Deposit && !self.check_active(&sender.account_id).await? {
            return Err(LedgerError::AccountInactive(sender.account_id));
        }

        let amount = Money::parse_amount(&request.amount)?;
        let fee = self.fee_for(request.kind, amount)?;

        let (payer, payee) = match request.kind {
            PaymentKind::Credit | PaymentKind::FullAccessTransfer => {
                (Some(sender.account_id.clone()), receiver.account_id.clone())
            }
            PaymentKind::Debit => (Some(receiver.account_id.clone()), sender.account_id.clone()),
            PaymentKind::Deposit => (None, receiver.account_id.clone()),
        };

        if let Some(payer) = &payer {
            let needed = amount.try_add(fee)?;
            if !self.check_sufficient_funds(ledger, payer, needed)? {
                return Err(LedgerError::InsufficientFunds {
                    account: payer.clone(),
                    needed,
                    available: ledger.balance(payer)?,
                });
            }
        }

        Ok(ValidatedPayment {
            kind: request.kind,
            sender,
            receiver,
            payer,
            payee,
            amount,
            fee,
        })
    }
}
