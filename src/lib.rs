pub mod config;
pub mod error;
pub mod models;
pub mod payment;
pub mod processor;
pub mod store;
pub mod validator;

use std::io::{Read, Write};
use std::sync::Arc;

use tracing::warn;

use config::LedgerConfig;
use error::{LedgerError, LedgerResult, Result};
use models::{Account, AccountStatus, Command, CommandType, Money, PaymentKind, PaymentRequest};
use payment::PaymentProcessor;
use processor::TransactionProcessor;

/// Replay ledger commands from a CSV reader and write final balances to a CSV writer
pub async fn process_commands<R: Read, W: Write>(
    reader: R,
    writer: W,
    config: &LedgerConfig,
) -> Result<()> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);

    let processor = Arc::new(TransactionProcessor::from_config(config));
    let payments = PaymentProcessor::new(processor.clone(), config);

    for (line, result) in csv_reader.deserialize::<Command>().enumerate() {
        match result {
            Ok(command) => {
                if let Err(err) = apply_command(&payments, &command).await {
                    warn!(
                        line = line + 2,
                        command = ?command.command_type,
                        account = %command.account,
                        code = err.code(),
                        "command rejected: {}",
                        err
                    );
                }
            }
            Err(err) => {
                // Skip malformed rows
                warn!(line = line + 2, %err, "malformed command");
            }
        }
    }

    let accounts = processor.accounts().await?;
    write_accounts(accounts, writer)?;

    Ok(())
}

/// Apply a single command against the ledger
pub async fn apply_command(payments: &PaymentProcessor, command: &Command) -> LedgerResult<()> {
    let processor = payments.processor();
    let account = command.account.as_str();

    match command.command_type {
        CommandType::Open => {
            let opening = match &command.amount {
                Some(raw) => raw.parse()?,
                None => Money::ZERO,
            };
            processor.add_account(account, opening).await
        }
        CommandType::Deposit => processor
            .deposit(account, amount_of(command)?)
            .await
            .map(|_| ()),
        CommandType::Withdraw => processor
            .withdraw(account, amount_of(command)?)
            .await
            .map(|_| ()),
        CommandType::Transfer => {
            // An absent counterparty is an empty identifier, as for payments
            let to = command
                .counterparty
                .as_deref()
                .ok_or_else(|| LedgerError::MalformedParticipant(String::new()))?;
            processor
                .transfer(account, to, amount_of(command)?)
                .await
                .map(|_| ())
        }
        CommandType::Activate => processor.set_status(account, AccountStatus::Active).await,
        CommandType::Deactivate => processor.set_status(account, AccountStatus::Inactive).await,
        CommandType::Close => processor.set_status(account, AccountStatus::Closed).await,
        CommandType::Credit => submit_payment(payments, command, PaymentKind::Credit).await,
        CommandType::Debit => submit_payment(payments, command, PaymentKind::Debit).await,
        CommandType::FullAccess => {
            submit_payment(payments, command, PaymentKind::FullAccessTransfer).await
        }
        CommandType::PayIn => submit_payment(payments, command, PaymentKind::Deposit).await,
    }
}

async fn submit_payment(
    payments: &PaymentProcessor,
    command: &Command,
    kind: PaymentKind,
) -> LedgerResult<()> {
    let request = PaymentRequest::new(
        kind,
        command.account.clone(),
        command.counterparty.clone().unwrap_or_default(),
        command.amount.clone().unwrap_or_default(),
    )
    .with_narration(command.narration.clone())
    .with_initiator("batch");

    payments
        .submit(request)
        .await
        .map(|_| ())
        .map_err(|err| err.error)
}

fn amount_of(command: &Command) -> LedgerResult<Money> {
    command
        .amount
        .as_deref()
        .ok_or_else(|| LedgerError::InvalidAmount("missing amount".to_string()))?
        .parse()
}

/// Write account balances to CSV
fn write_accounts<W: Write>(accounts: Vec<Account>, writer: W) -> Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);

    for account in accounts {
        csv_writer.serialize(account)?;
    }

    csv_writer.flush()?;
    Ok(())
}
