mod common;

use std::fs::File;
use std::io::Write;

use common::{assert_account_row, build_csv, process_csv_string, Harness};
use ledger_core::config::LedgerConfig;
use ledger_core::error::LedgerError;
use ledger_core::models::{Command, CommandType};
use ledger_core::{apply_command, process_commands};
use rust_decimal_macros::dec;

#[tokio::test]
async fn test_reference_scenario_fixture() {
    // A and B open, deposit/withdraw/transfer, then an overdraw attempt on B
    // and a deposit to an unknown account, both skipped
    let input = File::open("tests/fixtures/reference_scenario.csv").unwrap();
    let mut output = Vec::new();

    process_commands(input, &mut output, &LedgerConfig::default())
        .await
        .unwrap();

    let output_str = String::from_utf8(output).unwrap();
    println!("Reference scenario output:\n{}", output_str);

    assert!(output_str.starts_with("account,balance,status\n"));
    assert_account_row(&output_str, "A", "1200.00", "active");
    assert_account_row(&output_str, "B", "600.00", "active");
    assert!(!output_str.contains("\nC,"));
}

#[tokio::test]
async fn test_payments_fixture() {
    let input = File::open("tests/fixtures/payments.csv").unwrap();
    let mut output = Vec::new();

    process_commands(input, &mut output, &LedgerConfig::default())
        .await
        .unwrap();

    let output_str = String::from_utf8(output).unwrap();

    // alice: 1000 - (300 + 0.03 fee) - 100 full access
    assert_account_row(&output_str, "alice", "599.97", "active");
    // bob: 300 credit + 20 pulled from carol + 5.5 pay-in, then closed
    assert_account_row(&output_str, "bob", "325.5", "closed");
    // carol: 50 - (20 + 0.002 fee) + 100, then deactivated
    assert_account_row(&output_str, "carol", "129.998", "inactive");
}

#[tokio::test]
async fn test_output_sorted_by_account() {
    let csv = build_csv(&[
        ("open", "zed", "", "1"),
        ("open", "amy", "", "2"),
        ("open", "mo", "", "3"),
    ]);

    let output = process_csv_string(&csv).await.unwrap();
    let accounts: Vec<&str> = output
        .lines()
        .skip(1)
        .filter_map(|line| line.split(',').next())
        .collect();

    assert_eq!(accounts, vec!["amy", "mo", "zed"]);
}

#[tokio::test]
async fn test_duplicate_open_keeps_first_balance() {
    let csv = build_csv(&[("open", "amy", "", "10"), ("open", "amy", "", "99")]);

    let output = process_csv_string(&csv).await.unwrap();

    assert_account_row(&output, "amy", "10", "active");
}

#[tokio::test]
async fn test_open_without_amount_starts_at_zero() {
    let csv = build_csv(&[("open", "amy", "", ""), ("deposit", "amy", "", "4.25")]);

    let output = process_csv_string(&csv).await.unwrap();

    assert_account_row(&output, "amy", "4.25", "active");
}

#[tokio::test]
async fn test_failed_transfer_is_rolled_back() {
    let csv = build_csv(&[
        ("open", "amy", "", "100"),
        ("open", "bo", "", "0"),
        ("deactivate", "bo", "", ""),
        ("transfer", "amy", "bo", "40"),
        ("transfer", "amy", "nobody", "40"),
        ("transfer", "amy", "", "40"),
    ]);

    let output = process_csv_string(&csv).await.unwrap();

    assert_account_row(&output, "amy", "100", "active");
    assert_account_row(&output, "bo", "0", "inactive");
}

#[tokio::test]
async fn test_malformed_rows_are_skipped() {
    let csv = "type,account,counterparty,amount,narration\n\
               open,amy,,10,\n\
               explode,amy,,10,\n\
               deposit,amy,,not-a-number,\n\
               withdraw,amy,,-3,\n\
               deposit,amy,,5,\n";

    let output = process_csv_string(csv).await.unwrap();

    assert_account_row(&output, "amy", "15", "active");
}

#[tokio::test]
async fn test_whitespace_is_trimmed() {
    let csv = "type, account, counterparty, amount, narration\n\
               open , amy , , 10 ,\n\
               open , bo , , 0 ,\n\
               credit , amy@b1 , bo@b2 , 5 , lunch\n";

    let output = process_csv_string(csv).await.unwrap();

    assert_account_row(&output, "amy", "4.9995", "active");
    assert_account_row(&output, "bo", "5", "active");
}

#[tokio::test]
async fn test_commands_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        "{}",
        build_csv(&[
            ("open", "amy", "", "50"),
            ("open", "bo", "", "50"),
            ("full_access", "amy@b1", "bo@b1", "50"),
            ("withdraw", "bo", "", "100"),
        ])
    )
    .unwrap();

    let input = File::open(file.path()).unwrap();
    let mut output = Vec::new();
    process_commands(input, &mut output, &LedgerConfig::default())
        .await
        .unwrap();

    let output_str = String::from_utf8(output).unwrap();
    assert_account_row(&output_str, "amy", "0", "active");
    assert_account_row(&output_str, "bo", "0", "active");
}

#[tokio::test]
async fn test_fee_rate_from_config() {
    let csv = build_csv(&[
        ("open", "amy", "", "200"),
        ("open", "bo", "", "0"),
        ("credit", "amy@b1", "bo@b2", "100"),
    ]);
    let config = LedgerConfig::default().with_fee_rate(dec!(0.01));

    let mut output = Vec::new();
    process_commands(csv.as_bytes(), &mut output, &config)
        .await
        .unwrap();

    let output_str = String::from_utf8(output).unwrap();
    assert_account_row(&output_str, "amy", "99", "active");
    assert_account_row(&output_str, "bo", "100", "active");
}

fn command(command_type: CommandType, account: &str, amount: &str) -> Command {
    Command {
        command_type,
        account: account.to_string(),
        counterparty: None,
        amount: Some(amount.to_string()),
        narration: String::new(),
    }
}

/// A missing counterparty reads as an empty identifier for transfers and
/// payments alike
#[tokio::test]
async fn test_missing_counterparty_is_malformed() {
    let harness = Harness::new();
    harness.open(&[("amy", dec!(10))]).await;

    let err = apply_command(&harness.payments, &command(CommandType::Transfer, "amy", "5"))
        .await
        .unwrap_err();
    assert_eq!(err, LedgerError::MalformedParticipant(String::new()));

    let err = apply_command(&harness.payments, &command(CommandType::Credit, "amy@b1", "5"))
        .await
        .unwrap_err();
    assert_eq!(err, LedgerError::MalformedParticipant(String::new()));

    assert_eq!(harness.balance("amy").await, common::money(dec!(10)));
}
