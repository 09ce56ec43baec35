use std::env;
use std::fs::File;
use std::io;

use anyhow::{Context, Result};
use ledger_core::config::LedgerConfig;
use ledger_core::process_commands;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_writer(io::stderr).init();

    let args: Vec<String> = env::args().collect();

    anyhow::ensure!(
        args.len() == 2,
        "Usage: {} <commands.csv>",
        args.first().map(String::as_str).unwrap_or("ledger-core")
    );

    let filename = &args[1];

    let config = LedgerConfig::from_env().context("Invalid ledger configuration")?;

    let file = File::open(filename)
        .with_context(|| format!("Failed to open input file '{}'", filename))?;

    process_commands(file, io::stdout(), &config)
        .await
        .context("Failed to process commands and write output")?;

    Ok(())
}
