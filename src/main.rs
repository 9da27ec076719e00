use clap::Parser;
use credit_ledger::application::engine::LendingEngine;
use credit_ledger::config::Cli;
use credit_ledger::domain::ports::{SharedBorrowerDirectory, SharedLedgerStore};
use credit_ledger::infrastructure::in_memory::{
    InMemoryBorrowerDirectory, InMemoryLedger, InMemoryLockService,
};
use credit_ledger::interfaces::csv::command_reader::CommandReader;
use credit_ledger::interfaces::csv::ledger_writer::LedgerWriter;
use miette::{IntoDiagnostic, Result};
use std::fs::File;
use std::io;
use std::sync::Arc;
use tracing::error;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_ansi(false)
        .with_env_filter(EnvFilter::try_new(&cli.log_level).into_diagnostic()?)
        .init();

    let (ledger, borrowers) = stores(&cli)?;
    let engine = LendingEngine::new(
        ledger,
        borrowers,
        Arc::new(InMemoryLockService::new()),
        cli.lending_config(),
    );

    let file = File::open(&cli.input).into_diagnostic()?;
    let reader = CommandReader::new(file);
    for (line, command) in reader.commands().enumerate() {
        match command {
            Ok(command) => {
                if let Err(e) = command.run(&engine).await {
                    error!(row = line + 1, outcome = ?e.outcome(), "Error processing command: {e}");
                }
            }
            Err(e) => error!(row = line + 1, "Error reading command: {e}"),
        }
    }

    let (limits, loans) = engine.snapshot().await.into_diagnostic()?;
    let stdout = io::stdout();
    let mut writer = LedgerWriter::new(stdout.lock());
    writer.write_limits(limits).into_diagnostic()?;
    writer.write_loans(loans).into_diagnostic()?;

    Ok(())
}

#[cfg(feature = "storage-rocksdb")]
fn stores(cli: &Cli) -> Result<(SharedLedgerStore, SharedBorrowerDirectory)> {
    use credit_ledger::infrastructure::rocksdb::RocksDBStore;

    if let Some(db_path) = &cli.db_path {
        let store = RocksDBStore::open(db_path).into_diagnostic()?;
        return Ok((Arc::new(store.clone()), Arc::new(store)));
    }
    Ok(in_memory())
}

#[cfg(not(feature = "storage-rocksdb"))]
fn stores(cli: &Cli) -> Result<(SharedLedgerStore, SharedBorrowerDirectory)> {
    if cli.db_path.is_some() {
        tracing::warn!(
            "Persistent storage requested via --db-path, but the 'storage-rocksdb' feature is not enabled. Falling back to in-memory storage."
        );
    }
    Ok(in_memory())
}

fn in_memory() -> (SharedLedgerStore, SharedBorrowerDirectory) {
    (
        Arc::new(InMemoryLedger::new()),
        Arc::new(InMemoryBorrowerDirectory::new()),
    )
}
