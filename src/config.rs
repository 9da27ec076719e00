use clap::Parser;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::path::PathBuf;
use std::time::Duration;

/// Lock TTL used when nothing else is configured.
pub const DEFAULT_LOCK_TTL: Duration = Duration::from_secs(10);

/// Runtime knobs of the lending engine.
#[derive(Debug, Clone, PartialEq)]
pub struct LendingConfig {
    /// TTL applied to every lock the engine takes.
    pub lock_ttl: Duration,
    /// Tenor (months) and ceiling of each bucket seeded on activation.
    pub activation_limits: Vec<(u32, Decimal)>,
}

impl Default for LendingConfig {
    fn default() -> Self {
        Self {
            lock_ttl: DEFAULT_LOCK_TTL,
            activation_limits: vec![
                (1, dec!(100000)),
                (2, dec!(200000)),
                (3, dec!(500000)),
                (6, dec!(700000)),
            ],
        }
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Input commands CSV file
    pub input: PathBuf,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long)]
    pub db_path: Option<PathBuf>,

    /// TTL in seconds for every lock taken while processing a command
    #[arg(long, env = "CREDIT_LEDGER_LOCK_TTL_SECS", default_value_t = DEFAULT_LOCK_TTL.as_secs())]
    pub lock_ttl_secs: u64,

    /// Log filter directive (e.g. `info`, `credit_ledger=debug`)
    #[arg(long, env = "CREDIT_LEDGER_LOG", default_value = "warn")]
    pub log_level: String,
}

impl Cli {
    pub fn lending_config(&self) -> LendingConfig {
        LendingConfig {
            lock_ttl: Duration::from_secs(self.lock_ttl_secs),
            ..LendingConfig::default()
        }
    }
}
