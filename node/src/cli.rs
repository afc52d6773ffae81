//! # CLI Interface
//!
//! Command-line arguments for `ledger-indexer`, via `clap` derive. Three
//! subcommands: `run`, `status` and `version`.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use tracing_subscriber::filter::LevelFilter;

use crate::logging::{LogFormat, LogLevels};

/// Ledger indexer daemon.
///
/// Follows a chain bridge, derives UTXO and account state from every block
/// and serves it over a read-only HTTP API.
#[derive(Parser, Debug)]
#[command(
    name = "ledger-indexer",
    about = "Chain indexer with UTXO and account ledger state",
    version,
    propagate_version = true
)]
pub struct IndexerCli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Sync from the bridge and serve the query API.
    Run(RunArgs),
    /// Query the status endpoint of a running indexer.
    Status(StatusArgs),
    /// Print version information and exit.
    Version,
}

/// Arguments for the `run` subcommand.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Network configuration file (JSON). Mainnet defaults when omitted.
    #[arg(long, short = 'c', env = "INDEXER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Directory holding the index database. Created on first run.
    #[arg(long, short = 'd', env = "INDEXER_DATA_DIR", default_value = "./data")]
    pub data_dir: PathBuf,

    /// Bridge base URL. Overrides the one in the network config.
    #[arg(long, env = "INDEXER_BRIDGE_URL")]
    pub bridge_url: Option<String>,

    /// Seconds between tip polls.
    #[arg(long, env = "INDEXER_CHECK_TIP_SECS", default_value_t = 20)]
    pub check_tip_secs: u64,

    /// Seconds between message pool checks for submitted transactions.
    #[arg(long, env = "INDEXER_CHECK_MEMPOOL_SECS", default_value_t = 30)]
    pub check_mempool_secs: u64,

    /// Port for the query API.
    #[arg(long, env = "INDEXER_API_PORT", default_value_t = 8090)]
    pub api_port: u16,

    /// Port for the Prometheus metrics endpoint.
    #[arg(long, env = "INDEXER_METRICS_PORT", default_value_t = 9102)]
    pub metrics_port: u16,

    #[arg(long, env = "INDEXER_LOG_FORMAT", value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,

    /// Log level for the indexer as a whole. `RUST_LOG` overrides all levels.
    #[arg(long, env = "INDEXER_LOG_LEVEL", default_value = "info")]
    pub log_level: LevelFilter,

    /// Log level for chain sync.
    #[arg(long, env = "INDEXER_SYNC_LOG", default_value = "info")]
    pub sync_log: LevelFilter,

    /// Log level for storage commits and rollbacks.
    #[arg(long, env = "INDEXER_STORAGE_LOG", default_value = "info")]
    pub storage_log: LevelFilter,
}

impl RunArgs {
    pub fn log_levels(&self) -> LogLevels {
        LogLevels {
            base: self.log_level,
            sync: self.sync_log,
            storage: self.storage_log,
            ..LogLevels::default()
        }
    }
}

/// Arguments for the `status` subcommand.
#[derive(Parser, Debug)]
pub struct StatusArgs {
    /// Query API of the running indexer.
    #[arg(long, default_value = "http://127.0.0.1:8090")]
    pub api_url: String,
}
