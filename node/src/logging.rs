//! # Structured Logging
//!
//! Initializes the `tracing` subscriber with a JSON or pretty format. Output
//! goes to stderr.
//!
//! The filter is assembled per subsystem: chain sync and storage each get
//! their own directive so either can be turned up from the command line
//! (`--sync-log debug`) without drowning in the other. The HTTP client and
//! the database engine stay at `warn`. `RUST_LOG`, when set, replaces
//! the whole assembled filter.

use tracing_subscriber::filter::{Directive, LevelFilter, ParseError};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Chain sync: scheduler, rollback handling and the message pool checker.
pub const SYNC_TARGET: &str = "ledger_indexer::sync";
/// Storage: commits, rollbacks and checkpoints.
pub const STORAGE_TARGET: &str = "ledger_indexer::storage";

/// Dependencies that are chatty below `warn`.
const QUIET_TARGETS: &[&str] = &["sled", "hyper", "reqwest"];

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    /// Human-readable output for local runs.
    Pretty,
    /// JSON lines for log aggregation.
    Json,
}

/// Levels for the filter assembled when `RUST_LOG` is unset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogLevels {
    /// Everything in the indexer without a more specific entry.
    pub base: LevelFilter,
    pub sync: LevelFilter,
    pub storage: LevelFilter,
    /// Per-request spans from the API's trace layer.
    pub http: LevelFilter,
}

impl Default for LogLevels {
    fn default() -> Self {
        Self {
            base: LevelFilter::INFO,
            sync: LevelFilter::INFO,
            storage: LevelFilter::INFO,
            http: LevelFilter::INFO,
        }
    }
}

impl LogLevels {
    /// Filter directives, least specific first.
    pub fn directives(&self) -> Vec<String> {
        let level = |filter: LevelFilter| filter.to_string().to_lowercase();
        let mut out = vec![
            format!("ledger_indexer={}", level(self.base)),
            format!("ledger_indexer_node={}", level(self.base)),
            format!("{SYNC_TARGET}={}", level(self.sync)),
            format!("{STORAGE_TARGET}={}", level(self.storage)),
            format!("tower_http={}", level(self.http)),
        ];
        out.extend(QUIET_TARGETS.iter().map(|target| format!("{target}=warn")));
        out
    }

    /// Build the filter. Fails only if a directive does not parse.
    pub fn env_filter(&self) -> Result<EnvFilter, ParseError> {
        let mut filter = EnvFilter::default().add_directive(LevelFilter::WARN.into());
        for directive in self.directives() {
            filter = filter.add_directive(directive.parse::<Directive>()?);
        }
        Ok(filter)
    }
}

/// Initialize the global tracing subscriber. Call once, early in `main()`.
///
/// `RUST_LOG` overrides `levels` entirely when set, e.g.:
///
/// ```text
/// RUST_LOG=ledger_indexer::sync=debug,ledger_indexer::storage=info
/// ```
pub fn init_logging(levels: LogLevels, format: LogFormat) -> Result<(), ParseError> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => levels.env_filter()?,
    };

    match format {
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().with_writer(std::io::stderr).with_target(true))
                .init();
        }
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    fmt::layer()
                        .json()
                        .with_writer(std::io::stderr)
                        .with_target(true)
                        .with_current_span(true),
                )
                .init();
        }
    }

    tracing::info!(?format, sync = %levels.sync, storage = %levels.storage, "logging initialized");
    Ok(())
}
