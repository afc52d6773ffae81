// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Ledger Indexer Daemon
//!
//! Entry point for the `ledger-indexer` binary. Parses CLI arguments,
//! initializes logging and metrics, opens the index, starts chain sync and
//! serves the query API.
//!
//! - `run`     - sync from the bridge and serve the API
//! - `status`  - query a running indexer's status endpoint
//! - `version` - print build version information

mod api;
mod bridge;
mod cli;
mod logging;
mod metrics;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::watch;

use ledger_indexer::config::{NetworkConfig, SchedulerConfig};
use ledger_indexer::decoder::Decoder;
use ledger_indexer::storage::{IndexerDB, SledStorageProcessor, StorageProcessor};
use ledger_indexer::sync::{ChainSyncScheduler, MempoolChecker, NodeDataProvider};

use bridge::BridgeClient;
use cli::{Commands, IndexerCli};
use metrics::IndexerMetrics;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = IndexerCli::parse();

    match cli.command {
        Commands::Run(args) => run_indexer(args).await,
        Commands::Status(args) => query_status(args).await,
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

fn load_network(args: &cli::RunArgs) -> Result<NetworkConfig> {
    let mut network = match &args.config {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read network config {}", path.display()))?;
            NetworkConfig::from_json(&raw)
                .with_context(|| format!("invalid network config {}", path.display()))?
        }
        None => NetworkConfig::default(),
    };
    if let Some(url) = &args.bridge_url {
        network.bridge_url = url.clone();
    }
    Ok(network)
}

/// Open the index, start chain sync and serve the API and metrics until
/// a signal arrives or sync fails.
async fn run_indexer(args: cli::RunArgs) -> Result<()> {
    logging::init_logging(args.log_levels(), args.log_format).context("invalid log filter")?;

    let network = load_network(&args)?;
    tracing::info!(
        network = %network.name,
        bridge = %network.bridge_url,
        era = ?network.era,
        api_port = args.api_port,
        metrics_port = args.metrics_port,
        data_dir = %args.data_dir.display(),
        "starting ledger-indexer"
    );

    // --- Persistent storage ---
    let db_path = args.data_dir.join("index");
    std::fs::create_dir_all(&db_path)
        .with_context(|| format!("failed to create database directory: {}", db_path.display()))?;
    let db = IndexerDB::open(&db_path)
        .with_context(|| format!("failed to open database at {}", db_path.display()))?;
    tracing::info!(path = %db_path.display(), "database opened");

    let storage: Arc<dyn StorageProcessor> = Arc::new(SledStorageProcessor::new(db.clone()));
    let provider: Arc<dyn NodeDataProvider> =
        Arc::new(BridgeClient::new(&network.bridge_url).context("failed to build bridge client")?);

    // --- Metrics ---
    let indexer_metrics = Arc::new(IndexerMetrics::new().context("failed to register metrics")?);

    // --- Scheduler ---
    let scheduler_config = SchedulerConfig {
        check_tip_interval: Duration::from_secs(args.check_tip_secs.max(1)),
        check_mempool_interval: Duration::from_secs(args.check_mempool_secs.max(1)),
        ..SchedulerConfig::default()
    };
    let scheduler = Arc::new(
        ChainSyncScheduler::new(
            Arc::clone(&provider),
            Arc::clone(&storage),
            network.clone(),
            scheduler_config.clone(),
        )
        .with_observer(indexer_metrics.clone()),
    );

    let genesis_outputs = scheduler
        .prepare(&network.genesis_hash)
        .await
        .context("failed to prepare index for sync")?;
    if genesis_outputs > 0 {
        tracing::info!(outputs = genesis_outputs, "genesis distribution loaded");
    }
    let best = storage.best_block().await.context("failed to read best block")?;
    indexer_metrics.best_height.set(best.height as i64);

    // --- API server ---
    let app_state = api::AppState {
        version: env!("CARGO_PKG_VERSION").to_string(),
        network: network.name.clone(),
        db,
        storage: Arc::clone(&storage),
        scheduler: Arc::clone(&scheduler),
        provider: Arc::clone(&provider),
        decoder: Decoder::new(network.clone()),
    };
    let api_router = api::create_router(app_state);
    let api_addr = format!("0.0.0.0:{}", args.api_port);
    let api_listener = tokio::net::TcpListener::bind(&api_addr)
        .await
        .with_context(|| format!("failed to bind API listener on {}", api_addr))?;
    tracing::info!("API server listening on {}", api_addr);

    // --- Metrics server ---
    let metrics_router = axum::Router::new()
        .route("/metrics", axum::routing::get(metrics::metrics_handler))
        .with_state(Arc::clone(&indexer_metrics));
    let metrics_addr = format!("0.0.0.0:{}", args.metrics_port);
    let metrics_listener = tokio::net::TcpListener::bind(&metrics_addr)
        .await
        .with_context(|| format!("failed to bind metrics listener on {}", metrics_addr))?;
    tracing::info!("Metrics server listening on {}", metrics_addr);

    // --- Chain sync ---
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut sync = tokio::spawn(Arc::clone(&scheduler).run(shutdown_rx.clone()));
    let mempool = Arc::new(MempoolChecker::new(
        provider,
        storage,
        scheduler_config.check_mempool_interval,
    ));
    let mut mempool = tokio::spawn(mempool.run(shutdown_rx));

    let mut sync_finished = false;
    let mut mempool_finished = false;
    let outcome: Result<()> = tokio::select! {
        res = axum::serve(api_listener, api_router) => {
            res.context("API server failed")
        }
        res = axum::serve(metrics_listener, metrics_router) => {
            res.context("metrics server failed")
        }
        joined = &mut sync => {
            sync_finished = true;
            match joined {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(anyhow!(e).context("chain sync stopped")),
                Err(e) => Err(anyhow!("chain sync task failed: {e}")),
            }
        }
        joined = &mut mempool => {
            mempool_finished = true;
            match joined {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(anyhow!(e).context("message pool checker stopped")),
                Err(e) => Err(anyhow!("message pool checker task failed: {e}")),
            }
        }
        _ = shutdown_signal() => {
            tracing::info!("shutdown signal received, stopping");
            Ok(())
        }
    };

    let _ = shutdown_tx.send(true);
    if !sync_finished {
        match tokio::time::timeout(Duration::from_secs(30), &mut sync).await {
            Ok(Ok(Err(e))) => tracing::warn!(error = %e, "chain sync ended with error during shutdown"),
            Ok(_) => {}
            Err(_) => {
                tracing::warn!("chain sync did not stop in time, aborting");
                sync.abort();
            }
        }
    }

    if !mempool_finished {
        if tokio::time::timeout(Duration::from_secs(5), &mut mempool).await.is_err() {
            mempool.abort();
        }
    }

    tracing::info!("ledger-indexer stopped");
    outcome
}

/// Query a running indexer's status endpoint and print the result.
async fn query_status(args: cli::StatusArgs) -> Result<()> {
    let url = format!("{}/status", args.api_url.trim_end_matches('/'));
    let response = reqwest::get(&url)
        .await
        .with_context(|| format!("failed to reach {}", url))?
        .error_for_status()
        .with_context(|| format!("{} returned an error", url))?;
    let body: serde_json::Value = response.json().await.context("invalid status response")?;
    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(())
}

fn print_version() {
    println!("ledger-indexer {}", env!("CARGO_PKG_VERSION"));
    println!("rustc          {}", option_env!("RUSTC_VERSION").unwrap_or("unknown"));
}

/// Waits for SIGINT (Ctrl+C) or SIGTERM, whichever comes first.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
