//! # Prometheus Metrics
//!
//! Sync progress counters, scraped at `/metrics` on the metrics port. The
//! scheduler feeds them through its [`SyncObserver`] hook.
//!
//! All metrics live in a dedicated [`prometheus::Registry`] prefixed
//! `indexer_`.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};
use std::sync::Arc;

use ledger_indexer::model::BestBlock;
use ledger_indexer::storage::{CommitSummary, RollbackSummary};
use ledger_indexer::sync::SyncObserver;

/// Metric handles. Cloning shares the underlying collectors.
#[derive(Clone)]
pub struct IndexerMetrics {
    registry: Registry,
    pub blocks_committed_total: IntCounter,
    pub transactions_committed_total: IntCounter,
    pub rollbacks_total: IntCounter,
    /// Height of the best committed block.
    pub best_height: IntGauge,
    /// Work items waiting for the consumer.
    pub queue_depth: IntGauge,
}

impl IndexerMetrics {
    /// Create and register all metrics.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("indexer".into()), None)?;

        let blocks_committed_total =
            IntCounter::new("blocks_committed_total", "Blocks committed to the index")?;
        registry.register(Box::new(blocks_committed_total.clone()))?;

        let transactions_committed_total = IntCounter::new(
            "transactions_committed_total",
            "Transactions committed to the index",
        )?;
        registry.register(Box::new(transactions_committed_total.clone()))?;

        let rollbacks_total = IntCounter::new("rollbacks_total", "Rollbacks after a reorganization")?;
        registry.register(Box::new(rollbacks_total.clone()))?;

        let best_height = IntGauge::new("best_height", "Height of the best committed block")?;
        registry.register(Box::new(best_height.clone()))?;

        let queue_depth = IntGauge::new("queue_depth", "Work items waiting in the sync queue")?;
        registry.register(Box::new(queue_depth.clone()))?;

        Ok(Self {
            registry,
            blocks_committed_total,
            transactions_committed_total,
            rollbacks_total,
            best_height,
            queue_depth,
        })
    }

    /// Encode all registered metrics in the Prometheus text format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

impl SyncObserver for IndexerMetrics {
    fn on_commit(&self, summary: &CommitSummary, best: &BestBlock) {
        self.blocks_committed_total.inc_by(summary.blocks);
        self.transactions_committed_total.inc_by(summary.transactions);
        self.best_height.set(best.height as i64);
    }

    fn on_rollback(&self, summary: &RollbackSummary) {
        self.rollbacks_total.inc();
        self.best_height.set(summary.floor as i64);
    }

    fn on_queue_depth(&self, depth: usize) {
        self.queue_depth.set(depth as i64);
    }
}

pub type SharedMetrics = Arc<IndexerMetrics>;

/// `GET /metrics`.
pub async fn metrics_handler(
    axum::extract::State(metrics): axum::extract::State<SharedMetrics>,
) -> impl IntoResponse {
    match metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics encoding failed").into_response()
        }
    }
}
