//! # Chain Sync
//!
//! The top-level control loop. A poller task reads the node's tip, decides
//! between bulk epochs and single blocks, and enqueues work. A single
//! consumer drains the queue, feeding blocks through the decoder into the
//! storage processor in strict chain order.
//!
//! ```text
//! sync/
//! ├── mod.rs        - IndexerError, SyncObserver, re-exports
//! ├── provider.rs   - NodeDataProvider trait, status & genesis wire types
//! ├── work.rs       - WorkItem, ProcessStatus, SyncPhase, strategy plan
//! ├── scheduler.rs  - ChainSyncScheduler
//! └── mempool.rs    - MempoolChecker for rejected submissions
//! ```

pub mod mempool;
pub mod provider;
pub mod scheduler;
pub mod work;

use thiserror::Error;

use crate::decoder::DecodeError;
use crate::ledger::LedgerError;
use crate::model::BestBlock;
use crate::storage::{CommitSummary, RollbackSummary, StorageError};

pub use mempool::MempoolChecker;
pub use provider::{
    FragmentLog, FragmentStatus, GenesisData, NodeDataProvider, NodeStatus, NodeTips, Tip,
    TransportError,
};
pub use scheduler::{ChainSyncScheduler, PollOutcome};
pub use work::{last_stable_epoch, plan, ProcessStatus, SyncMode, SyncPhase, SyncPlan, WorkItem};

// ---------------------------------------------------------------------------
// IndexerError
// ---------------------------------------------------------------------------

/// Anything that can stop a unit of sync work.
#[derive(Debug, Error)]
pub enum IndexerError {
    #[error("decode: {0}")]
    Decode(#[from] DecodeError),

    #[error("ledger: {0}")]
    Ledger(#[from] LedgerError),

    #[error("storage: {0}")]
    Storage(#[from] StorageError),

    #[error("transport: {0}")]
    Transport(#[from] TransportError),

    /// The poller task died without returning.
    #[error("worker: {0}")]
    Worker(String),
}

impl IndexerError {
    /// Whether the process must stop. Transport failures are retried on
    /// the next poll; everything else risks corrupt derived state.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, IndexerError::Transport(_))
    }
}

// ---------------------------------------------------------------------------
// SyncObserver
// ---------------------------------------------------------------------------

/// Hook for metrics. Every method defaults to a no-op.
pub trait SyncObserver: Send + Sync {
    fn on_commit(&self, _summary: &CommitSummary, _best: &BestBlock) {}

    fn on_rollback(&self, _summary: &RollbackSummary) {}

    fn on_queue_depth(&self, _depth: usize) {}
}

/// Observer that ignores everything.
pub struct NoopObserver;

impl SyncObserver for NoopObserver {}
