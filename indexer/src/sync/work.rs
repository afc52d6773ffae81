//! Work items, statuses and the pure strategy decision.

use std::fmt;

use serde::Serialize;

use crate::config::{EPOCH_DOWNLOAD_THRESHOLD, STABLE_SLOT_BOUNDARY};
use crate::model::BestBlock;

// ---------------------------------------------------------------------------
// Phases
// ---------------------------------------------------------------------------

/// How the scheduler is currently catching up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    EpochBulk,
    BlockByBlock,
}

/// Scheduler state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "phase", content = "mode")]
pub enum SyncPhase {
    Idle,
    Polling,
    Syncing(SyncMode),
    RollbackRequired,
    RollingBack,
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncPhase::Idle => write!(f, "idle"),
            SyncPhase::Polling => write!(f, "polling"),
            SyncPhase::Syncing(SyncMode::EpochBulk) => write!(f, "syncing(epoch)"),
            SyncPhase::Syncing(SyncMode::BlockByBlock) => write!(f, "syncing(block)"),
            SyncPhase::RollbackRequired => write!(f, "rollback_required"),
            SyncPhase::RollingBack => write!(f, "rolling_back"),
        }
    }
}

// ---------------------------------------------------------------------------
// Work
// ---------------------------------------------------------------------------

/// One unit of work for the single consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkItem {
    /// Fetch and apply the main-chain block at this height.
    Block { height: u64 },
    /// Fetch the packed epoch and apply it from the local continuation point.
    Epoch { epoch: u64 },
}

/// A work item tagged with the queue generation it was enqueued under.
/// Items from an older generation are dropped on dequeue.
#[derive(Debug, Clone, Copy)]
pub(crate) struct QueuedWork {
    pub item: WorkItem,
    pub generation: u64,
}

/// Outcome of processing one work item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessStatus {
    BlockProcessed,
    EpochProcessed,
    /// The node returned an epoch bundle without blocks.
    EpochEmpty,
    /// The fetched data does not extend the locally tracked chain.
    RollbackRequired,
}

// ---------------------------------------------------------------------------
// Strategy
// ---------------------------------------------------------------------------

/// The last remote epoch considered immutable.
///
/// Past the boundary slot only the current epoch is still unstable; at or
/// before it the previous one is too.
pub fn last_stable_epoch(remote_epoch: u64, remote_slot: u64) -> u64 {
    let unstable = if remote_slot > STABLE_SLOT_BOUNDARY { 1 } else { 2 };
    remote_epoch.saturating_sub(unstable)
}

/// What one poll cycle should enqueue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPlan {
    /// Packed epochs `first..end` (end exclusive).
    Epochs { first: u64, end: u64 },
    /// Heights `first..=last`.
    Blocks { first: u64, last: u64 },
    /// Bulk download would pay off but the node has not packed the epoch.
    AwaitingPack { epoch: u64, last_stable: u64 },
    UpToDate,
}

/// Decide between bulk epochs and single blocks.
///
/// `node_height` is the node's own tip height, `remote` the `(epoch, slot)`
/// of the network tip it follows.
pub fn plan(
    local: &BestBlock,
    remote: (u64, u64),
    node_height: u64,
    packed_epochs: u64,
    max_blocks: u64,
) -> SyncPlan {
    let (remote_epoch, remote_slot) = remote;
    if local.epoch < remote_epoch {
        let last_stable = last_stable_epoch(remote_epoch, remote_slot);
        let behind_stable = local.epoch < last_stable;
        let early_in_stable =
            local.epoch == last_stable && local.slot.unwrap_or(0) < EPOCH_DOWNLOAD_THRESHOLD;
        if behind_stable || early_in_stable {
            if packed_epochs > local.epoch {
                return SyncPlan::Epochs {
                    first: local.epoch,
                    end: packed_epochs,
                };
            }
            return SyncPlan::AwaitingPack {
                epoch: local.epoch,
                last_stable,
            };
        }
    }

    let first = local.height + 1;
    let last = node_height.min(local.height.saturating_add(max_blocks));
    if first > last {
        SyncPlan::UpToDate
    } else {
        SyncPlan::Blocks { first, last }
    }
}
