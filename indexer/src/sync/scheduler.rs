//! The chain sync scheduler.
//!
//! Two cooperative tasks share one scheduler:
//!
//! - the **poller** reads the node status every `check_tip_interval`,
//!   plans the next stretch of work and pushes it into a bounded queue;
//! - the **consumer** pops one item at a time, fetches and decodes it, and
//!   commits through the storage processor.
//!
//! Only the consumer writes. The poller reads the committed best block and
//! never touches ledger state.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use super::provider::{NodeDataProvider, TransportError};
use super::work::{plan, ProcessStatus, QueuedWork, SyncMode, SyncPhase, SyncPlan, WorkItem};
use super::{IndexerError, NoopObserver, SyncObserver};
use crate::config::{NetworkConfig, SchedulerConfig};
use crate::crypto::Hash;
use crate::decoder::Decoder;
use crate::model::{BestBlock, Block};
use crate::storage::{RollbackSummary, StorageProcessor};

/// What a poll cycle did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Enqueued { mode: SyncMode, items: u64 },
    UpToDate,
    /// Bulk sync is due but the node has not packed the epoch yet.
    AwaitingPack { epoch: u64 },
    /// The node has no local tip yet.
    NodeNotReady,
    /// The queue is at its bound; nothing was enqueued.
    Backpressure,
}

/// In-memory tracking state. Reset as a whole on rollback.
#[derive(Debug)]
struct SchedulerState {
    phase: SyncPhase,
    /// Last block applied by this scheduler. Loaded lazily from storage.
    best: Option<BestBlock>,
    /// Bumped whenever pending work becomes invalid.
    generation: u64,
    /// Next height not yet enqueued in this generation.
    next_height: Option<u64>,
    /// Next epoch not yet enqueued in this generation.
    next_epoch: Option<u64>,
}

impl Default for SchedulerState {
    fn default() -> Self {
        Self {
            phase: SyncPhase::Idle,
            best: None,
            generation: 0,
            next_height: None,
            next_epoch: None,
        }
    }
}

/// Drives the decoder and the storage processor from the node's tip.
pub struct ChainSyncScheduler {
    provider: Arc<dyn NodeDataProvider>,
    storage: Arc<dyn StorageProcessor>,
    decoder: Decoder,
    config: SchedulerConfig,
    observer: Arc<dyn SyncObserver>,
    state: Mutex<SchedulerState>,
    sender: mpsc::Sender<QueuedWork>,
    receiver: tokio::sync::Mutex<mpsc::Receiver<QueuedWork>>,
    /// Items enqueued and not yet finished: queued plus the one the
    /// consumer holds. The queue alone loses sight of an item once it is
    /// received.
    outstanding: AtomicUsize,
}

/// Releases one outstanding item when dropped, on every exit path.
struct Finished<'a>(&'a AtomicUsize);

impl Drop for Finished<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

impl ChainSyncScheduler {
    pub fn new(
        provider: Arc<dyn NodeDataProvider>,
        storage: Arc<dyn StorageProcessor>,
        network: NetworkConfig,
        config: SchedulerConfig,
    ) -> Self {
        let (sender, receiver) = mpsc::channel(config.queue_max_length.max(1));
        Self {
            provider,
            storage,
            decoder: Decoder::new(network),
            config,
            observer: Arc::new(NoopObserver),
            state: Mutex::new(SchedulerState::default()),
            sender,
            receiver: tokio::sync::Mutex::new(receiver),
            outstanding: AtomicUsize::new(0),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn SyncObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn phase(&self) -> SyncPhase {
        self.state.lock().phase
    }

    /// Work items waiting in the queue, stale ones included.
    pub fn queue_depth(&self) -> usize {
        self.sender.max_capacity() - self.sender.capacity()
    }

    /// Work items queued or being processed.
    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::Acquire)
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    // -- Startup -------------------------------------------------------------

    /// Clean up unsealed data and make sure the genesis outputs are loaded.
    /// Returns the number of genesis outputs stored by this call.
    pub async fn prepare(&self, genesis_hash: &str) -> Result<usize, IndexerError> {
        self.storage.on_launch().await?;
        self.invalidate_pending();
        self.state.lock().best = None;

        if self.storage.genesis_loaded().await? {
            debug!("genesis already loaded");
            return Ok(0);
        }
        info!(hash = genesis_hash, "loading genesis distribution");
        let genesis = self.provider.get_genesis(genesis_hash).await?;
        let utxos = genesis.into_utxos()?;
        self.storage.store_genesis_utxos(&utxos).await?;
        Ok(utxos.len())
    }

    // -- Polling -------------------------------------------------------------

    /// One poll cycle: read the node status and enqueue the next stretch of
    /// work. Never writes ledger state.
    pub async fn poll_once(&self) -> Result<PollOutcome, IndexerError> {
        let depth = self.queue_depth();
        self.observer.on_queue_depth(depth);
        if depth >= self.config.queue_max_length {
            warn!(depth, "work queue full, skipping this cycle");
            return Ok(PollOutcome::Backpressure);
        }

        {
            let mut state = self.state.lock();
            if state.phase == SyncPhase::Idle {
                state.phase = SyncPhase::Polling;
            }
        }

        let status = self.provider.get_status().await?;
        let Some(node_tip) = status.tip.local else {
            info!("node has no local tip yet, waiting for it to sync");
            self.settle_idle();
            return Ok(PollOutcome::NodeNotReady);
        };
        let local = self.storage.best_block().await?;
        let remote = status.tip.remote.slot;
        debug!(
            local_height = local.height,
            local_epoch = local.epoch,
            node_height = node_tip.height,
            remote_epoch = remote.0,
            remote_slot = remote.1,
            packed_epochs = status.packed_epochs,
            "checked tip"
        );

        let outcome = match plan(
            &local,
            remote,
            node_tip.height,
            status.packed_epochs,
            self.config.max_blocks_per_poll,
        ) {
            SyncPlan::Epochs { first, end } => {
                let (generation, first) = {
                    let state = self.state.lock();
                    (state.generation, state.next_epoch.map_or(first, |n| n.max(first)))
                };
                let mut next = first;
                while next < end && self.enqueue(WorkItem::Epoch { epoch: next }, generation) {
                    next += 1;
                }
                self.advance_cursor(generation, |state| state.next_epoch = Some(next));
                if next > first {
                    info!(first, last = next - 1, "enqueued packed epochs");
                }
                PollOutcome::Enqueued {
                    mode: SyncMode::EpochBulk,
                    items: next - first,
                }
            }
            SyncPlan::Blocks { first, last } => {
                let (generation, first) = {
                    let state = self.state.lock();
                    (state.generation, state.next_height.map_or(first, |n| n.max(first)))
                };
                let mut next = first;
                while next <= last && self.enqueue(WorkItem::Block { height: next }, generation) {
                    next += 1;
                }
                self.advance_cursor(generation, |state| state.next_height = Some(next));
                if next > first {
                    debug!(first, last = next - 1, "enqueued blocks");
                }
                PollOutcome::Enqueued {
                    mode: SyncMode::BlockByBlock,
                    items: next - first,
                }
            }
            SyncPlan::AwaitingPack { epoch, last_stable } => {
                info!(epoch, last_stable, "node has not packed the epoch yet");
                PollOutcome::AwaitingPack { epoch }
            }
            SyncPlan::UpToDate => PollOutcome::UpToDate,
        };

        match outcome {
            PollOutcome::Enqueued { mode, items } if items > 0 => {
                self.set_phase_unless_rolling_back(SyncPhase::Syncing(mode));
            }
            _ => self.settle_idle(),
        }
        self.observer.on_queue_depth(self.queue_depth());
        Ok(outcome)
    }

    /// Push one item. `false` when the queue is full.
    fn enqueue(&self, item: WorkItem, generation: u64) -> bool {
        // Counted before sending so the consumer can never release it first.
        self.outstanding.fetch_add(1, Ordering::AcqRel);
        let sent = match self.sender.try_send(QueuedWork { item, generation }) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(?item, "work queue full, deferring the rest to a later cycle");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        };
        if !sent {
            self.outstanding.fetch_sub(1, Ordering::AcqRel);
        }
        sent
    }

    fn advance_cursor(&self, generation: u64, update: impl FnOnce(&mut SchedulerState)) {
        let mut state = self.state.lock();
        if state.generation == generation {
            update(&mut state);
        }
    }

    // -- Processing ----------------------------------------------------------

    /// Process one work item, running the rollback path if it turns out
    /// the node switched branches.
    pub async fn process_item(&self, item: WorkItem) -> Result<ProcessStatus, IndexerError> {
        let status = match item {
            WorkItem::Block { height } => {
                self.set_phase_unless_rolling_back(SyncPhase::Syncing(SyncMode::BlockByBlock));
                self.process_block_height(height).await?
            }
            WorkItem::Epoch { epoch } => {
                self.set_phase_unless_rolling_back(SyncPhase::Syncing(SyncMode::EpochBulk));
                self.process_epoch(epoch).await?
            }
        };

        if status == ProcessStatus::RollbackRequired {
            self.set_phase(SyncPhase::RollbackRequired);
            info!(?item, "rollback required");
            self.rollback().await?;
        }
        Ok(status)
    }

    /// Process every item currently queued, without waiting for more.
    /// Must not be called while [`run`](Self::run) is active.
    pub async fn drain_queue(&self) -> Result<Vec<ProcessStatus>, IndexerError> {
        let mut receiver = self.receiver.lock().await;
        let mut statuses = Vec::new();
        while let Ok(queued) = receiver.try_recv() {
            if let Some(status) = self.handle_queued(queued).await? {
                statuses.push(status);
            }
        }
        Ok(statuses)
    }

    async fn handle_queued(&self, queued: QueuedWork) -> Result<Option<ProcessStatus>, IndexerError> {
        let finished = Finished(&self.outstanding);
        if queued.generation != self.state.lock().generation {
            debug!(item = ?queued.item, "dropping work item from before rollback");
            drop(finished);
            self.settle_idle();
            return Ok(None);
        }
        let result = self.process_item(queued.item).await;
        drop(finished);
        match result {
            Ok(status) => {
                self.settle_idle();
                Ok(Some(status))
            }
            Err(e) => {
                if !e.is_fatal() {
                    // Later items would no longer chain; let the next poll
                    // replan from the committed tip.
                    self.invalidate_pending();
                }
                Err(e)
            }
        }
    }

    async fn process_block_height(&self, height: u64) -> Result<ProcessStatus, IndexerError> {
        let bytes = self.provider.get_block_by_height(height).await?;
        let block = self.decoder.decode_block(&bytes)?;
        self.process_block(block).await
    }

    async fn process_block(&self, block: Block) -> Result<ProcessStatus, IndexerError> {
        let best = self.tracked_best().await?;

        if best.hash.is_some()
            && block.height <= best.height
            && self.storage.contains_block(&block.hash).await?
        {
            debug!(height = block.height, hash = %block.hash_hex(), "block already applied");
            return Ok(ProcessStatus::BlockProcessed);
        }

        if let Some(last) = best.hash {
            if block.prev_hash != last {
                match self.boundary_between(&block, &last).await? {
                    Some(boundary) => {
                        debug!(epoch = boundary.epoch, hash = %boundary.hash_hex(), "bridging epoch boundary block");
                        self.commit(std::slice::from_ref(&boundary)).await?;
                    }
                    None => {
                        warn!(
                            height = block.height,
                            prev = %block.prev_hash_hex(),
                            last = %hex::encode(last),
                            "block does not extend the local chain"
                        );
                        return Ok(ProcessStatus::RollbackRequired);
                    }
                }
            }
        }

        self.commit(std::slice::from_ref(&block)).await?;
        debug!(
            height = block.height,
            epoch = block.epoch,
            slot = ?block.slot,
            hash = %block.hash_hex(),
            txs = block.transactions.len(),
            "block applied"
        );
        Ok(ProcessStatus::BlockProcessed)
    }

    /// Blocks by height skip epoch boundary blocks. If `block`'s parent is
    /// such a block and it extends `last`, return it.
    async fn boundary_between(&self, block: &Block, last: &Hash) -> Result<Option<Block>, IndexerError> {
        let bytes = match self.provider.get_block(&block.prev_hash).await {
            Ok(bytes) => bytes,
            Err(TransportError::NotFound(_)) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let parent = self.decoder.decode_block(&bytes)?;
        let bridges = parent.is_epoch_boundary && parent.hash == block.prev_hash && parent.prev_hash == *last;
        Ok(bridges.then_some(parent))
    }

    async fn process_epoch(&self, epoch: u64) -> Result<ProcessStatus, IndexerError> {
        let bytes = self.provider.get_epoch(epoch).await?;
        let blocks = self.decoder.decode_epoch(&bytes)?;
        if blocks.is_empty() {
            warn!(epoch, "node returned an empty epoch");
            return Ok(ProcessStatus::EpochEmpty);
        }

        let best = self.tracked_best().await?;
        let total = blocks.len();
        let offset = continuation_offset(&blocks, &best);
        if offset > 0 {
            info!(epoch, offset, total, local_height = best.height, "continuing partially applied epoch");
        }

        let mut last = best.hash;
        let mut applied = 0usize;
        let mut batch = Vec::with_capacity(self.config.epoch_commit_batch);
        for block in blocks.into_iter().skip(offset) {
            if let Some(expected) = last {
                if block.prev_hash != expected {
                    applied += batch.len();
                    self.commit_batch(&mut batch).await?;
                    warn!(
                        epoch,
                        height = block.height,
                        prev = %block.prev_hash_hex(),
                        "epoch block does not extend the local chain"
                    );
                    return Ok(ProcessStatus::RollbackRequired);
                }
            }
            last = Some(block.hash);
            batch.push(block);
            if batch.len() >= self.config.epoch_commit_batch {
                applied += batch.len();
                self.commit_batch(&mut batch).await?;
            }
        }
        applied += batch.len();
        self.commit_batch(&mut batch).await?;

        info!(epoch, applied, total, "epoch processed");
        Ok(ProcessStatus::EpochProcessed)
    }

    async fn commit_batch(&self, batch: &mut Vec<Block>) -> Result<(), IndexerError> {
        if batch.is_empty() {
            return Ok(());
        }
        self.commit(batch).await?;
        batch.clear();
        Ok(())
    }

    async fn commit(&self, blocks: &[Block]) -> Result<(), IndexerError> {
        let Some(tip) = blocks.last() else {
            return Ok(());
        };
        let summary = self.storage.commit_blocks(blocks).await?;
        let best = tip.best_block();
        self.state.lock().best = Some(best.clone());
        self.observer.on_commit(&summary, &best);
        Ok(())
    }

    // -- Rollback ------------------------------------------------------------

    /// Forget in-memory tracking, invalidate queued work and rewind storage
    /// by the configured lookback window.
    pub async fn rollback(&self) -> Result<RollbackSummary, IndexerError> {
        self.set_phase(SyncPhase::RollingBack);
        let best = self.tracked_best().await?;
        self.invalidate_pending();
        self.state.lock().best = None;

        let target = best.height.saturating_sub(self.config.rollback_blocks);
        let summary = match self.storage.rollback_to(target).await {
            Ok(summary) => summary,
            Err(e) => {
                error!(target, error = %e, "rollback failed");
                return Err(e.into());
            }
        };
        self.observer.on_rollback(&summary);
        info!(from = best.height, target, floor = summary.floor, "rollback complete");
        self.set_phase(SyncPhase::Idle);
        Ok(summary)
    }

    fn invalidate_pending(&self) {
        let mut state = self.state.lock();
        state.generation += 1;
        state.next_height = None;
        state.next_epoch = None;
    }

    async fn tracked_best(&self) -> Result<BestBlock, IndexerError> {
        let cached = self.state.lock().best.clone();
        if let Some(best) = cached {
            return Ok(best);
        }
        let best = self.storage.best_block().await?;
        self.state.lock().best = Some(best.clone());
        Ok(best)
    }

    // -- Phase ---------------------------------------------------------------

    fn set_phase(&self, phase: SyncPhase) {
        self.state.lock().phase = phase;
    }

    fn set_phase_unless_rolling_back(&self, phase: SyncPhase) {
        let mut state = self.state.lock();
        if !matches!(state.phase, SyncPhase::RollbackRequired | SyncPhase::RollingBack) {
            state.phase = phase;
        }
    }

    /// Back to idle once nothing is queued and nothing is being processed.
    fn settle_idle(&self) {
        let mut state = self.state.lock();
        if matches!(state.phase, SyncPhase::Polling | SyncPhase::Syncing(_)) && self.outstanding() == 0 {
            state.phase = SyncPhase::Idle;
        }
    }

    // -- Run loop ------------------------------------------------------------

    /// Run the poller and the consumer until shutdown or a fatal error.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) -> Result<(), IndexerError> {
        info!(
            interval_secs = self.config.check_tip_interval.as_secs(),
            queue = self.config.queue_max_length,
            "chain sync started"
        );

        let mut poller = tokio::spawn(Arc::clone(&self).poll_loop(shutdown.clone()));
        let mut receiver = self.receiver.lock().await;

        let result = loop {
            tokio::select! {
                queued = receiver.recv() => {
                    let Some(queued) = queued else {
                        break Ok(());
                    };
                    match self.handle_queued(queued).await {
                        Ok(_) => {}
                        Err(e) if !e.is_fatal() => {
                            warn!(error = %e, "work item failed, retrying after next poll");
                        }
                        Err(e) => {
                            error!(error = %e, "fatal sync error");
                            break Err(e);
                        }
                    }
                }
                joined = &mut poller => {
                    break match joined {
                        Ok(result) => result,
                        Err(e) => Err(IndexerError::Worker(e.to_string())),
                    };
                }
                _ = shutdown.changed() => {
                    info!("shutdown signal received, stopping chain sync");
                    break Ok(());
                }
            }
        };

        poller.abort();
        result
    }

    async fn poll_loop(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) -> Result<(), IndexerError> {
        loop {
            match self.poll_once().await {
                Ok(outcome) => debug!(?outcome, "poll cycle finished"),
                Err(e) if !e.is_fatal() => warn!(error = %e, "node unreachable, retrying next cycle"),
                Err(e) => {
                    error!(error = %e, "poll failed");
                    return Err(e);
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(self.config.check_tip_interval) => {}
                _ = shutdown.changed() => return Ok(()),
            }
        }
    }
}

/// Index of the first block in an epoch bundle not yet applied locally.
///
/// If the local tip is inside the bundle, continue right after it.
/// Otherwise skip blocks below the local height; a block at the local
/// height that is not the local tip is either a boundary block or a fork,
/// and the chain check sorts out which.
fn continuation_offset(blocks: &[Block], best: &BestBlock) -> usize {
    let Some(last) = best.hash else {
        return 0;
    };
    if let Some(position) = blocks.iter().position(|b| b.hash == last) {
        return position + 1;
    }
    blocks
        .iter()
        .position(|b| b.height >= best.height)
        .unwrap_or(blocks.len())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use async_trait::async_trait;

    use super::*;
    use crate::decoder::block::build::{boundary, no_update, regular};
    use crate::decoder::epoch::pack;
    use crate::model::{ChunkCheckpoint, Transaction, UtxoRecord};
    use crate::storage::{CommitSummary, StorageResult};
    use crate::sync::provider::{FragmentLog, GenesisData, NodeStatus, NodeTips, Tip};

    // -- Doubles -------------------------------------------------------------

    #[derive(Default)]
    struct ScriptedProvider {
        status: Mutex<Option<NodeStatus>>,
        by_height: Mutex<HashMap<u64, Vec<u8>>>,
        by_hash: Mutex<HashMap<Hash, Vec<u8>>>,
        epochs: Mutex<HashMap<u64, Vec<u8>>>,
        fail_heights: Mutex<Vec<u64>>,
    }

    impl ScriptedProvider {
        fn set_status(&self, node_height: u64, remote: (u64, u64), packed_epochs: u64) {
            let tip = Tip {
                height: node_height,
                slot: remote,
                hash: String::new(),
            };
            *self.status.lock() = Some(NodeStatus {
                tip: NodeTips {
                    local: Some(tip.clone()),
                    remote: tip,
                },
                packed_epochs,
            });
        }

        fn serve(&self, bytes: &[u8], block: &Block, by_height: bool) {
            if by_height {
                self.by_height.lock().insert(block.height, bytes.to_vec());
            }
            self.by_hash.lock().insert(block.hash, bytes.to_vec());
        }
    }

    #[async_trait]
    impl NodeDataProvider for ScriptedProvider {
        async fn get_status(&self) -> Result<NodeStatus, TransportError> {
            self.status
                .lock()
                .clone()
                .ok_or_else(|| TransportError::NotFound("status".into()))
        }

        async fn get_block_by_height(&self, height: u64) -> Result<Vec<u8>, TransportError> {
            if self.fail_heights.lock().contains(&height) {
                return Err(TransportError::Request {
                    url: format!("/height/{height}"),
                    reason: "connection reset".into(),
                });
            }
            self.by_height
                .lock()
                .get(&height)
                .cloned()
                .ok_or_else(|| TransportError::NotFound(format!("height {height}")))
        }

        async fn get_block(&self, hash: &Hash) -> Result<Vec<u8>, TransportError> {
            self.by_hash
                .lock()
                .get(hash)
                .cloned()
                .ok_or_else(|| TransportError::NotFound(hex::encode(hash)))
        }

        async fn get_epoch(&self, epoch: u64) -> Result<Vec<u8>, TransportError> {
            self.epochs
                .lock()
                .get(&epoch)
                .cloned()
                .ok_or_else(|| TransportError::NotFound(format!("epoch {epoch}")))
        }

        async fn get_genesis(&self, _hash: &str) -> Result<GenesisData, TransportError> {
            let mut genesis = GenesisData::default();
            genesis
                .non_avvm_balances
                .insert(bs58::encode(b"genesis-address").into_string(), "42".into());
            Ok(genesis)
        }

        async fn post_signed_tx(&self, _payload: &[u8]) -> Result<(), TransportError> {
            Ok(())
        }

        async fn get_message_pool_logs(&self) -> Result<Vec<FragmentLog>, TransportError> {
            Ok(Vec::new())
        }
    }

    #[derive(Default)]
    struct MemoryStorage {
        blocks: Mutex<Vec<Block>>,
        commits: Mutex<Vec<usize>>,
        rollbacks: Mutex<Vec<u64>>,
        genesis: Mutex<Vec<UtxoRecord>>,
        launched: Mutex<bool>,
    }

    #[async_trait]
    impl StorageProcessor for MemoryStorage {
        async fn on_launch(&self) -> StorageResult<()> {
            *self.launched.lock() = true;
            Ok(())
        }

        async fn commit_blocks(&self, blocks: &[Block]) -> StorageResult<CommitSummary> {
            self.blocks.lock().extend_from_slice(blocks);
            self.commits.lock().push(blocks.len());
            Ok(CommitSummary {
                blocks: blocks.len() as u64,
                ..CommitSummary::default()
            })
        }

        async fn rollback_to(&self, height: u64) -> StorageResult<RollbackSummary> {
            self.rollbacks.lock().push(height);
            let mut blocks = self.blocks.lock();
            let before = blocks.len();
            blocks.retain(|b| b.height <= height);
            Ok(RollbackSummary {
                floor: height,
                blocks_removed: before - blocks.len(),
                ..RollbackSummary::default()
            })
        }

        async fn best_block(&self) -> StorageResult<BestBlock> {
            Ok(self
                .blocks
                .lock()
                .last()
                .map(Block::best_block)
                .unwrap_or_default())
        }

        async fn contains_block(&self, hash: &Hash) -> StorageResult<bool> {
            Ok(self.blocks.lock().iter().any(|b| &b.hash == hash))
        }

        async fn genesis_loaded(&self) -> StorageResult<bool> {
            Ok(!self.genesis.lock().is_empty())
        }

        async fn store_genesis_utxos(&self, utxos: &[UtxoRecord]) -> StorageResult<()> {
            self.genesis.lock().extend_from_slice(utxos);
            Ok(())
        }

        async fn latest_stable_chunk(&self) -> StorageResult<Option<ChunkCheckpoint>> {
            Ok(None)
        }

        async fn store_pending_tx(&self, _tx: Transaction) -> StorageResult<bool> {
            Ok(true)
        }

        async fn mark_failed(&self, _rejected: &[(Hash, String)]) -> StorageResult<usize> {
            Ok(0)
        }
    }

    // -- Fixtures ------------------------------------------------------------

    fn decoder() -> Decoder {
        Decoder::new(NetworkConfig::default())
    }

    /// Regular blocks at heights `from..=to` in `epoch`, chained onto `prev`.
    fn chain(prev: Hash, epoch: u64, from: u64, to: u64) -> Vec<(Vec<u8>, Block)> {
        let decoder = decoder();
        let mut prev = prev;
        let mut out = Vec::new();
        for height in from..=to {
            let bytes = regular(prev, epoch, height, height, vec![], no_update());
            let block = decoder.decode_block(&bytes).unwrap();
            prev = block.hash;
            out.push((bytes, block));
        }
        out
    }

    fn scheduler(
        provider: &Arc<ScriptedProvider>,
        storage: &Arc<MemoryStorage>,
        config: SchedulerConfig,
    ) -> ChainSyncScheduler {
        ChainSyncScheduler::new(
            Arc::clone(provider) as Arc<dyn NodeDataProvider>,
            Arc::clone(storage) as Arc<dyn StorageProcessor>,
            NetworkConfig::default(),
            config,
        )
    }

    fn heights(storage: &MemoryStorage) -> Vec<u64> {
        storage.blocks.lock().iter().map(|b| b.height).collect()
    }

    // -- Tests ---------------------------------------------------------------

    #[tokio::test]
    async fn syncs_block_by_block_and_bridges_boundary() {
        let provider = Arc::new(ScriptedProvider::default());
        let storage = Arc::new(MemoryStorage::default());

        let first = chain([0; 32], 0, 1, 3);
        let ebb_bytes = boundary(first[2].1.hash, 1, 3);
        let ebb = decoder().decode_block(&ebb_bytes).unwrap();
        let second = chain(ebb.hash, 1, 4, 5);

        for (bytes, block) in first.iter().chain(second.iter()) {
            provider.serve(bytes, block, true);
        }
        provider.serve(&ebb_bytes, &ebb, false);
        provider.set_status(5, (0, 20_000), 0);

        let scheduler = scheduler(&provider, &storage, SchedulerConfig::default());
        let outcome = scheduler.poll_once().await.unwrap();
        assert_eq!(
            outcome,
            PollOutcome::Enqueued {
                mode: SyncMode::BlockByBlock,
                items: 5
            }
        );
        assert_eq!(scheduler.phase(), SyncPhase::Syncing(SyncMode::BlockByBlock));

        let statuses = scheduler.drain_queue().await.unwrap();
        assert_eq!(statuses, vec![ProcessStatus::BlockProcessed; 5]);
        assert_eq!(heights(&storage), vec![1, 2, 3, 3, 4, 5]);
        assert!(storage.blocks.lock()[3].is_epoch_boundary);
        assert!(storage.rollbacks.lock().is_empty());
        assert_eq!(scheduler.phase(), SyncPhase::Idle);

        assert_eq!(scheduler.poll_once().await.unwrap(), PollOutcome::UpToDate);
    }

    #[tokio::test]
    async fn divergent_block_triggers_rollback_before_apply() {
        let provider = Arc::new(ScriptedProvider::default());
        let storage = Arc::new(MemoryStorage::default());

        let blocks = chain([0; 32], 0, 1, 100);
        storage
            .blocks
            .lock()
            .extend(blocks.iter().map(|(_, b)| b.clone()));

        // Height 101 claims a parent we have never seen.
        let fork = chain([0xEE; 32], 0, 101, 102);
        for (bytes, block) in &fork {
            provider.serve(bytes, block, true);
        }
        provider.by_hash.lock().clear();
        provider.set_status(102, (0, 200), 0);

        let scheduler = scheduler(&provider, &storage, SchedulerConfig::default());
        let outcome = scheduler.poll_once().await.unwrap();
        assert_eq!(
            outcome,
            PollOutcome::Enqueued {
                mode: SyncMode::BlockByBlock,
                items: 2
            }
        );

        let statuses = scheduler.drain_queue().await.unwrap();
        // 102 was enqueued before the rollback and is dropped as stale.
        assert_eq!(statuses, vec![ProcessStatus::RollbackRequired]);
        assert_eq!(*storage.rollbacks.lock(), vec![0]);
        assert!(!storage.blocks.lock().iter().any(|b| b.height > 100));
        assert_eq!(scheduler.phase(), SyncPhase::Idle);
    }

    #[tokio::test]
    async fn poll_during_processing_stays_syncing() {
        let provider = Arc::new(ScriptedProvider::default());
        let storage = Arc::new(MemoryStorage::default());
        let (bytes, block) = chain([0; 32], 0, 1, 1).remove(0);
        provider.serve(&bytes, &block, true);
        provider.set_status(1, (0, 10), 0);

        let scheduler = scheduler(&provider, &storage, SchedulerConfig::default());
        scheduler.poll_once().await.unwrap();

        // The consumer has taken the item but not committed it yet.
        let queued = scheduler.receiver.lock().await.try_recv().unwrap();
        assert_eq!(scheduler.queue_depth(), 0);
        assert_eq!(scheduler.outstanding(), 1);

        let outcome = scheduler.poll_once().await.unwrap();
        assert_eq!(
            outcome,
            PollOutcome::Enqueued {
                mode: SyncMode::BlockByBlock,
                items: 0
            }
        );
        assert_eq!(scheduler.phase(), SyncPhase::Syncing(SyncMode::BlockByBlock));

        let status = scheduler.handle_queued(queued).await.unwrap();
        assert_eq!(status, Some(ProcessStatus::BlockProcessed));
        assert_eq!(scheduler.outstanding(), 0);
        assert_eq!(scheduler.phase(), SyncPhase::Idle);
    }

    #[tokio::test]
    async fn queue_bound_applies_backpressure() {
        let provider = Arc::new(ScriptedProvider::default());
        let storage = Arc::new(MemoryStorage::default());
        for (bytes, block) in &chain([0; 32], 0, 1, 10) {
            provider.serve(bytes, block, true);
        }
        provider.set_status(10, (0, 100), 0);

        let config = SchedulerConfig {
            queue_max_length: 2,
            ..SchedulerConfig::default()
        };
        let scheduler = scheduler(&provider, &storage, config);

        assert_eq!(
            scheduler.poll_once().await.unwrap(),
            PollOutcome::Enqueued {
                mode: SyncMode::BlockByBlock,
                items: 2
            }
        );
        assert_eq!(scheduler.queue_depth(), 2);
        assert_eq!(scheduler.poll_once().await.unwrap(), PollOutcome::Backpressure);

        scheduler.drain_queue().await.unwrap();
        assert_eq!(heights(&storage), vec![1, 2]);

        scheduler.poll_once().await.unwrap();
        scheduler.drain_queue().await.unwrap();
        assert_eq!(heights(&storage), vec![1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn empty_epoch_is_reported() {
        let provider = Arc::new(ScriptedProvider::default());
        let storage = Arc::new(MemoryStorage::default());
        provider.epochs.lock().insert(0, pack(Vec::<&[u8]>::new()));
        provider.set_status(50_000, (10, 5_000), 1);

        let scheduler = scheduler(&provider, &storage, SchedulerConfig::default());
        assert_eq!(
            scheduler.poll_once().await.unwrap(),
            PollOutcome::Enqueued {
                mode: SyncMode::EpochBulk,
                items: 1
            }
        );
        let statuses = scheduler.drain_queue().await.unwrap();
        assert_eq!(statuses, vec![ProcessStatus::EpochEmpty]);
        assert!(storage.blocks.lock().is_empty());
    }

    #[tokio::test]
    async fn epoch_continues_after_partial_apply() {
        let provider = Arc::new(ScriptedProvider::default());
        let storage = Arc::new(MemoryStorage::default());

        let epoch = chain([0; 32], 0, 1, 5);
        storage
            .blocks
            .lock()
            .extend(epoch[..2].iter().map(|(_, b)| b.clone()));
        let packed = pack(epoch.iter().map(|(bytes, _)| bytes.as_slice()));
        provider.epochs.lock().insert(0, packed);

        let config = SchedulerConfig {
            epoch_commit_batch: 2,
            ..SchedulerConfig::default()
        };
        let scheduler = scheduler(&provider, &storage, config);
        let status = scheduler.process_item(WorkItem::Epoch { epoch: 0 }).await.unwrap();

        assert_eq!(status, ProcessStatus::EpochProcessed);
        assert_eq!(heights(&storage), vec![1, 2, 3, 4, 5]);
        assert_eq!(*storage.commits.lock(), vec![2, 1]);
    }

    #[tokio::test]
    async fn transport_failure_replans_from_committed_tip() {
        let provider = Arc::new(ScriptedProvider::default());
        let storage = Arc::new(MemoryStorage::default());
        for (bytes, block) in &chain([0; 32], 0, 1, 3) {
            provider.serve(bytes, block, true);
        }
        provider.set_status(3, (0, 100), 0);
        provider.fail_heights.lock().push(2);

        let scheduler = scheduler(&provider, &storage, SchedulerConfig::default());
        scheduler.poll_once().await.unwrap();
        let err = scheduler.drain_queue().await.unwrap_err();
        assert!(!err.is_fatal());
        assert_eq!(heights(&storage), vec![1]);

        provider.fail_heights.lock().clear();
        // Height 3 is still queued but stale; the next poll re-enqueues 2..=3.
        scheduler.poll_once().await.unwrap();
        let statuses = scheduler.drain_queue().await.unwrap();
        assert_eq!(statuses.len(), 2);
        assert_eq!(heights(&storage), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn node_without_local_tip_is_a_noop() {
        let provider = Arc::new(ScriptedProvider::default());
        let storage = Arc::new(MemoryStorage::default());
        let remote = Tip {
            height: 10,
            slot: (0, 10),
            hash: String::new(),
        };
        *provider.status.lock() = Some(NodeStatus {
            tip: NodeTips {
                local: None,
                remote,
            },
            packed_epochs: 0,
        });

        let scheduler = scheduler(&provider, &storage, SchedulerConfig::default());
        assert_eq!(scheduler.poll_once().await.unwrap(), PollOutcome::NodeNotReady);
        assert_eq!(scheduler.queue_depth(), 0);
    }

    #[tokio::test]
    async fn prepare_loads_genesis_once() {
        let provider = Arc::new(ScriptedProvider::default());
        let storage = Arc::new(MemoryStorage::default());
        let scheduler = scheduler(&provider, &storage, SchedulerConfig::default());

        assert_eq!(scheduler.prepare("abc").await.unwrap(), 1);
        assert!(*storage.launched.lock());
        assert_eq!(storage.genesis.lock()[0].amount, 42);
        assert_eq!(scheduler.prepare("abc").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn run_stops_on_shutdown() {
        let provider = Arc::new(ScriptedProvider::default());
        let storage = Arc::new(MemoryStorage::default());
        for (bytes, block) in &chain([0; 32], 0, 1, 2) {
            provider.serve(bytes, block, true);
        }
        provider.set_status(2, (0, 100), 0);

        let scheduler = Arc::new(scheduler(&provider, &storage, SchedulerConfig::default()));
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(Arc::clone(&scheduler).run(rx));

        for _ in 0..100 {
            if heights(&storage).len() == 2 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        tx.send(true).unwrap();
        handle.await.unwrap().unwrap();
        assert_eq!(heights(&storage), vec![1, 2]);
    }

    #[test]
    fn continuation_skips_applied_prefix() {
        let blocks: Vec<Block> = chain([0; 32], 0, 1, 5).into_iter().map(|(_, b)| b).collect();
        assert_eq!(continuation_offset(&blocks, &BestBlock::default()), 0);
        assert_eq!(continuation_offset(&blocks, &blocks[1].best_block()), 2);

        // Local tip outside the bundle: skip by height.
        let elsewhere = BestBlock {
            height: 3,
            epoch: 0,
            slot: Some(3),
            hash: Some([9; 32]),
        };
        assert_eq!(continuation_offset(&blocks, &elsewhere), 2);
    }
}
