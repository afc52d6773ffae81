//! The storage processor: commit, rollback and chunk checkpointing on top
//! of [`IndexerDB`].

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::db::{BlockRecord, IndexerDB, RollbackSummary, StorageError, StorageResult, WriteSet};
use crate::config::CHUNK_STABLE_INTERVAL;
use crate::crypto::Hash;
use crate::ledger::LedgerTracker;
use crate::model::{
    BestBlock, Block, ChunkCheckpoint, PendingTransaction, Transaction, TxStatus, UtxoRecord,
};

/// What one commit wrote.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitSummary {
    pub chunk: u64,
    pub blocks: u64,
    pub transactions: u64,
    pub txios: u64,
    /// Whether this chunk was sealed with a stable checkpoint.
    pub checkpoint: bool,
}

/// Durable side of the indexer. The only writer of indexed state.
#[async_trait]
pub trait StorageProcessor: Send + Sync {
    /// Prepare for a sync run: drop anything committed after the latest
    /// stable checkpoint.
    async fn on_launch(&self) -> StorageResult<()>;

    /// Commit blocks, in chain order, as one all-or-nothing chunk.
    async fn commit_blocks(&self, blocks: &[Block]) -> StorageResult<CommitSummary>;

    /// Undo everything above `min(latest stable checkpoint, height)`.
    async fn rollback_to(&self, height: u64) -> StorageResult<RollbackSummary>;

    async fn best_block(&self) -> StorageResult<BestBlock>;

    async fn contains_block(&self, hash: &Hash) -> StorageResult<bool>;

    async fn genesis_loaded(&self) -> StorageResult<bool>;

    /// Store the initial output distribution as its own sealed chunk.
    async fn store_genesis_utxos(&self, utxos: &[UtxoRecord]) -> StorageResult<()>;

    async fn latest_stable_chunk(&self) -> StorageResult<Option<ChunkCheckpoint>>;

    /// Track a transaction submitted to the node until it lands in a block
    /// or is rejected. Returns `false` if it is already in a block.
    async fn store_pending_tx(&self, tx: Transaction) -> StorageResult<bool>;

    /// Mark pending transactions as failed with the node's reason. Unknown
    /// hashes and transactions already in a block are ignored. Returns how
    /// many records changed.
    async fn mark_failed(&self, rejected: &[(Hash, String)]) -> StorageResult<usize>;
}

/// [`StorageProcessor`] backed by sled.
pub struct SledStorageProcessor {
    db: IndexerDB,
    /// Held for the whole derive-and-apply of a write, released on every
    /// exit path when the guard drops.
    write_lock: Mutex<()>,
}

impl SledStorageProcessor {
    pub fn new(db: IndexerDB) -> Self {
        Self {
            db,
            write_lock: Mutex::new(()),
        }
    }

    /// Read access for queries.
    pub fn db(&self) -> &IndexerDB {
        &self.db
    }

    fn commit_blocks_sync(&self, blocks: &[Block]) -> StorageResult<CommitSummary> {
        let _guard = self.write_lock.lock();

        // A block already stored (e.g. replayed from a partially applied
        // epoch) is skipped rather than applied twice.
        let mut fresh = Vec::with_capacity(blocks.len());
        for block in blocks {
            if self.db.contains_block(&block.hash)? {
                debug!(height = block.height, hash = %block.hash_hex(), "block already stored, skipping");
            } else {
                fresh.push(block);
            }
        }
        if fresh.is_empty() {
            return Ok(CommitSummary::default());
        }

        let mut tracker = LedgerTracker::new(&self.db);
        for block in &fresh {
            tracker.apply_block(block)?;
        }
        let delta = tracker.finish();

        let chunk = self.db.last_chunk()? + 1;
        let summary = CommitSummary {
            chunk,
            blocks: fresh.len() as u64,
            transactions: delta.transactions.len() as u64,
            txios: delta.txio_count(),
            checkpoint: chunk % CHUNK_STABLE_INTERVAL == 0,
        };

        let mut writes = WriteSet::new();
        for block in &fresh {
            let totals = delta.block_totals.get(&block.hash).copied().unwrap_or_default();
            writes.put_block(&BlockRecord::from(*block).with_totals(totals))?;
        }
        for tx in &delta.transactions {
            writes.put_transaction(tx)?;
            writes.remove_pending(&tx.tx.id);
        }
        for spent in &delta.spent {
            writes.spend(spent)?;
        }
        for utxo in &delta.unspent {
            writes.put_utxo(utxo)?;
        }
        for row in &delta.account_rows {
            writes.put_account_row(row)?;
        }
        for (account, state) in &delta.accounts {
            writes.put_account(account, state)?;
        }
        for row in &delta.address_rows {
            writes.put_address_row(row)?;
        }
        for (address, balance) in &delta.addresses {
            writes.put_address(address, balance)?;
        }
        for record in &delta.delegations {
            writes.put_delegation(record)?;
        }
        for record in &delta.certificates {
            writes.put_certificate(record)?;
        }
        writes.set_last_chunk(chunk);
        if summary.checkpoint {
            let height = fresh.iter().map(|b| b.height).max().unwrap_or_default();
            writes.put_checkpoint(&ChunkCheckpoint {
                chunk,
                block_count: summary.blocks,
                tx_count: summary.transactions,
                txio_count: summary.txios,
                height,
            })?;
        }

        self.db.apply(writes)?;
        debug!(
            chunk,
            blocks = summary.blocks,
            txs = summary.transactions,
            checkpoint = summary.checkpoint,
            "committed chunk"
        );
        Ok(summary)
    }

    fn rollback_sync(&self, height: u64) -> StorageResult<RollbackSummary> {
        let _guard = self.write_lock.lock();
        let stable_height = self
            .db
            .latest_checkpoint()?
            .map(|checkpoint| checkpoint.height)
            .unwrap_or(0);
        let floor = stable_height.min(height);
        let summary = self.db.remove_records_after_height(floor)?;
        info!(
            requested = height,
            floor,
            blocks = summary.blocks_removed,
            txs = summary.transactions_removed,
            restored_utxos = summary.utxos_restored,
            "rolled back"
        );
        Ok(summary)
    }
}

#[async_trait]
impl StorageProcessor for SledStorageProcessor {
    async fn on_launch(&self) -> StorageResult<()> {
        let _guard = self.write_lock.lock();
        let Some(checkpoint) = self.db.latest_checkpoint()? else {
            info!("no stable checkpoint yet, nothing to clean up");
            return Ok(());
        };
        let summary = self.db.remove_records_after_height(checkpoint.height)?;
        let mut writes = WriteSet::new();
        writes.set_last_chunk(checkpoint.chunk);
        self.db.apply(writes)?;
        if summary.blocks_removed > 0 {
            warn!(
                chunk = checkpoint.chunk,
                height = checkpoint.height,
                blocks = summary.blocks_removed,
                "removed unsealed blocks"
            );
        }
        Ok(())
    }

    async fn commit_blocks(&self, blocks: &[Block]) -> StorageResult<CommitSummary> {
        self.commit_blocks_sync(blocks)
    }

    async fn rollback_to(&self, height: u64) -> StorageResult<RollbackSummary> {
        self.rollback_sync(height)
    }

    async fn best_block(&self) -> StorageResult<BestBlock> {
        self.db.best_block()
    }

    async fn contains_block(&self, hash: &Hash) -> StorageResult<bool> {
        self.db.contains_block(hash)
    }

    async fn genesis_loaded(&self) -> StorageResult<bool> {
        self.db.genesis_loaded()
    }

    async fn store_genesis_utxos(&self, utxos: &[UtxoRecord]) -> StorageResult<()> {
        let _guard = self.write_lock.lock();
        if self.db.genesis_loaded()? {
            return Err(StorageError::Corrupt("genesis already loaded".into()));
        }
        let mut tracker = LedgerTracker::new(&self.db);
        tracker.apply_genesis(utxos)?;
        let delta = tracker.finish();

        let chunk = self.db.last_chunk()? + 1;
        let mut writes = WriteSet::new();
        for utxo in &delta.unspent {
            writes.put_utxo(utxo)?;
        }
        for tx in &delta.transactions {
            writes.put_transaction(tx)?;
        }
        for row in &delta.address_rows {
            writes.put_address_row(row)?;
        }
        for (address, balance) in &delta.addresses {
            writes.put_address(address, balance)?;
        }
        writes.set_genesis_supply(delta.supply);
        writes.set_genesis_loaded();
        writes.set_last_chunk(chunk);
        writes.put_checkpoint(&ChunkCheckpoint {
            chunk,
            block_count: 0,
            tx_count: delta.transactions.len() as u64,
            txio_count: utxos.len() as u64,
            height: 0,
        })?;
        self.db.apply(writes)?;
        info!(
            utxos = utxos.len(),
            txs = delta.transactions.len(),
            supply = delta.supply,
            chunk,
            "stored genesis outputs"
        );
        Ok(())
    }

    async fn latest_stable_chunk(&self) -> StorageResult<Option<ChunkCheckpoint>> {
        self.db.latest_checkpoint()
    }

    async fn store_pending_tx(&self, mut tx: Transaction) -> StorageResult<bool> {
        let _guard = self.write_lock.lock();
        if self.db.transaction(&tx.id)?.is_some() {
            return Ok(false);
        }
        tx.status = TxStatus::Pending;
        let mut writes = WriteSet::new();
        writes.put_pending(&PendingTransaction {
            tx,
            submitted_at: Utc::now(),
            reason: None,
        })?;
        self.db.apply(writes)?;
        Ok(true)
    }

    async fn mark_failed(&self, rejected: &[(Hash, String)]) -> StorageResult<usize> {
        let _guard = self.write_lock.lock();
        let mut writes = WriteSet::new();
        let mut changed = 0;
        for (hash, reason) in rejected {
            let Some(mut pending) = self.db.pending_transaction(hash)? else {
                continue;
            };
            if pending.tx.status == TxStatus::Failed || self.db.transaction(hash)?.is_some() {
                continue;
            }
            pending.tx.status = TxStatus::Failed;
            pending.reason = Some(reason.clone());
            writes.put_pending(&pending)?;
            changed += 1;
        }
        self.db.apply(writes)?;
        if changed > 0 {
            info!(failed = changed, "marked rejected transactions as failed");
        }
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::ledger::LedgerError;
    use crate::model::{Input, Output, Transaction, TxContext, TxStatus, UtxoKey};

    fn genesis(seed: u8, amount: u64) -> UtxoRecord {
        UtxoRecord {
            tx_hash: [seed; 32],
            index: 0,
            address: format!("genesis{seed}"),
            amount,
            block_num: 0,
        }
    }

    fn hash(height: u64) -> Hash {
        let mut h = [0u8; 32];
        h[..8].copy_from_slice(&height.to_be_bytes());
        h
    }

    fn block(height: u64, transactions: Vec<Transaction>) -> Block {
        Block {
            hash: hash(height),
            prev_hash: hash(height.saturating_sub(1)),
            epoch: 0,
            slot: Some(height),
            height,
            is_epoch_boundary: false,
            time: Utc::now(),
            transactions,
            update: None,
        }
    }

    fn transfer(id: u8, from: UtxoKey, to: &str, value: u64) -> Transaction {
        Transaction {
            id: [id; 32],
            inputs: vec![Input::Utxo {
                tx_id: from.tx_hash,
                index: from.index,
            }],
            outputs: vec![Output::Utxo {
                address: to.into(),
                value,
            }],
            certificate: None,
            body: Vec::new(),
            context: TxContext::default(),
            status: TxStatus::Success,
        }
    }

    fn processor() -> SledStorageProcessor {
        SledStorageProcessor::new(IndexerDB::open_temporary().unwrap())
    }

    #[tokio::test]
    async fn genesis_is_its_own_sealed_chunk() {
        let storage = processor();
        assert!(!storage.genesis_loaded().await.unwrap());
        storage
            .store_genesis_utxos(&[genesis(1, 10), genesis(2, 20)])
            .await
            .unwrap();

        assert!(storage.genesis_loaded().await.unwrap());
        let checkpoint = storage.latest_stable_chunk().await.unwrap().unwrap();
        assert_eq!(checkpoint.chunk, 1);
        assert_eq!(checkpoint.height, 0);
        assert_eq!(storage.db().unspent_outputs().unwrap().len(), 2);
        assert!(storage.store_genesis_utxos(&[]).await.is_err());
    }

    #[tokio::test]
    async fn genesis_outputs_get_transactions_and_supply() {
        let storage = processor();
        storage
            .store_genesis_utxos(&[genesis(1, 10), genesis(2, 20)])
            .await
            .unwrap();

        let checkpoint = storage.latest_stable_chunk().await.unwrap().unwrap();
        assert_eq!(checkpoint.tx_count, 2);
        assert_eq!(checkpoint.txio_count, 2);

        let stored = storage.db().transaction(&[2; 32]).unwrap().unwrap();
        assert!(stored.is_genesis);
        assert_eq!(stored.tx.outputs[0].value(), 20);
        assert_eq!(stored.value.supply_after, 30);
        assert_eq!(storage.db().supply().unwrap(), 30);
        assert_eq!(storage.db().address_balance("genesis1").unwrap().unwrap().balance, 10);
    }

    #[tokio::test]
    async fn block_totals_and_address_balances_roll_back() {
        let storage = processor();
        storage.store_genesis_utxos(&[genesis(1, 100)]).await.unwrap();

        // 100 in, 90 out: a fee of 10 leaves the supply.
        let spend = transfer(7, UtxoKey::new([1; 32], 0), "bob", 90);
        storage.commit_blocks(&[block(1, vec![spend])]).await.unwrap();

        let record = storage.db().block_at(1).unwrap().unwrap();
        assert_eq!((record.sent, record.fees, record.supply_after), (90, 10, 90));
        let stored = storage.db().transaction(&[7; 32]).unwrap().unwrap();
        assert_eq!(stored.value.fee, 10);
        assert_eq!(storage.db().supply().unwrap(), 90);
        assert_eq!(storage.db().address_balance("bob").unwrap().unwrap().balance, 90);
        assert_eq!(storage.db().address_balance("genesis1").unwrap().unwrap().balance, 0);
        assert_eq!(storage.db().address_history("genesis1").unwrap().len(), 2);

        let summary = storage.rollback_to(0).await.unwrap();
        assert_eq!(summary.addresses_recomputed, 2);
        assert!(storage.db().address_balance("bob").unwrap().is_none());
        assert!(storage.db().address_history("bob").unwrap().is_empty());
        assert_eq!(storage.db().address_balance("genesis1").unwrap().unwrap().balance, 100);
        assert_eq!(storage.db().address_history("genesis1").unwrap().len(), 1);
        assert_eq!(storage.db().supply().unwrap(), 100);
    }

    #[tokio::test]
    async fn pending_transactions_fail_or_land() {
        let storage = processor();
        storage.store_genesis_utxos(&[genesis(1, 100)]).await.unwrap();

        let rejected = transfer(5, UtxoKey::new([1; 32], 0), "carol", 100);
        let landed = transfer(6, UtxoKey::new([1; 32], 0), "dave", 100);
        assert!(storage.store_pending_tx(rejected.clone()).await.unwrap());
        assert!(storage.store_pending_tx(landed.clone()).await.unwrap());

        let changed = storage
            .mark_failed(&[([5; 32], "double spend".into()), ([0xab; 32], "unknown".into())])
            .await
            .unwrap();
        assert_eq!(changed, 1);
        let failed = storage.db().pending_transaction(&[5; 32]).unwrap().unwrap();
        assert_eq!(failed.tx.status, TxStatus::Failed);
        assert_eq!(failed.reason.as_deref(), Some("double spend"));
        let waiting = storage.db().pending_transaction(&[6; 32]).unwrap().unwrap();
        assert_eq!(waiting.tx.status, TxStatus::Pending);
        // Reporting the same rejection again changes nothing.
        assert_eq!(storage.mark_failed(&[([5; 32], "again".into())]).await.unwrap(), 0);

        // Once committed in a block the pending record goes away.
        storage.commit_blocks(&[block(1, vec![landed.clone()])]).await.unwrap();
        assert!(storage.db().pending_transaction(&[6; 32]).unwrap().is_none());
        assert!(!storage.store_pending_tx(landed).await.unwrap());
        assert_eq!(storage.db().pending_transactions().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn every_tenth_chunk_is_sealed() {
        let storage = processor();
        for height in 1..=10 {
            let summary = storage.commit_blocks(&[block(height, vec![])]).await.unwrap();
            assert_eq!(summary.chunk, height);
            assert_eq!(summary.checkpoint, height == 10);
        }
        let checkpoints = storage.db().checkpoints().unwrap();
        assert_eq!(checkpoints.len(), 1);
        assert_eq!(checkpoints[0].chunk, 10);
        assert_eq!(checkpoints[0].height, 10);
    }

    #[tokio::test]
    async fn failed_derivation_writes_nothing() {
        let storage = processor();
        let bad = transfer(9, UtxoKey::new([0xee; 32], 0), "x", 1);
        let result = storage
            .commit_blocks(&[block(1, vec![]), block(2, vec![bad])])
            .await;
        assert!(matches!(
            result,
            Err(StorageError::Ledger(LedgerError::UnknownUtxo { .. }))
        ));
        assert_eq!(storage.db().block_count(), 0);
        assert_eq!(storage.db().last_chunk().unwrap(), 0);
    }

    #[tokio::test]
    async fn rollback_restores_spent_outputs() {
        let storage = processor();
        storage.store_genesis_utxos(&[genesis(1, 100)]).await.unwrap();

        let spend = transfer(7, UtxoKey::new([1; 32], 0), "bob", 100);
        storage.commit_blocks(&[block(1, vec![spend])]).await.unwrap();
        assert!(storage.db().utxo(&UtxoKey::new([1; 32], 0)).unwrap().is_none());

        let summary = storage.rollback_to(0).await.unwrap();
        assert_eq!(summary.floor, 0);
        assert_eq!(summary.blocks_removed, 1);
        assert_eq!(summary.utxos_restored, 1);

        let unspent = storage.db().unspent_outputs().unwrap();
        assert_eq!(unspent, vec![genesis(1, 100)]);
        assert!(storage.db().spent_outputs().unwrap().is_empty());
        assert!(storage.db().transaction(&[7; 32]).unwrap().is_none());
        assert_eq!(storage.best_block().await.unwrap(), BestBlock::default());
    }

    #[tokio::test]
    async fn rollback_floor_is_capped_by_stable_checkpoint() {
        let storage = processor();
        for height in 1..=12 {
            storage.commit_blocks(&[block(height, vec![])]).await.unwrap();
        }
        // Stable checkpoint at height 10; asking for 11 still rewinds to 10.
        let summary = storage.rollback_to(11).await.unwrap();
        assert_eq!(summary.floor, 10);
        assert_eq!(storage.best_block().await.unwrap().height, 10);

        // Asking below the checkpoint rewinds there and drops the checkpoint.
        let summary = storage.rollback_to(4).await.unwrap();
        assert_eq!(summary.floor, 4);
        assert_eq!(summary.checkpoints_removed, 1);
        assert!(storage.latest_stable_chunk().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn on_launch_drops_unsealed_blocks() {
        let storage = processor();
        for height in 1..=13 {
            storage.commit_blocks(&[block(height, vec![])]).await.unwrap();
        }
        storage.on_launch().await.unwrap();
        assert_eq!(storage.best_block().await.unwrap().height, 10);
        assert_eq!(storage.db().last_chunk().unwrap(), 10);

        // The next commit continues the chunk sequence after the checkpoint.
        let summary = storage.commit_blocks(&[block(11, vec![])]).await.unwrap();
        assert_eq!(summary.chunk, 11);
    }

    #[tokio::test]
    async fn already_stored_blocks_are_skipped() {
        let storage = processor();
        storage.commit_blocks(&[block(1, vec![])]).await.unwrap();
        let summary = storage.commit_blocks(&[block(1, vec![])]).await.unwrap();
        assert_eq!(summary, CommitSummary::default());
        assert_eq!(storage.db().block_count(), 1);
    }
}
