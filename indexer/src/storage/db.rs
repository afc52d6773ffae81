//! # IndexerDB - sled-backed Index Store
//!
//! All indexed data lives in a single sled tree, `index`, split into
//! keyspaces by a one-byte prefix (see `keys.rs`):
//!
//! | Prefix | Key                              | Value                        |
//! |--------|----------------------------------|------------------------------|
//! | `b`    | height (8B BE) + boundary flag   | `bincode(BlockRecord)`       |
//! | `h`    | block hash                       | block key                    |
//! | `t`    | tx hash                          | `bincode(StoredTransaction)` |
//! | `u`    | tx hash + index (4B BE)          | `bincode(UtxoRecord)`        |
//! | `s`    | tx hash + index (4B BE)          | `bincode(SpentUtxo)`         |
//! | `l`    | account + 0x00 + height + row    | `bincode(AccountLedgerRow)`  |
//! | `a`    | account                          | `bincode(AccountState)`      |
//! | `r`    | address + 0x00 + height + row    | `bincode(AddressLedgerRow)`  |
//! | `w`    | address                          | `bincode(AddressBalance)`    |
//! | `p`    | tx hash                          | `bincode(PendingTransaction)`|
//! | `d`    | tx hash + cert ordinal           | `bincode(DelegationRecord)`  |
//! | `c`    | tx hash + cert ordinal           | `bincode(CertificateRecord)` |
//! | `k`    | chunk (8B BE)                    | `bincode(ChunkCheckpoint)`   |
//! | `m`    | name                             | raw bytes                    |
//!
//! ## Atomicity
//!
//! One tree means one `Batch` covers every keyspace, and sled applies a
//! batch atomically. Commits and rollbacks build a [`WriteSet`] in memory
//! and hand it to [`IndexerDB::apply`]; until then nothing is visible.

use std::collections::BTreeSet;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sled::{Batch, Db, IVec, Tree};

use super::keys;
use crate::crypto::Hash;
use crate::ledger::{LedgerError, LedgerReader};
use crate::model::{
    AccountLedgerRow, AccountState, AddressBalance, AddressLedgerRow, BestBlock, Block,
    BlockTotals, CertificateRecord, ChunkCheckpoint, DelegationRecord, Input, Output,
    PendingTransaction, SpentUtxo, StoredTransaction, TxStatus, UpdatePayload, UtxoKey,
    UtxoRecord,
};

// ---------------------------------------------------------------------------
// Error Type
// ---------------------------------------------------------------------------

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("corrupt record: {0}")]
    Corrupt(String),

    /// The batch could not be derived; nothing was written.
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

pub type StorageResult<T> = Result<T, StorageError>;

fn encode<T: Serialize>(value: &T) -> StorageResult<Vec<u8>> {
    bincode::serialize(value).map_err(|e| StorageError::Serialization(e.to_string()))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> StorageResult<T> {
    bincode::deserialize(bytes).map_err(|e| StorageError::Serialization(e.to_string()))
}

// ---------------------------------------------------------------------------
// BlockRecord
// ---------------------------------------------------------------------------

/// A block as stored: header fields plus the ids of its transactions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRecord {
    pub hash: Hash,
    pub prev_hash: Hash,
    pub epoch: u64,
    pub slot: Option<u64>,
    pub height: u64,
    pub is_epoch_boundary: bool,
    pub time: DateTime<Utc>,
    pub tx_hashes: Vec<Hash>,
    pub update: Option<UpdatePayload>,
    pub sent: u64,
    pub fees: u64,
    /// Circulating supply once the block is applied.
    pub supply_after: i64,
}

impl From<&Block> for BlockRecord {
    fn from(block: &Block) -> Self {
        Self {
            hash: block.hash,
            prev_hash: block.prev_hash,
            epoch: block.epoch,
            slot: block.slot,
            height: block.height,
            is_epoch_boundary: block.is_epoch_boundary,
            time: block.time,
            tx_hashes: block.transactions.iter().map(|tx| tx.id).collect(),
            update: block.update.clone(),
            sent: 0,
            fees: 0,
            supply_after: 0,
        }
    }
}

impl BlockRecord {
    pub fn key(&self) -> Vec<u8> {
        keys::block(self.height, self.is_epoch_boundary)
    }

    pub fn with_totals(mut self, totals: BlockTotals) -> Self {
        self.sent = totals.sent;
        self.fees = totals.fees;
        self.supply_after = totals.supply_after;
        self
    }

    pub fn best_block(&self) -> BestBlock {
        BestBlock {
            height: self.height,
            epoch: self.epoch,
            slot: self.slot,
            hash: Some(self.hash),
        }
    }
}

// ---------------------------------------------------------------------------
// WriteSet
// ---------------------------------------------------------------------------

/// Pending writes across all keyspaces, applied atomically.
#[derive(Default)]
pub struct WriteSet {
    batch: Batch,
    ops: usize,
}

impl WriteSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of queued operations.
    pub fn len(&self) -> usize {
        self.ops
    }

    pub fn is_empty(&self) -> bool {
        self.ops == 0
    }

    fn put<T: Serialize>(&mut self, key: Vec<u8>, value: &T) -> StorageResult<()> {
        self.batch.insert(key, encode(value)?);
        self.ops += 1;
        Ok(())
    }

    fn remove(&mut self, key: Vec<u8>) {
        self.batch.remove(key);
        self.ops += 1;
    }

    pub fn put_block(&mut self, block: &BlockRecord) -> StorageResult<()> {
        self.batch.insert(keys::block_hash(&block.hash), block.key());
        self.ops += 1;
        self.put(block.key(), block)
    }

    pub fn remove_block(&mut self, block: &BlockRecord) {
        self.remove(keys::block_hash(&block.hash));
        self.remove(block.key());
    }

    pub fn put_transaction(&mut self, tx: &StoredTransaction) -> StorageResult<()> {
        self.put(keys::transaction(&tx.tx.id), tx)
    }

    pub fn remove_transaction(&mut self, hash: &Hash) {
        self.remove(keys::transaction(hash));
    }

    pub fn put_utxo(&mut self, utxo: &UtxoRecord) -> StorageResult<()> {
        self.put(keys::utxo(&utxo.key()), utxo)
    }

    pub fn remove_utxo(&mut self, key: &UtxoKey) {
        self.remove(keys::utxo(key));
    }

    /// Move an output from the unspent set to the spent set.
    pub fn spend(&mut self, spent: &SpentUtxo) -> StorageResult<()> {
        let key = spent.utxo.key();
        self.remove(keys::utxo(&key));
        self.put(keys::spent(&key), spent)
    }

    pub fn remove_spent(&mut self, key: &UtxoKey) {
        self.remove(keys::spent(key));
    }

    pub fn put_account_row(&mut self, row: &AccountLedgerRow) -> StorageResult<()> {
        self.put(
            keys::account_row(&row.account, row.block_num, row.row_ordinal),
            row,
        )
    }

    fn remove_raw(&mut self, key: IVec) {
        self.batch.remove(key);
        self.ops += 1;
    }

    pub fn put_account(&mut self, account: &str, state: &AccountState) -> StorageResult<()> {
        self.put(keys::account(account), state)
    }

    pub fn remove_account(&mut self, account: &str) {
        self.remove(keys::account(account));
    }

    pub fn put_address_row(&mut self, row: &AddressLedgerRow) -> StorageResult<()> {
        self.put(
            keys::address_row(&row.address, row.block_num, row.row_ordinal),
            row,
        )
    }

    pub fn put_address(&mut self, address: &str, balance: &AddressBalance) -> StorageResult<()> {
        self.put(keys::address(address), balance)
    }

    pub fn remove_address(&mut self, address: &str) {
        self.remove(keys::address(address));
    }

    pub fn put_pending(&mut self, pending: &PendingTransaction) -> StorageResult<()> {
        self.put(keys::pending(&pending.tx.id), pending)
    }

    pub fn remove_pending(&mut self, hash: &Hash) {
        self.remove(keys::pending(hash));
    }

    pub fn put_delegation(&mut self, record: &DelegationRecord) -> StorageResult<()> {
        self.put(keys::delegation(&record.tx_hash, record.cert_ordinal), record)
    }

    pub fn put_certificate(&mut self, record: &CertificateRecord) -> StorageResult<()> {
        self.put(keys::certificate(&record.tx_hash, record.cert_ordinal), record)
    }

    /// Remove any certificate and delegation recorded for `tx_hash`.
    pub fn remove_certificates(&mut self, tx_hash: &Hash) {
        self.remove(keys::delegation(tx_hash, 0));
        self.remove(keys::certificate(tx_hash, 0));
    }

    pub fn put_checkpoint(&mut self, checkpoint: &ChunkCheckpoint) -> StorageResult<()> {
        self.put(keys::chunk(checkpoint.chunk), checkpoint)
    }

    pub fn remove_checkpoint(&mut self, chunk: u64) {
        self.remove(keys::chunk(chunk));
    }

    pub fn set_last_chunk(&mut self, chunk: u64) {
        self.batch
            .insert(keys::META_LAST_CHUNK, chunk.to_be_bytes().to_vec());
        self.ops += 1;
    }

    pub fn set_genesis_loaded(&mut self) {
        self.batch.insert(keys::META_GENESIS, vec![1u8]);
        self.ops += 1;
    }

    pub fn set_genesis_supply(&mut self, supply: i64) {
        self.batch
            .insert(keys::META_GENESIS_SUPPLY, supply.to_be_bytes().to_vec());
        self.ops += 1;
    }
}

/// What a rollback removed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RollbackSummary {
    pub floor: u64,
    pub blocks_removed: usize,
    pub transactions_removed: usize,
    pub utxos_restored: usize,
    pub accounts_recomputed: usize,
    pub addresses_recomputed: usize,
    pub checkpoints_removed: usize,
}

// ---------------------------------------------------------------------------
// IndexerDB
// ---------------------------------------------------------------------------

/// Persistent index store.
///
/// Cheap to clone; clones share the same sled handle.
#[derive(Debug, Clone)]
pub struct IndexerDB {
    db: Db,
    index: Tree,
}

impl IndexerDB {
    /// Open or create a database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> StorageResult<Self> {
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    /// A throwaway database, removed when dropped. For tests.
    pub fn open_temporary() -> StorageResult<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> StorageResult<Self> {
        let index = db.open_tree("index")?;
        Ok(Self { db, index })
    }

    /// Apply a write set atomically and flush it to disk.
    pub fn apply(&self, writes: WriteSet) -> StorageResult<()> {
        if writes.is_empty() {
            return Ok(());
        }
        self.index.apply_batch(writes.batch)?;
        self.db.flush()?;
        Ok(())
    }

    fn get<T: DeserializeOwned>(&self, key: &[u8]) -> StorageResult<Option<T>> {
        self.index
            .get(key)?
            .map(|bytes| decode(&bytes))
            .transpose()
    }

    fn values<T, I>(iter: I) -> StorageResult<Vec<T>>
    where
        T: DeserializeOwned,
        I: Iterator<Item = sled::Result<(IVec, IVec)>>,
    {
        iter.map(|entry| {
            let (_, value) = entry?;
            decode(&value)
        })
        .collect()
    }

    // -- Blocks -------------------------------------------------------------

    /// The main block at `height`, or the boundary block if that is all
    /// there is.
    pub fn block_at(&self, height: u64) -> StorageResult<Option<BlockRecord>> {
        match self.get(&keys::block(height, false))? {
            Some(block) => Ok(Some(block)),
            None => self.get(&keys::block(height, true)),
        }
    }

    pub fn block_by_hash(&self, hash: &Hash) -> StorageResult<Option<BlockRecord>> {
        match self.index.get(keys::block_hash(hash))? {
            Some(block_key) => self.get(&block_key),
            None => Ok(None),
        }
    }

    pub fn contains_block(&self, hash: &Hash) -> StorageResult<bool> {
        Ok(self.index.contains_key(keys::block_hash(hash))?)
    }

    /// Blocks strictly above `height`, in chain order.
    pub fn blocks_above(&self, height: u64) -> StorageResult<Vec<BlockRecord>> {
        let end = [keys::BLOCK + 1];
        Self::values(self.index.range(keys::blocks_above(height)..end.to_vec()))
    }

    /// The highest stored block. An empty store reports the default.
    pub fn best_block(&self) -> StorageResult<BestBlock> {
        match self.index.scan_prefix([keys::BLOCK]).next_back() {
            Some(entry) => {
                let (_, value) = entry?;
                let block: BlockRecord = decode(&value)?;
                Ok(block.best_block())
            }
            None => Ok(BestBlock::default()),
        }
    }

    pub fn block_count(&self) -> usize {
        self.index.scan_prefix([keys::BLOCK]).count()
    }

    // -- Transactions -------------------------------------------------------

    pub fn transaction(&self, hash: &Hash) -> StorageResult<Option<StoredTransaction>> {
        self.get(&keys::transaction(hash))
    }

    // -- UTXOs --------------------------------------------------------------

    pub fn utxo(&self, key: &UtxoKey) -> StorageResult<Option<UtxoRecord>> {
        self.get(&keys::utxo(key))
    }

    /// Multi-get over the unspent set, positionally aligned with `keys`.
    pub fn utxos(&self, keys: &[UtxoKey]) -> StorageResult<Vec<Option<UtxoRecord>>> {
        keys.iter().map(|key| self.utxo(key)).collect()
    }

    pub fn spent_utxo(&self, key: &UtxoKey) -> StorageResult<Option<SpentUtxo>> {
        self.get(&keys::spent(key))
    }

    pub fn unspent_outputs(&self) -> StorageResult<Vec<UtxoRecord>> {
        Self::values(self.index.scan_prefix([keys::UTXO]))
    }

    pub fn spent_outputs(&self) -> StorageResult<Vec<SpentUtxo>> {
        Self::values(self.index.scan_prefix([keys::SPENT]))
    }

    // -- Accounts -----------------------------------------------------------

    pub fn account(&self, account: &str) -> StorageResult<Option<AccountState>> {
        self.get(&keys::account(account))
    }

    pub fn accounts(&self) -> StorageResult<Vec<(String, AccountState)>> {
        self.index
            .scan_prefix([keys::ACCOUNT])
            .map(|entry| {
                let (key, value) = entry?;
                let id = String::from_utf8(key[1..].to_vec())
                    .map_err(|_| StorageError::Corrupt("account key is not utf-8".into()))?;
                Ok((id, decode(&value)?))
            })
            .collect()
    }

    /// Ledger rows of one account, oldest first.
    pub fn account_history(&self, account: &str) -> StorageResult<Vec<AccountLedgerRow>> {
        Self::values(
            self.index
                .range(keys::account_rows(account)..keys::account_rows_end(account)),
        )
    }

    // -- UTXO addresses -----------------------------------------------------

    pub fn address_balance(&self, address: &str) -> StorageResult<Option<AddressBalance>> {
        self.get(&keys::address(address))
    }

    /// Balance rows of one address, oldest first.
    pub fn address_history(&self, address: &str) -> StorageResult<Vec<AddressLedgerRow>> {
        Self::values(self.index.range(
            keys::rows(keys::ADDRESS_ROW, address)..keys::rows_end(keys::ADDRESS_ROW, address),
        ))
    }

    // -- Supply -------------------------------------------------------------

    /// Supply recorded when the genesis distribution was stored.
    pub fn genesis_supply(&self) -> StorageResult<i64> {
        match self.index.get(keys::META_GENESIS_SUPPLY)? {
            Some(bytes) => {
                let raw: [u8; 8] = bytes
                    .as_ref()
                    .try_into()
                    .map_err(|_| StorageError::Corrupt("invalid genesis supply".into()))?;
                Ok(i64::from_be_bytes(raw))
            }
            None => Ok(0),
        }
    }

    /// Supply after the best block, or the genesis supply on an empty chain.
    pub fn supply(&self) -> StorageResult<i64> {
        match self.index.scan_prefix([keys::BLOCK]).next_back() {
            Some(entry) => {
                let (_, value) = entry?;
                let block: BlockRecord = decode(&value)?;
                Ok(block.supply_after)
            }
            None => self.genesis_supply(),
        }
    }

    // -- Pending transactions -----------------------------------------------

    pub fn pending_transaction(&self, hash: &Hash) -> StorageResult<Option<PendingTransaction>> {
        self.get(&keys::pending(hash))
    }

    pub fn pending_transactions(&self) -> StorageResult<Vec<PendingTransaction>> {
        Self::values(self.index.scan_prefix([keys::PENDING]))
    }

    // -- Certificates -------------------------------------------------------

    pub fn delegation(&self, tx_hash: &Hash, cert_ordinal: u32) -> StorageResult<Option<DelegationRecord>> {
        self.get(&keys::delegation(tx_hash, cert_ordinal))
    }

    pub fn delegations(&self) -> StorageResult<Vec<DelegationRecord>> {
        Self::values(self.index.scan_prefix([keys::DELEGATION]))
    }

    pub fn certificate(&self, tx_hash: &Hash, cert_ordinal: u32) -> StorageResult<Option<CertificateRecord>> {
        self.get(&keys::certificate(tx_hash, cert_ordinal))
    }

    // -- Chunks & metadata --------------------------------------------------

    pub fn last_chunk(&self) -> StorageResult<u64> {
        match self.index.get(keys::META_LAST_CHUNK)? {
            Some(bytes) => {
                let raw: [u8; 8] = bytes
                    .as_ref()
                    .try_into()
                    .map_err(|_| StorageError::Corrupt("invalid chunk counter".into()))?;
                Ok(u64::from_be_bytes(raw))
            }
            None => Ok(0),
        }
    }

    /// The newest stable checkpoint, if any.
    pub fn latest_checkpoint(&self) -> StorageResult<Option<ChunkCheckpoint>> {
        match self.index.scan_prefix([keys::CHUNK]).next_back() {
            Some(entry) => {
                let (_, value) = entry?;
                Ok(Some(decode(&value)?))
            }
            None => Ok(None),
        }
    }

    pub fn checkpoints(&self) -> StorageResult<Vec<ChunkCheckpoint>> {
        Self::values(self.index.scan_prefix([keys::CHUNK]))
    }

    pub fn genesis_loaded(&self) -> StorageResult<bool> {
        Ok(self.index.contains_key(keys::META_GENESIS)?)
    }

    // -- Rollback -----------------------------------------------------------

    /// Undo every record whose height is above `floor`, atomically.
    ///
    /// Outputs spent above the floor go back into the unspent set unless
    /// they were themselves produced above it. Accounts touched above the
    /// floor are reset to their last remaining ledger row.
    pub fn remove_records_after_height(&self, floor: u64) -> StorageResult<RollbackSummary> {
        let mut writes = WriteSet::new();
        let mut summary = RollbackSummary {
            floor,
            ..RollbackSummary::default()
        };
        let mut touched_accounts = BTreeSet::new();
        let mut touched_addresses = BTreeSet::new();

        for block in self.blocks_above(floor)? {
            for tx_hash in &block.tx_hashes {
                let stored = self
                    .transaction(tx_hash)?
                    .ok_or_else(|| StorageError::Corrupt(format!("missing transaction {}", hex::encode(tx_hash))))?;
                summary.utxos_restored += self.undo_transaction(&stored, floor, &mut writes)?;
                touched_addresses.extend(utxo_addresses(&stored));
                if stored.tx.status == TxStatus::Success {
                    touched_accounts.extend(stored.tx.account_inputs().map(|(a, _)| a.to_string()));
                    touched_accounts.extend(stored.tx.account_outputs().map(|(a, _)| a.to_string()));
                }
                writes.remove_certificates(tx_hash);
                writes.remove_transaction(tx_hash);
                summary.transactions_removed += 1;
            }
            writes.remove_block(&block);
            summary.blocks_removed += 1;
        }

        for account in &touched_accounts {
            self.reset_account(account, floor, &mut writes)?;
            summary.accounts_recomputed += 1;
        }

        for address in &touched_addresses {
            self.reset_address(address, floor, &mut writes)?;
            summary.addresses_recomputed += 1;
        }

        for checkpoint in self.checkpoints()? {
            if checkpoint.height > floor {
                writes.remove_checkpoint(checkpoint.chunk);
                summary.checkpoints_removed += 1;
            }
        }

        self.apply(writes)?;
        Ok(summary)
    }

    /// Queue the inverse of one transaction's UTXO effects. Returns how many
    /// outputs go back into the unspent set.
    fn undo_transaction(
        &self,
        stored: &StoredTransaction,
        floor: u64,
        writes: &mut WriteSet,
    ) -> StorageResult<usize> {
        let mut restored = 0;
        for input in &stored.tx.inputs {
            let Input::Utxo { tx_id, index } = input else {
                continue;
            };
            let key = UtxoKey::new(*tx_id, *index);
            if let Some(spent) = self.spent_utxo(&key)? {
                writes.remove_spent(&key);
                if spent.utxo.block_num <= floor {
                    writes.put_utxo(&spent.utxo)?;
                    restored += 1;
                }
            }
        }
        for (index, output) in stored.tx.outputs.iter().enumerate() {
            if let Output::Utxo { .. } = output {
                let key = UtxoKey::new(stored.tx.id, index as u32);
                writes.remove_utxo(&key);
                writes.remove_spent(&key);
            }
        }
        Ok(restored)
    }

    /// Queue removal of an owner's rows above `floor` and return the last
    /// row that remains, if any.
    fn truncate_rows<T: DeserializeOwned>(
        &self,
        prefix: u8,
        owner: &str,
        floor: u64,
        writes: &mut WriteSet,
    ) -> StorageResult<Option<T>> {
        let first_removed = keys::row(prefix, owner, floor.saturating_add(1), 0);

        for entry in self
            .index
            .range(first_removed.clone()..keys::rows_end(prefix, owner))
        {
            let (key, _) = entry?;
            writes.remove_raw(key);
        }

        self.index
            .range(keys::rows(prefix, owner)..first_removed)
            .next_back()
            .transpose()?
            .map(|(_, value)| decode(&value))
            .transpose()
    }

    /// Drop an account's rows above `floor` and restore its state from the
    /// last row that remains.
    fn reset_account(&self, account: &str, floor: u64, writes: &mut WriteSet) -> StorageResult<()> {
        let last_kept: Option<AccountLedgerRow> =
            self.truncate_rows(keys::ACCOUNT_ROW, account, floor, writes)?;
        match last_kept {
            Some(row) => {
                writes.put_account(
                    account,
                    &AccountState {
                        balance: row.balance,
                        spending_counter: row.spending_counter,
                        last_height: row.block_num,
                    },
                )?;
            }
            None => writes.remove_account(account),
        }
        Ok(())
    }

    /// Same as [`Self::reset_account`] for a UTXO-model address.
    fn reset_address(&self, address: &str, floor: u64, writes: &mut WriteSet) -> StorageResult<()> {
        let last_kept: Option<AddressLedgerRow> =
            self.truncate_rows(keys::ADDRESS_ROW, address, floor, writes)?;
        match last_kept {
            Some(row) => writes.put_address(
                address,
                &AddressBalance {
                    balance: row.balance,
                    last_height: row.block_num,
                },
            )?,
            None => writes.remove_address(address),
        }
        Ok(())
    }
}

/// UTXO-model addresses a stored transaction moved value to or from.
fn utxo_addresses(stored: &StoredTransaction) -> impl Iterator<Item = String> + '_ {
    let spent = stored
        .tx
        .inputs
        .iter()
        .zip(&stored.resolved_inputs)
        .filter(|(input, _)| matches!(input, Input::Utxo { .. }))
        .map(|(_, resolved)| resolved.address.clone());
    let produced = stored.tx.outputs.iter().filter_map(|output| match output {
        Output::Utxo { address, .. } => Some(address.clone()),
        Output::Account { .. } => None,
    });
    spent.chain(produced)
}

impl LedgerReader for IndexerDB {
    fn utxo(&self, key: &UtxoKey) -> Result<Option<UtxoRecord>, LedgerError> {
        IndexerDB::utxo(self, key).map_err(|e| LedgerError::Read(e.to_string()))
    }

    fn account(&self, account: &str) -> Result<Option<AccountState>, LedgerError> {
        IndexerDB::account(self, account).map_err(|e| LedgerError::Read(e.to_string()))
    }

    fn address_balance(&self, address: &str) -> Result<Option<AddressBalance>, LedgerError> {
        IndexerDB::address_balance(self, address).map_err(|e| LedgerError::Read(e.to_string()))
    }

    fn supply(&self) -> Result<i64, LedgerError> {
        IndexerDB::supply(self).map_err(|e| LedgerError::Read(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
