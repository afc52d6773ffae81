//! Records derived from blocks by the ledger tracker.
//!
//! These are what the storage processor persists and what the query API
//! serves. All of them are plain data; the invariants tying them together
//! are enforced in `ledger` and `storage`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::certificate::Certificate;
use super::transaction::Transaction;
use crate::crypto::Hash;

// ---------------------------------------------------------------------------
// UTXO
// ---------------------------------------------------------------------------

/// Identifies one transaction output.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UtxoKey {
    pub tx_hash: Hash,
    pub index: u32,
}

impl UtxoKey {
    pub fn new(tx_hash: Hash, index: u32) -> Self {
        Self { tx_hash, index }
    }

    /// Storage key: 32-byte hash followed by the big-endian index.
    pub fn to_bytes(&self) -> [u8; 36] {
        let mut key = [0u8; 36];
        key[..32].copy_from_slice(&self.tx_hash);
        key[32..].copy_from_slice(&self.index.to_be_bytes());
        key
    }
}

/// An unspent transaction output.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UtxoRecord {
    pub tx_hash: Hash,
    pub index: u32,
    pub address: String,
    pub amount: u64,
    /// Height of the block that produced it. Genesis outputs use 0.
    pub block_num: u64,
}

impl UtxoRecord {
    pub fn key(&self) -> UtxoKey {
        UtxoKey::new(self.tx_hash, self.index)
    }
}

/// A consumed output, kept so a rollback can restore it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpentUtxo {
    pub utxo: UtxoRecord,
    pub spent_by: Hash,
    pub spent_at: u64,
}

/// An input resolved against the UTXO set at the time it was applied.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedInput {
    pub address: String,
    pub amount: u64,
}

/// Value moved by one transaction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxValue {
    pub sum_inputs: u64,
    pub sum_outputs: u64,
    /// `sum_inputs - sum_outputs`, or zero when outputs exceed inputs.
    pub fee: u64,
    /// Circulating supply once this transaction is applied.
    pub supply_after: i64,
}

/// A transaction together with its resolved inputs, as stored.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredTransaction {
    pub tx: Transaction,
    /// One entry per input, in input order. Account inputs resolve to the
    /// account and the debited value.
    pub resolved_inputs: Vec<ResolvedInput>,
    pub value: TxValue,
    /// Synthesized from the genesis distribution rather than read from a
    /// block.
    pub is_genesis: bool,
}

/// A signed transaction submitted through the indexer and not yet seen
/// in a block.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingTransaction {
    pub tx: Transaction,
    pub submitted_at: DateTime<Utc>,
    /// Set once the node's message pool reports a rejection.
    pub reason: Option<String>,
}

/// Per-block value totals.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockTotals {
    /// Sum of every transaction's outputs.
    pub sent: u64,
    pub fees: u64,
    pub supply_after: i64,
}

// ---------------------------------------------------------------------------
// UTXO address balances
// ---------------------------------------------------------------------------

/// Current balance of a UTXO-model address.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressBalance {
    pub balance: i64,
    pub last_height: u64,
}

/// Net change of one UTXO-model address within one transaction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressLedgerRow {
    pub address: String,
    pub block_num: u64,
    pub tx_ordinal: u32,
    pub row_ordinal: u32,
    pub operation_id: Hash,
    pub delta: i64,
    /// Balance after this transaction.
    pub balance: i64,
}

// ---------------------------------------------------------------------------
// Accounts
// ---------------------------------------------------------------------------

/// Current state of an account.
///
/// `balance` is signed: the ledger never refuses a debit, it only records
/// it, and a genuinely negative balance is the node's problem, not ours.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountState {
    pub balance: i64,
    pub spending_counter: u64,
    pub last_height: u64,
}

/// Net adjustment of one account by one transaction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountLedgerRow {
    pub account: String,
    pub block_num: u64,
    pub epoch: u64,
    pub slot: Option<u64>,
    pub tx_ordinal: u32,
    /// Position of this row within its block, for stable ordering.
    pub row_ordinal: u32,
    pub operation_id: Hash,
    /// Signed change applied by this row.
    pub delta: i64,
    /// Balance after applying this row.
    pub balance: i64,
    /// Spending counter after applying this row.
    pub spending_counter: u64,
}

// ---------------------------------------------------------------------------
// Certificates
// ---------------------------------------------------------------------------

/// A stake delegation, as recorded in the delegation history.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelegationRecord {
    pub tx_hash: Hash,
    pub cert_ordinal: u32,
    pub block_num: u64,
    pub epoch: u64,
    pub slot: Option<u64>,
    pub tx_ordinal: u32,
    pub account: String,
    pub pool_id: Option<String>,
    pub payload_hex: String,
}

/// Any certificate, kept verbatim with its position in the chain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateRecord {
    pub tx_hash: Hash,
    pub cert_ordinal: u32,
    pub block_num: u64,
    pub certificate: Certificate,
}

// ---------------------------------------------------------------------------
// Chunks
// ---------------------------------------------------------------------------

/// A stable chunk checkpoint.
///
/// Only every `CHUNK_STABLE_INTERVAL`th chunk (and the genesis chunk) gets
/// one. Counts cover the chunk itself.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkCheckpoint {
    pub chunk: u64,
    pub block_count: u64,
    pub tx_count: u64,
    pub txio_count: u64,
    /// Highest block height included in the chunk.
    pub height: u64,
}
