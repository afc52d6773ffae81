//! The node data-provider contract and the wire types it returns.
//!
//! Everything here is I/O shaped: the scheduler only ever sees raw bytes
//! (blocks, epoch bundles) or small JSON documents (status, genesis).
//! Decoding those bytes is the decoder's job, not the provider's.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::crypto::{blake2b_256, Hash};
use crate::decoder::{fix_long_address, DecodeError};
use crate::model::UtxoRecord;

// ---------------------------------------------------------------------------
// TransportError
// ---------------------------------------------------------------------------

/// Failures talking to the node. All of them are retryable: the next poll
/// cycle simply asks again.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request to {url} failed: {reason}")]
    Request { url: String, reason: String },

    #[error("{url} answered with status {status}")]
    Status { url: String, status: u16 },

    /// The node does not know the requested block, epoch or genesis.
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid response from {url}: {reason}")]
    InvalidResponse { url: String, reason: String },
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// One tip as reported by the node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tip {
    pub height: u64,
    /// `[epoch, slot within epoch]`.
    pub slot: (u64, u64),
    pub hash: String,
}

impl Tip {
    pub fn epoch(&self) -> u64 {
        self.slot.0
    }

    pub fn slot_in_epoch(&self) -> u64 {
        self.slot.1
    }
}

/// The node's own tip and the network tip it is following.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeTips {
    /// Absent while the node has not synced anything yet.
    #[serde(default)]
    pub local: Option<Tip>,
    pub remote: Tip,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeStatus {
    pub tip: NodeTips,
    /// Number of epochs available as packed bundles. Epoch `e` can be
    /// fetched in bulk iff `packed_epochs > e`.
    #[serde(default)]
    pub packed_epochs: u64,
}

// ---------------------------------------------------------------------------
// Genesis
// ---------------------------------------------------------------------------

/// The part of the genesis document the indexer consumes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenesisData {
    /// Base58 address to amount (decimal string, as the genesis file has it).
    #[serde(default)]
    pub non_avvm_balances: BTreeMap<String, String>,
}

impl GenesisData {
    /// Turn the initial distribution into spendable outputs.
    ///
    /// Each address gets one output at index 0 whose transaction hash is
    /// the Blake2b-256 of the raw address bytes.
    pub fn into_utxos(self) -> Result<Vec<UtxoRecord>, DecodeError> {
        let mut utxos = Vec::with_capacity(self.non_avvm_balances.len());
        for (address, amount) in self.non_avvm_balances {
            let raw = bs58::decode(&address)
                .into_vec()
                .map_err(|e| DecodeError::malformed("genesis address", e.to_string()))?;
            let amount = amount
                .parse::<u64>()
                .map_err(|e| DecodeError::malformed("genesis amount", e.to_string()))?;
            utxos.push(UtxoRecord {
                tx_hash: blake2b_256(&raw),
                index: 0,
                address: fix_long_address(&address),
                amount,
                block_num: 0,
            });
        }
        Ok(utxos)
    }
}

// ---------------------------------------------------------------------------
// Message pool
// ---------------------------------------------------------------------------

/// Where a submitted fragment stands in the node's message pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FragmentStatus {
    Pending,
    Rejected {
        #[serde(default)]
        reason: String,
    },
    /// Included in a block. The payload is not used.
    InABlock(serde_json::Value),
}

/// One message pool log entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FragmentLog {
    /// Hex fragment id.
    pub fragment_id: String,
    pub status: FragmentStatus,
}

impl FragmentLog {
    /// The rejection reason, if the node rejected the fragment.
    pub fn rejection(&self) -> Option<&str> {
        match &self.status {
            FragmentStatus::Rejected { reason } => Some(reason),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// NodeDataProvider
// ---------------------------------------------------------------------------

/// Read (and one write) access to the chain node.
#[async_trait]
pub trait NodeDataProvider: Send + Sync {
    async fn get_status(&self) -> Result<NodeStatus, TransportError>;

    /// Raw bytes of the main-chain block at `height`. Epoch boundary
    /// blocks share their height with a regular block and are never
    /// returned here.
    async fn get_block_by_height(&self, height: u64) -> Result<Vec<u8>, TransportError>;

    /// Raw bytes of the block with the given header hash.
    async fn get_block(&self, hash: &Hash) -> Result<Vec<u8>, TransportError>;

    /// Packed bundle of every block in epoch `epoch`.
    async fn get_epoch(&self, epoch: u64) -> Result<Vec<u8>, TransportError>;

    async fn get_genesis(&self, hash: &str) -> Result<GenesisData, TransportError>;

    /// Forward a signed transaction to the node.
    async fn post_signed_tx(&self, payload: &[u8]) -> Result<(), TransportError>;

    /// The node's message pool logs.
    async fn get_message_pool_logs(&self) -> Result<Vec<FragmentLog>, TransportError>;
}
