//! Block structure and the best-block pointer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::transaction::Transaction;
use crate::crypto::Hash;

/// Raw protocol-update payload carried by a regular block: the pending
/// proposal and the votes, each as canonical CBOR.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdatePayload {
    pub proposal: Vec<u8>,
    pub votes: Vec<u8>,
}

/// A decoded block.
///
/// `height` is the chain difficulty: an epoch-boundary block repeats the
/// height of the main block before it. `prev_hash` must equal the hash of
/// the block applied just before this one; if it does not, the node has
/// switched branches under us.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub hash: Hash,
    pub prev_hash: Hash,
    pub epoch: u64,
    /// Slot within the epoch. `None` for epoch-boundary blocks.
    pub slot: Option<u64>,
    pub height: u64,
    pub is_epoch_boundary: bool,
    pub time: DateTime<Utc>,
    pub transactions: Vec<Transaction>,
    /// Present only when the block actually proposes or votes on an update.
    pub update: Option<UpdatePayload>,
}

impl Block {
    pub fn hash_hex(&self) -> String {
        hex::encode(self.hash)
    }

    pub fn prev_hash_hex(&self) -> String {
        hex::encode(self.prev_hash)
    }

    /// Header-only view of this block, as stored in the `blocks` tree.
    pub fn best_block(&self) -> BestBlock {
        BestBlock {
            height: self.height,
            epoch: self.epoch,
            slot: self.slot,
            hash: Some(self.hash),
        }
    }
}

/// The best locally committed block.
///
/// An empty store reports height 0, epoch 0, no slot and no hash.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BestBlock {
    pub height: u64,
    pub epoch: u64,
    pub slot: Option<u64>,
    pub hash: Option<Hash>,
}
