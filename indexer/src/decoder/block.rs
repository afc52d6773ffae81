//! Block envelopes.
//!
//! ```text
//! block    = [type, [header, body]]
//! header   = [magic, prev_hash, body_proof, consensus, extra]
//! type 0   : consensus = [epoch, [difficulty]]                   (boundary)
//! type 1   : consensus = [[epoch, slot], leader, [difficulty], signature]
//!            body      = [txs, ssc, dlg, [proposal, votes]]
//! ```
//!
//! The block hash is Blake2b-256 over `[type, header]`. Boundary blocks
//! carry no transactions and are stamped with the start of their epoch.

use chrono::{DateTime, Utc};
use ciborium::value::Value;

use super::cbor;
use super::fragment;
use super::legacy;
use super::DecodeError;
use crate::config::{NetworkConfig, ProtocolEra};
use crate::crypto::{blake2b_256, Hash};
use crate::model::{Block, Transaction, TxContext, UpdatePayload};

pub const BLOCK_TYPE_BOUNDARY: u64 = 0;
pub const BLOCK_TYPE_REGULAR: u64 = 1;

pub fn header_hash(block_type: u64, header: &Value) -> Result<Hash, DecodeError> {
    let preimage = Value::Array(vec![Value::Integer(block_type.into()), header.clone()]);
    Ok(blake2b_256(&cbor::encode(&preimage)?))
}

pub fn decode_block(network: &NetworkConfig, bytes: &[u8]) -> Result<Block, DecodeError> {
    let root = cbor::decode(bytes)?;
    let top = cbor::array_min(&root, 2, "block")?;
    let block_type = cbor::uint(&top[0], "block type")?;
    let payload = cbor::array_min(&top[1], 2, "block payload")?;
    let (header, body) = (&payload[0], &payload[1]);

    if block_type != BLOCK_TYPE_BOUNDARY && block_type != BLOCK_TYPE_REGULAR {
        return Err(DecodeError::UnknownBlockType(block_type));
    }

    let header_fields = cbor::array_min(header, 4, "header")?;
    let hash = header_hash(block_type, header)?;
    let prev_hash = cbor::hash(&header_fields[1], "prev hash")?;

    if block_type == BLOCK_TYPE_BOUNDARY {
        boundary_block(network, hash, prev_hash, &header_fields[3])
    } else {
        regular_block(network, hash, prev_hash, &header_fields[3], body)
    }
}

fn boundary_block(
    network: &NetworkConfig,
    hash: Hash,
    prev_hash: Hash,
    consensus: &Value,
) -> Result<Block, DecodeError> {
    let consensus = cbor::array_min(consensus, 2, "boundary consensus")?;
    let epoch = cbor::uint(&consensus[0], "epoch")?;
    let difficulty = cbor::array_min(&consensus[1], 1, "difficulty")?;
    let height = cbor::uint(&difficulty[0], "difficulty")?;
    let time = block_time(network, epoch, 0)?;

    Ok(Block {
        hash,
        prev_hash,
        epoch,
        slot: None,
        height,
        is_epoch_boundary: true,
        time,
        transactions: Vec::new(),
        update: None,
    })
}

fn regular_block(
    network: &NetworkConfig,
    hash: Hash,
    prev_hash: Hash,
    consensus: &Value,
    body: &Value,
) -> Result<Block, DecodeError> {
    let consensus = cbor::array_min(consensus, 3, "consensus")?;
    let slot_id = cbor::array_min(&consensus[0], 2, "slot id")?;
    let epoch = cbor::uint(&slot_id[0], "epoch")?;
    let slot = cbor::uint(&slot_id[1], "slot")?;
    let difficulty = cbor::array_min(&consensus[2], 1, "difficulty")?;
    let height = cbor::uint(&difficulty[0], "difficulty")?;
    let time = block_time(network, epoch, slot)?;

    let body = cbor::array_min(body, 4, "body")?;
    let raw_txs = cbor::array(&body[0], "transactions")?;
    let update = update_payload(&body[3])?;

    let mut transactions = Vec::with_capacity(raw_txs.len());
    for (ordinal, raw) in raw_txs.iter().enumerate() {
        let context = TxContext {
            block_hash: Some(hash),
            block_num: Some(height),
            epoch: Some(epoch),
            slot: Some(slot),
            tx_ordinal: Some(ordinal as u32),
            time: Some(time),
        };
        transactions.push(decode_body_tx(network, raw, context)?);
    }

    Ok(Block {
        hash,
        prev_hash,
        epoch,
        slot: Some(slot),
        height,
        is_epoch_boundary: false,
        time,
        transactions,
        update,
    })
}

fn block_time(network: &NetworkConfig, epoch: u64, slot: u64) -> Result<DateTime<Utc>, DecodeError> {
    network
        .slot_time(epoch, slot)
        .ok_or(DecodeError::SlotOutOfRange { epoch, slot })
}

fn decode_body_tx(
    network: &NetworkConfig,
    raw: &Value,
    context: TxContext,
) -> Result<Transaction, DecodeError> {
    match network.era {
        ProtocolEra::Legacy => legacy::decode_transaction(raw, context),
        ProtocolEra::Extended => {
            let bytes = cbor::bytes(raw, "fragment")?;
            fragment::decode_fragment(bytes, network.discrimination, context)
        }
    }
}

fn update_payload(value: &Value) -> Result<Option<UpdatePayload>, DecodeError> {
    let parts = cbor::array_min(value, 2, "update payload")?;
    let (proposal, votes) = (&parts[0], &parts[1]);
    if cbor::is_empty(proposal) && cbor::is_empty(votes) {
        return Ok(None);
    }
    Ok(Some(UpdatePayload {
        proposal: cbor::encode(proposal)?,
        votes: cbor::encode(votes)?,
    }))
}

#[cfg(test)]
pub(crate) mod build {
    use ciborium::value::Value;

    use super::super::cbor::encode;

    fn int(n: u64) -> Value {
        Value::Integer(n.into())
    }

    pub fn boundary(prev: [u8; 32], epoch: u64, height: u64) -> Vec<u8> {
        let header = Value::Array(vec![
            int(764_824_073),
            Value::Bytes(prev.to_vec()),
            Value::Bytes(vec![0; 32]),
            Value::Array(vec![int(epoch), Value::Array(vec![int(height)])]),
            Value::Map(vec![]),
        ]);
        let body = Value::Array(vec![]);
        let block = Value::Array(vec![int(0), Value::Array(vec![header, body])]);
        encode(&block).unwrap_or_default()
    }

    pub fn regular(
        prev: [u8; 32],
        epoch: u64,
        slot: u64,
        height: u64,
        txs: Vec<Value>,
        update: (Value, Value),
    ) -> Vec<u8> {
        let header = Value::Array(vec![
            int(764_824_073),
            Value::Bytes(prev.to_vec()),
            Value::Bytes(vec![0; 32]),
            Value::Array(vec![
                Value::Array(vec![int(epoch), int(slot)]),
                Value::Bytes(vec![1; 32]),
                Value::Array(vec![int(height)]),
                Value::Bytes(vec![2; 64]),
            ]),
            Value::Map(vec![]),
        ]);
        let body = Value::Array(vec![
            Value::Array(txs),
            Value::Array(vec![]),
            Value::Array(vec![]),
            Value::Array(vec![update.0, update.1]),
        ]);
        let block = Value::Array(vec![int(1), Value::Array(vec![header, body])]);
        encode(&block).unwrap_or_default()
    }

    pub fn no_update() -> (Value, Value) {
        (Value::Array(vec![]), Value::Array(vec![]))
    }
}
