//! Shared fixtures for the integration tests: wire-format builders, a
//! scripted bridge and a temporary index.

#![allow(dead_code)]

use std::collections::HashMap;

use async_trait::async_trait;
use ciborium::value::Value;
use parking_lot::Mutex;

use ledger_indexer::crypto::Hash;
use ledger_indexer::decoder::cbor::{encode, TAG_ENCODED_CBOR};
use ledger_indexer::storage::{IndexerDB, SledStorageProcessor};
use ledger_indexer::sync::{
    FragmentLog, GenesisData, NodeDataProvider, NodeStatus, NodeTips, Tip, TransportError,
};

// ---------------------------------------------------------------------------
// Legacy CBOR builders
// ---------------------------------------------------------------------------

fn int(n: u64) -> Value {
    Value::Integer(n.into())
}

fn cbor(value: &Value) -> Vec<u8> {
    encode(value).expect("encodable fixture")
}

pub fn boundary_block(prev: Hash, epoch: u64, height: u64) -> Vec<u8> {
    let header = Value::Array(vec![
        int(764_824_073),
        Value::Bytes(prev.to_vec()),
        Value::Bytes(vec![0; 32]),
        Value::Array(vec![int(epoch), Value::Array(vec![int(height)])]),
        Value::Map(vec![]),
    ]);
    cbor(&Value::Array(vec![int(0), Value::Array(vec![header, Value::Array(vec![])])]))
}

pub fn regular_block(prev: Hash, epoch: u64, slot: u64, height: u64, txs: Vec<Value>) -> Vec<u8> {
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
        Value::Array(vec![Value::Array(vec![]), Value::Array(vec![])]),
    ]);
    cbor(&Value::Array(vec![int(1), Value::Array(vec![header, body])]))
}

pub fn legacy_input(tx_id: Hash, index: u32) -> Value {
    let pointer = Value::Array(vec![Value::Bytes(tx_id.to_vec()), int(u64::from(index))]);
    Value::Array(vec![
        int(0),
        Value::Tag(TAG_ENCODED_CBOR, Box::new(Value::Bytes(cbor(&pointer)))),
    ])
}

pub fn legacy_output(address_seed: u8, value: u64) -> Value {
    let address = Value::Array(vec![
        Value::Tag(TAG_ENCODED_CBOR, Box::new(Value::Bytes(vec![address_seed; 8]))),
        int(u64::from(address_seed)),
    ]);
    Value::Array(vec![address, int(value)])
}

pub fn legacy_tx(inputs: Vec<Value>, outputs: Vec<Value>) -> Value {
    Value::Array(vec![
        Value::Array(vec![Value::Array(inputs), Value::Array(outputs), Value::Map(vec![])]),
        Value::Array(vec![]),
    ])
}

// ---------------------------------------------------------------------------
// Extended fragment builders
// ---------------------------------------------------------------------------

pub const TAG_TRANSACTION: u8 = 2;
pub const TAG_OWNER_STAKE_DELEGATION: u8 = 3;
pub const TAG_POOL_REGISTRATION: u8 = 5;

pub fn fragment(tag: u8, certificate: &[u8], inputs: &[Vec<u8>], outputs: &[Vec<u8>]) -> Vec<u8> {
    let mut content = certificate.to_vec();
    content.push(inputs.len() as u8);
    content.push(outputs.len() as u8);
    for part in inputs.iter().chain(outputs) {
        content.extend_from_slice(part);
    }
    let mut out = ((content.len() + 1) as u16).to_be_bytes().to_vec();
    out.push(tag);
    out.extend_from_slice(&content);
    out
}

pub fn utxo_input(tx_id: Hash, index: u8, value: u64) -> Vec<u8> {
    let mut out = vec![index];
    out.extend_from_slice(&value.to_be_bytes());
    out.extend_from_slice(&tx_id);
    out
}

pub fn account_input(key: [u8; 32], value: u64) -> Vec<u8> {
    let mut out = vec![0xff];
    out.extend_from_slice(&value.to_be_bytes());
    out.extend_from_slice(&key);
    out
}

/// `header` 0x03 is a single address, 0x05 an account.
pub fn extended_output(header: u8, key: [u8; 32], value: u64) -> Vec<u8> {
    let mut out = vec![header];
    out.extend_from_slice(&key);
    out.extend_from_slice(&value.to_be_bytes());
    out
}

/// Full delegation of the paying account to `pool`.
pub fn owner_delegation(pool: [u8; 32]) -> Vec<u8> {
    let mut out = vec![1];
    out.extend_from_slice(&pool);
    out
}

pub fn pool_registration(owner: [u8; 32]) -> Vec<u8> {
    let mut out = vec![0u8; 16];
    out.extend_from_slice(&1_000u64.to_be_bytes());
    out.extend_from_slice(&0u64.to_be_bytes());
    out.extend_from_slice(&[0xaa; 32]);
    out.extend_from_slice(&[0xbb; 32]);
    out.push(1);
    out.extend_from_slice(&owner);
    out.push(0);
    out
}

pub fn account_id(key: [u8; 32]) -> String {
    format!("05{}", hex::encode(key))
}

// ---------------------------------------------------------------------------
// Scripted bridge
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct ScriptedBridge {
    status: Mutex<Option<NodeStatus>>,
    by_height: Mutex<HashMap<u64, Vec<u8>>>,
    by_hash: Mutex<HashMap<Hash, Vec<u8>>>,
    epochs: Mutex<HashMap<u64, Vec<u8>>>,
    genesis: Mutex<GenesisData>,
}

impl ScriptedBridge {
    pub fn set_status(&self, node_height: u64, remote: (u64, u64), packed_epochs: u64) {
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

    pub fn add_genesis_balance(&self, raw_address: &[u8], amount: u64) {
        self.genesis
            .lock()
            .non_avvm_balances
            .insert(bs58::encode(raw_address).into_string(), amount.to_string());
    }

    pub fn serve_block(&self, height: Option<u64>, hash: Hash, bytes: &[u8]) {
        if let Some(height) = height {
            self.by_height.lock().insert(height, bytes.to_vec());
        }
        self.by_hash.lock().insert(hash, bytes.to_vec());
    }

    pub fn serve_epoch(&self, epoch: u64, bytes: Vec<u8>) {
        self.epochs.lock().insert(epoch, bytes);
    }
}

#[async_trait]
impl NodeDataProvider for ScriptedBridge {
    async fn get_status(&self) -> Result<NodeStatus, TransportError> {
        self.status
            .lock()
            .clone()
            .ok_or_else(|| TransportError::NotFound("/status".into()))
    }

    async fn get_block_by_height(&self, height: u64) -> Result<Vec<u8>, TransportError> {
        self.by_height
            .lock()
            .get(&height)
            .cloned()
            .ok_or_else(|| TransportError::NotFound(format!("/height/{height}")))
    }

    async fn get_block(&self, hash: &Hash) -> Result<Vec<u8>, TransportError> {
        self.by_hash
            .lock()
            .get(hash)
            .cloned()
            .ok_or_else(|| TransportError::NotFound(format!("/block/{}", hex::encode(hash))))
    }

    async fn get_epoch(&self, epoch: u64) -> Result<Vec<u8>, TransportError> {
        self.epochs
            .lock()
            .get(&epoch)
            .cloned()
            .ok_or_else(|| TransportError::NotFound(format!("/epoch/{epoch}")))
    }

    async fn get_genesis(&self, _hash: &str) -> Result<GenesisData, TransportError> {
        Ok(self.genesis.lock().clone())
    }

    async fn post_signed_tx(&self, _payload: &[u8]) -> Result<(), TransportError> {
        Ok(())
    }

    async fn get_message_pool_logs(&self) -> Result<Vec<FragmentLog>, TransportError> {
        Ok(Vec::new())
    }
}

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

pub fn temp_index() -> (IndexerDB, SledStorageProcessor) {
    let db = IndexerDB::open_temporary().expect("temporary index");
    let processor = SledStorageProcessor::new(db.clone());
    (db, processor)
}
