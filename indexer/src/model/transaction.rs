//! Transactions, inputs and outputs.
//!
//! Both wire encodings (legacy CBOR and extended fragments) decode into the
//! same `Transaction`. Inputs and outputs are tagged variants; the storage
//! layer and the ledger tracker match on them exhaustively.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::certificate::Certificate;
use crate::crypto::Hash;

/// Lifecycle status of a transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxStatus {
    Pending,
    Success,
    Failed,
}

/// A transaction input.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Input {
    /// Spends output `index` of transaction `tx_id`.
    Utxo { tx_id: Hash, index: u32 },
    /// Debits `value` from an account.
    Account { account_id: String, value: u64 },
}

/// Address discriminant, as read from the address header.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AddressKind {
    /// Legacy base58 CBOR address.
    Bootstrap,
    Single,
    Group,
    Account,
    Multisig,
}

impl AddressKind {
    /// Which balance model an output to this kind of address feeds.
    pub fn output_kind(self) -> OutputKind {
        match self {
            AddressKind::Bootstrap | AddressKind::Single | AddressKind::Group => OutputKind::Utxo,
            AddressKind::Account | AddressKind::Multisig => OutputKind::Account,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputKind {
    Utxo,
    Account,
}

/// A transaction output.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Output {
    /// Creates a spendable UTXO.
    Utxo { address: String, value: u64 },
    /// Credits an account balance.
    Account { address: String, value: u64 },
}

impl Output {
    /// Build an output whose variant follows the address discriminant.
    pub fn new(kind: AddressKind, address: String, value: u64) -> Self {
        match kind.output_kind() {
            OutputKind::Utxo => Output::Utxo { address, value },
            OutputKind::Account => Output::Account { address, value },
        }
    }

    pub fn address(&self) -> &str {
        match self {
            Output::Utxo { address, .. } | Output::Account { address, .. } => address,
        }
    }

    pub fn value(&self) -> u64 {
        match self {
            Output::Utxo { value, .. } | Output::Account { value, .. } => *value,
        }
    }

    pub fn kind(&self) -> OutputKind {
        match self {
            Output::Utxo { .. } => OutputKind::Utxo,
            Output::Account { .. } => OutputKind::Account,
        }
    }
}

/// Where a transaction sits in the chain. Filled in by the block decoder;
/// a transaction decoded on its own (e.g. from a mempool) has none of it.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxContext {
    pub block_hash: Option<Hash>,
    pub block_num: Option<u64>,
    pub epoch: Option<u64>,
    pub slot: Option<u64>,
    pub tx_ordinal: Option<u32>,
    pub time: Option<DateTime<Utc>>,
}

/// A decoded transaction.
///
/// `id` is derived from the encoded bytes, so two decodes of the same bytes
/// always agree on it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Hash,
    pub inputs: Vec<Input>,
    pub outputs: Vec<Output>,
    pub certificate: Option<Certificate>,
    /// Canonical body bytes the id was computed over.
    pub body: Vec<u8>,
    pub context: TxContext,
    pub status: TxStatus,
}

impl Transaction {
    pub fn id_hex(&self) -> String {
        hex::encode(self.id)
    }

    /// Account-typed inputs as `(account, value)` pairs, in input order.
    pub fn account_inputs(&self) -> impl Iterator<Item = (&str, u64)> {
        self.inputs.iter().filter_map(|input| match input {
            Input::Account { account_id, value } => Some((account_id.as_str(), *value)),
            Input::Utxo { .. } => None,
        })
    }

    /// Account-typed outputs as `(account, value)` pairs, in output order.
    pub fn account_outputs(&self) -> impl Iterator<Item = (&str, u64)> {
        self.outputs.iter().filter_map(|output| match output {
            Output::Account { address, value } => Some((address.as_str(), *value)),
            Output::Utxo { .. } => None,
        })
    }

    pub fn block_num(&self) -> u64 {
        self.context.block_num.unwrap_or(0)
    }

    pub fn tx_ordinal(&self) -> u32 {
        self.context.tx_ordinal.unwrap_or(0)
    }
}
