//! # Binary Decoder
//!
//! Pure functions from raw node bytes to `model` values. Nothing in here
//! performs I/O or keeps state between calls; the `Decoder` only carries
//! the genesis parameters needed to turn slots into timestamps and to
//! pick the transaction encoding.
//!
//! ```text
//! cbor.rs         - ciborium value accessors and canonical re-encoding
//! block.rs        - [type, [header, body]] envelopes
//! legacy.rs       - CBOR transactions and their content-addressed ids
//! reader.rs       - big-endian cursor over fragment bytes
//! fragment.rs     - extended transactions (account inputs, certificates)
//! certificate.rs  - certificate payload layouts
//! address.rs      - address kinds and long-address truncation
//! epoch.rs        - packed epoch bundles
//! ```
//!
//! Every structural surprise is a `DecodeError`. There is no lenient mode:
//! a block we cannot fully understand must stop the indexer rather than be
//! committed half-read.

pub mod address;
pub mod block;
pub mod certificate;
pub mod cbor;
pub mod epoch;
pub mod fragment;
pub mod legacy;
pub mod reader;

use thiserror::Error;

use crate::config::{NetworkConfig, ProtocolEra};
use crate::model::{Block, Transaction, TxContext};

pub use address::fix_long_address;

// ---------------------------------------------------------------------------
// DecodeError
// ---------------------------------------------------------------------------

/// Malformed or unrecognized binary structure. Always fatal.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The bytes are not valid CBOR.
    #[error("cbor: {0}")]
    Cbor(String),

    /// A CBOR value did not have the expected shape.
    #[error("malformed {what}: {detail}")]
    Malformed { what: &'static str, detail: String },

    /// Leading block discriminant is neither boundary (0) nor regular (1).
    #[error("unexpected block type {0}")]
    UnknownBlockType(u64),

    /// Legacy input type other than the plain UTXO pointer.
    #[error("unexpected input type {0}")]
    UnknownInputType(u64),

    /// Ran out of bytes while reading a fragment.
    #[error("unexpected end of input: needed {needed} bytes, {remaining} left")]
    UnexpectedEof { needed: usize, remaining: usize },

    /// Bytes left over after a fully-read structure.
    #[error("{0} trailing bytes after decode")]
    TrailingBytes(usize),

    #[error("fragment size {declared} does not match payload of {actual} bytes")]
    FragmentSize { declared: usize, actual: usize },

    #[error("unknown fragment tag {0}")]
    UnknownFragmentTag(u8),

    #[error("unknown address kind {0:#04x}")]
    UnknownAddressKind(u8),

    #[error("unknown delegation type {0}")]
    UnknownDelegationType(u8),

    /// Certificate structurally inconsistent with its declared kind.
    #[error("malformed {kind} certificate: {reason}")]
    MalformedCertificate { kind: &'static str, reason: String },

    /// Epoch and slot do not map to a representable wall-clock time.
    #[error("slot {slot} of epoch {epoch} is out of the time range")]
    SlotOutOfRange { epoch: u64, slot: u64 },

    #[error("bad epoch pack magic")]
    BadEpochMagic,

    #[error("unsupported epoch pack version {0}")]
    UnsupportedEpochVersion(u32),
}

impl DecodeError {
    pub(crate) fn malformed(what: &'static str, detail: impl Into<String>) -> Self {
        DecodeError::Malformed {
            what,
            detail: detail.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Decoder
// ---------------------------------------------------------------------------

/// Entry point for all decoding. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Decoder {
    network: NetworkConfig,
}

impl Decoder {
    pub fn new(network: NetworkConfig) -> Self {
        Self { network }
    }

    pub fn network(&self) -> &NetworkConfig {
        &self.network
    }

    /// Decode one block. The block's transactions are decoded with the
    /// encoding of the configured era and carry their block context.
    pub fn decode_block(&self, bytes: &[u8]) -> Result<Block, DecodeError> {
        block::decode_block(&self.network, bytes)
    }

    /// Decode one transaction outside of a block body.
    ///
    /// Legacy transactions are the CBOR `[tx, witnesses]` pair; extended
    /// ones are a size-prefixed fragment.
    pub fn decode_transaction(
        &self,
        bytes: &[u8],
        context: TxContext,
    ) -> Result<Transaction, DecodeError> {
        match self.network.era {
            ProtocolEra::Legacy => {
                let value = cbor::decode(bytes)?;
                legacy::decode_transaction(&value, context)
            }
            ProtocolEra::Extended => {
                fragment::decode_fragment(bytes, self.network.discrimination, context)
            }
        }
    }

    /// Decode a packed epoch into its blocks, in chain order.
    pub fn decode_epoch(&self, bytes: &[u8]) -> Result<Vec<Block>, DecodeError> {
        epoch::unpack(bytes)?
            .into_iter()
            .map(|raw| self.decode_block(raw))
            .collect()
    }
}
