//! # Data Model
//!
//! Decoded chain data and the ledger records derived from it.
//!
//! ```text
//! block.rs        - Block, update payload, best-block pointer
//! transaction.rs  - Transaction, Input, Output, status
//! certificate.rs  - Stake delegation and pool certificates
//! records.rs      - UTXO, account, address, delegation and chunk records
//! ```
//!
//! Decoded values (`Block`, `Transaction`) are immutable once built. Derived
//! records are only ever produced by the ledger tracker and only ever
//! written by the storage processor.

pub mod block;
pub mod certificate;
pub mod records;
pub mod transaction;

pub use block::{BestBlock, Block, UpdatePayload};
pub use certificate::{Certificate, CertificateKind, CertificatePayload};
pub use records::{
    AccountLedgerRow, AccountState, AddressBalance, AddressLedgerRow, BlockTotals,
    CertificateRecord, ChunkCheckpoint, DelegationRecord, PendingTransaction, ResolvedInput,
    SpentUtxo, StoredTransaction, TxValue, UtxoKey, UtxoRecord,
};
pub use transaction::{AddressKind, Input, Output, OutputKind, Transaction, TxContext, TxStatus};
