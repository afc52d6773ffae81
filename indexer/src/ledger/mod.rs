//! # Ledger State Tracker
//!
//! Derives state changes from decoded transactions: which outputs are
//! consumed, which are produced, and how account balances and spending
//! counters move. The tracker never writes anything itself. It reads prior
//! state through [`LedgerReader`] and hands a [`BatchDelta`] to the storage
//! processor, which commits it atomically.
//!
//! ## Ordering
//!
//! Account counters and balances are cumulative, so transactions must be
//! applied in block order and, within a block, in transaction order. A
//! batch keeps its own running view of every account it touched; the
//! reader is only consulted the first time an account shows up.
//!
//! ## Value accounting
//!
//! Every transaction gets input and output sums and a fee. Outputs add to
//! the circulating supply and inputs remove from it, so fees leave it for
//! good. UTXO-model addresses get a balance row per transaction, keyed the
//! same way as account rows so a rollback undoes both alike.
//!
//! ## Intra-batch outputs
//!
//! An output produced earlier in the same batch is not in storage yet.
//! [`BatchOverlay`] resolves those before falling back to the reader.

pub mod overlay;
pub mod tracker;

use thiserror::Error;

use crate::model::{AccountState, AddressBalance, UtxoKey, UtxoRecord};

pub use overlay::BatchOverlay;
pub use tracker::{BatchDelta, LedgerTracker, TxDelta};

/// Accounting inconsistency. Always fatal: it means either a decoder bug
/// or upstream data we do not understand.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("unknown or already spent output {tx_hash}:{index}")]
    UnknownUtxo { tx_hash: String, index: u32 },

    #[error("output {tx_hash}:{index} spent twice within one batch")]
    DoubleSpend { tx_hash: String, index: u32 },

    #[error("value {0} does not fit a signed balance")]
    ValueOverflow(u64),

    #[error("balance overflow on account {0}")]
    BalanceOverflow(String),

    /// The backing store could not be read.
    #[error("ledger read failed: {0}")]
    Read(String),
}

impl LedgerError {
    pub(crate) fn unknown(key: &UtxoKey) -> Self {
        LedgerError::UnknownUtxo {
            tx_hash: hex::encode(key.tx_hash),
            index: key.index,
        }
    }

    pub(crate) fn double_spend(key: &UtxoKey) -> Self {
        LedgerError::DoubleSpend {
            tx_hash: hex::encode(key.tx_hash),
            index: key.index,
        }
    }
}

/// Read access to committed ledger state.
pub trait LedgerReader {
    /// An unspent output, if it exists and has not been consumed.
    fn utxo(&self, key: &UtxoKey) -> Result<Option<UtxoRecord>, LedgerError>;

    /// Current state of an account, if it has ever been touched.
    fn account(&self, account: &str) -> Result<Option<AccountState>, LedgerError>;

    /// Current balance of a UTXO-model address, if it has ever been touched.
    fn address_balance(&self, address: &str) -> Result<Option<AddressBalance>, LedgerError>;

    /// Circulating supply after the last committed transaction.
    fn supply(&self) -> Result<i64, LedgerError>;
}
