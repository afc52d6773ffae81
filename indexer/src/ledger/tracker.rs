//! Per-batch state derivation.

use std::collections::BTreeMap;

use tracing::trace;

use super::overlay::BatchOverlay;
use super::{LedgerError, LedgerReader};
use crate::crypto::Hash;
use crate::model::{
    AccountLedgerRow, AccountState, AddressBalance, AddressLedgerRow, Block, BlockTotals,
    Certificate, CertificateRecord, DelegationRecord, Input, Output, ResolvedInput, SpentUtxo,
    StoredTransaction, Transaction, TxContext, TxStatus, TxValue, UtxoKey, UtxoRecord,
};

// ---------------------------------------------------------------------------
// Deltas
// ---------------------------------------------------------------------------

/// What one transaction changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TxDelta {
    pub consumed: Vec<UtxoKey>,
    pub produced: Vec<UtxoRecord>,
    pub account_rows: Vec<AccountLedgerRow>,
    pub address_rows: Vec<AddressLedgerRow>,
    pub delegation: Option<DelegationRecord>,
    pub value: TxValue,
}

/// Everything a batch of blocks changed, ready to be committed.
#[derive(Debug, Clone, Default)]
pub struct BatchDelta {
    /// Consumed outputs, including ones produced earlier in the batch.
    pub spent: Vec<SpentUtxo>,
    /// Produced outputs that are still unspent at the end of the batch.
    pub unspent: Vec<UtxoRecord>,
    pub account_rows: Vec<AccountLedgerRow>,
    /// Final state of every account the batch touched.
    pub accounts: BTreeMap<String, AccountState>,
    pub address_rows: Vec<AddressLedgerRow>,
    /// Final balance of every UTXO-model address the batch touched.
    pub addresses: BTreeMap<String, AddressBalance>,
    pub delegations: Vec<DelegationRecord>,
    pub certificates: Vec<CertificateRecord>,
    pub transactions: Vec<StoredTransaction>,
    pub block_totals: BTreeMap<Hash, BlockTotals>,
    /// Supply after the last transaction of the batch.
    pub supply: i64,
}

impl BatchDelta {
    /// Number of inputs plus outputs across the batch.
    pub fn txio_count(&self) -> u64 {
        self.transactions
            .iter()
            .map(|stored| (stored.tx.inputs.len() + stored.tx.outputs.len()) as u64)
            .sum()
    }
}

/// Net change of one account within one transaction.
#[derive(Default)]
struct AccountChange {
    delta: i64,
    spent_inputs: u64,
}

fn signed(value: u64) -> Result<i64, LedgerError> {
    i64::try_from(value).map_err(|_| LedgerError::ValueOverflow(value))
}

/// Sum signed moves per key, in order of first appearance.
fn net_by_key(moves: Vec<(String, i64)>) -> Result<Vec<(String, i64)>, LedgerError> {
    let mut net: Vec<(String, i64)> = Vec::new();
    for (key, amount) in moves {
        match net.iter_mut().find(|(id, _)| *id == key) {
            Some((id, total)) => {
                *total = total
                    .checked_add(amount)
                    .ok_or_else(|| LedgerError::BalanceOverflow(id.clone()))?;
            }
            None => net.push((key, amount)),
        }
    }
    Ok(net)
}

// ---------------------------------------------------------------------------
// LedgerTracker
// ---------------------------------------------------------------------------

/// Builds a [`BatchDelta`] from blocks applied in chain order.
pub struct LedgerTracker<'r, R: LedgerReader + ?Sized> {
    reader: &'r R,
    overlay: BatchOverlay,
    batch: BatchDelta,
    /// Running supply, read from the reader on first use.
    supply: Option<i64>,
    /// Account ledger rows emitted so far in the current block.
    row_ordinal: u32,
    /// Address ledger rows emitted so far in the current block.
    address_row_ordinal: u32,
}

impl<'r, R: LedgerReader + ?Sized> LedgerTracker<'r, R> {
    pub fn new(reader: &'r R) -> Self {
        Self {
            reader,
            overlay: BatchOverlay::new(),
            batch: BatchDelta::default(),
            supply: None,
            row_ordinal: 0,
            address_row_ordinal: 0,
        }
    }

    pub fn apply_block(&mut self, block: &Block) -> Result<(), LedgerError> {
        self.row_ordinal = 0;
        self.address_row_ordinal = 0;
        for tx in &block.transactions {
            self.apply_transaction(block, tx)?;
        }
        let supply = self.current_supply()?;
        self.batch.block_totals.entry(block.hash).or_default().supply_after = supply;
        Ok(())
    }

    /// Turn the initial distribution into one synthetic transaction per
    /// distinct transaction hash, at height 0.
    pub fn apply_genesis(&mut self, utxos: &[UtxoRecord]) -> Result<(), LedgerError> {
        let mut grouped: Vec<(Hash, Vec<&UtxoRecord>)> = Vec::new();
        for utxo in utxos {
            match grouped.iter_mut().find(|(hash, _)| *hash == utxo.tx_hash) {
                Some((_, group)) => group.push(utxo),
                None => grouped.push((utxo.tx_hash, vec![utxo])),
            }
        }

        self.address_row_ordinal = 0;
        for (ordinal, (tx_hash, mut group)) in grouped.into_iter().enumerate() {
            group.sort_by_key(|utxo| utxo.index);
            let tx = Transaction {
                id: tx_hash,
                inputs: Vec::new(),
                outputs: group
                    .iter()
                    .map(|utxo| Output::Utxo {
                        address: utxo.address.clone(),
                        value: utxo.amount,
                    })
                    .collect(),
                certificate: None,
                body: Vec::new(),
                context: TxContext {
                    block_num: Some(0),
                    tx_ordinal: Some(ordinal as u32),
                    ..TxContext::default()
                },
                status: TxStatus::Success,
            };

            let mut moves = Vec::with_capacity(group.len());
            for utxo in group {
                self.overlay.produce(utxo.clone());
                moves.push((utxo.address.clone(), signed(utxo.amount)?));
            }
            let value = self.tx_value(&tx, &[])?;
            self.apply_address_changes(0, &tx, moves)?;
            self.batch.transactions.push(StoredTransaction {
                tx,
                resolved_inputs: Vec::new(),
                value,
                is_genesis: true,
            });
        }
        Ok(())
    }

    /// Apply one transaction of `block` on top of everything applied so
    /// far in this batch.
    pub fn apply_transaction(
        &mut self,
        block: &Block,
        tx: &Transaction,
    ) -> Result<TxDelta, LedgerError> {
        let mut delta = TxDelta::default();
        let mut resolved_inputs = Vec::with_capacity(tx.inputs.len());
        let mut address_moves = Vec::new();

        for input in &tx.inputs {
            match input {
                Input::Utxo { tx_id, index } => {
                    let key = UtxoKey::new(*tx_id, *index);
                    let record = self.overlay.consume(&key, self.reader)?;
                    address_moves.push((record.address.clone(), -signed(record.amount)?));
                    resolved_inputs.push(ResolvedInput {
                        address: record.address.clone(),
                        amount: record.amount,
                    });
                    self.batch.spent.push(SpentUtxo {
                        utxo: record,
                        spent_by: tx.id,
                        spent_at: block.height,
                    });
                    delta.consumed.push(key);
                }
                Input::Account { account_id, value } => {
                    resolved_inputs.push(ResolvedInput {
                        address: account_id.clone(),
                        amount: *value,
                    });
                }
            }
        }

        for (index, output) in tx.outputs.iter().enumerate() {
            if let Output::Utxo { address, value } = output {
                let record = UtxoRecord {
                    tx_hash: tx.id,
                    index: index as u32,
                    address: address.clone(),
                    amount: *value,
                    block_num: block.height,
                };
                address_moves.push((address.clone(), signed(*value)?));
                self.overlay.produce(record.clone());
                delta.produced.push(record);
            }
        }

        delta.value = self.tx_value(tx, &resolved_inputs)?;
        let totals = self.batch.block_totals.entry(block.hash).or_default();
        totals.sent = totals
            .sent
            .checked_add(delta.value.sum_outputs)
            .ok_or(LedgerError::ValueOverflow(delta.value.sum_outputs))?;
        totals.fees = totals
            .fees
            .checked_add(delta.value.fee)
            .ok_or(LedgerError::ValueOverflow(delta.value.fee))?;
        totals.supply_after = delta.value.supply_after;

        delta.address_rows = self.apply_address_changes(block.height, tx, address_moves)?;

        if tx.status == TxStatus::Success {
            delta.account_rows = self.apply_account_changes(block, tx)?;
        }

        if let Some(certificate) = &tx.certificate {
            delta.delegation = self.record_certificate(block, tx, certificate);
        }

        trace!(
            tx = %tx.id_hex(),
            consumed = delta.consumed.len(),
            produced = delta.produced.len(),
            account_rows = delta.account_rows.len(),
            fee = delta.value.fee,
            "applied transaction"
        );

        self.batch.transactions.push(StoredTransaction {
            tx: tx.clone(),
            resolved_inputs,
            value: delta.value,
            is_genesis: false,
        });
        Ok(delta)
    }

    fn current_supply(&mut self) -> Result<i64, LedgerError> {
        match self.supply {
            Some(supply) => Ok(supply),
            None => {
                let supply = self.reader.supply()?;
                self.supply = Some(supply);
                Ok(supply)
            }
        }
    }

    /// Input and output sums, fee, and the supply they leave behind.
    fn tx_value(&mut self, tx: &Transaction, resolved: &[ResolvedInput]) -> Result<TxValue, LedgerError> {
        let mut sum_inputs = 0u64;
        for input in resolved {
            sum_inputs = sum_inputs
                .checked_add(input.amount)
                .ok_or(LedgerError::ValueOverflow(input.amount))?;
        }
        let mut sum_outputs = 0u64;
        for output in &tx.outputs {
            sum_outputs = sum_outputs
                .checked_add(output.value())
                .ok_or(LedgerError::ValueOverflow(output.value()))?;
        }

        let (added, removed) = (signed(sum_outputs)?, signed(sum_inputs)?);
        let supply_after = self
            .current_supply()?
            .checked_add(added)
            .and_then(|supply| supply.checked_sub(removed))
            .ok_or_else(|| LedgerError::BalanceOverflow("supply".into()))?;
        self.supply = Some(supply_after);

        Ok(TxValue {
            sum_inputs,
            sum_outputs,
            fee: sum_inputs.saturating_sub(sum_outputs),
            supply_after,
        })
    }

    /// Emit one balance row per UTXO-model address the transaction moved
    /// value to or from.
    fn apply_address_changes(
        &mut self,
        height: u64,
        tx: &Transaction,
        moves: Vec<(String, i64)>,
    ) -> Result<Vec<AddressLedgerRow>, LedgerError> {
        let mut rows = Vec::new();
        for (address, delta) in net_by_key(moves)? {
            let previous = match self.batch.addresses.get(&address) {
                Some(state) => state.clone(),
                None => self.reader.address_balance(&address)?.unwrap_or_default(),
            };
            let balance = previous
                .balance
                .checked_add(delta)
                .ok_or_else(|| LedgerError::BalanceOverflow(address.clone()))?;
            let row = AddressLedgerRow {
                address: address.clone(),
                block_num: height,
                tx_ordinal: tx.tx_ordinal(),
                row_ordinal: self.address_row_ordinal,
                operation_id: tx.id,
                delta,
                balance,
            };
            self.address_row_ordinal += 1;
            self.batch.addresses.insert(
                address,
                AddressBalance {
                    balance,
                    last_height: height,
                },
            );
            self.batch.address_rows.push(row.clone());
            rows.push(row);
        }
        Ok(rows)
    }

    /// Sum the transaction's account inputs and outputs per account, in
    /// order of first appearance, and emit one ledger row per account.
    fn apply_account_changes(
        &mut self,
        block: &Block,
        tx: &Transaction,
    ) -> Result<Vec<AccountLedgerRow>, LedgerError> {
        let mut changes: Vec<(String, AccountChange)> = Vec::new();
        let mut change_for = |account: &str| -> usize {
            match changes.iter().position(|(id, _)| id == account) {
                Some(position) => position,
                None => {
                    changes.push((account.to_string(), AccountChange::default()));
                    changes.len() - 1
                }
            }
        };

        let mut pending = Vec::new();
        for (account, value) in tx.account_inputs() {
            pending.push((change_for(account), -signed(value)?, 1));
        }
        for (account, value) in tx.account_outputs() {
            pending.push((change_for(account), signed(value)?, 0));
        }
        for (position, amount, spent) in pending {
            let (account, change) = &mut changes[position];
            change.delta = change
                .delta
                .checked_add(amount)
                .ok_or_else(|| LedgerError::BalanceOverflow(account.clone()))?;
            change.spent_inputs += spent;
        }

        let mut rows = Vec::with_capacity(changes.len());
        for (account, change) in changes {
            let previous = self.account_state(&account)?;
            let balance = previous
                .balance
                .checked_add(change.delta)
                .ok_or_else(|| LedgerError::BalanceOverflow(account.clone()))?;
            let state = AccountState {
                balance,
                spending_counter: previous.spending_counter + change.spent_inputs,
                last_height: block.height,
            };
            let row = AccountLedgerRow {
                account: account.clone(),
                block_num: block.height,
                epoch: block.epoch,
                slot: block.slot,
                tx_ordinal: tx.tx_ordinal(),
                row_ordinal: self.row_ordinal,
                operation_id: tx.id,
                delta: change.delta,
                balance: state.balance,
                spending_counter: state.spending_counter,
            };
            self.row_ordinal += 1;
            self.batch.accounts.insert(account, state);
            self.batch.account_rows.push(row.clone());
            rows.push(row);
        }
        Ok(rows)
    }

    /// Latest state of an account: this batch first, then storage, then an
    /// empty account.
    fn account_state(&self, account: &str) -> Result<AccountState, LedgerError> {
        if let Some(state) = self.batch.accounts.get(account) {
            return Ok(state.clone());
        }
        Ok(self.reader.account(account)?.unwrap_or_default())
    }

    fn record_certificate(
        &mut self,
        block: &Block,
        tx: &Transaction,
        certificate: &Certificate,
    ) -> Option<DelegationRecord> {
        // One certificate per transaction.
        let cert_ordinal = 0;
        self.batch.certificates.push(CertificateRecord {
            tx_hash: tx.id,
            cert_ordinal,
            block_num: block.height,
            certificate: certificate.clone(),
        });

        let Certificate::StakeDelegation {
            payload,
            pool_id,
            account,
        } = certificate
        else {
            return None;
        };
        let record = DelegationRecord {
            tx_hash: tx.id,
            cert_ordinal,
            block_num: block.height,
            epoch: block.epoch,
            slot: block.slot,
            tx_ordinal: tx.tx_ordinal(),
            account: account.clone(),
            pool_id: pool_id.clone(),
            payload_hex: payload.payload_hex.clone(),
        };
        self.batch.delegations.push(record.clone());
        Some(record)
    }

    pub fn finish(self) -> BatchDelta {
        let mut batch = self.batch;
        batch.unspent = self.overlay.into_unspent();
        if let Some(supply) = self.supply {
            batch.supply = supply;
        }
        batch
    }
}
