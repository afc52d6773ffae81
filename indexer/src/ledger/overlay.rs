//! Outputs produced and consumed within the batch being built.

use std::collections::{HashMap, HashSet};

use super::{LedgerError, LedgerReader};
use crate::model::{UtxoKey, UtxoRecord};

#[derive(Debug, Default)]
pub struct BatchOverlay {
    produced: HashMap<UtxoKey, UtxoRecord>,
    /// Production order, so the surviving outputs come out deterministically.
    order: Vec<UtxoKey>,
    consumed: HashSet<UtxoKey>,
}

impl BatchOverlay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn produce(&mut self, record: UtxoRecord) {
        let key = record.key();
        if self.produced.insert(key, record).is_none() {
            self.order.push(key);
        }
    }

    /// Consume `key`, resolving it from this batch first and from `reader`
    /// otherwise. Returns the consumed record.
    pub fn consume<R: LedgerReader + ?Sized>(
        &mut self,
        key: &UtxoKey,
        reader: &R,
    ) -> Result<UtxoRecord, LedgerError> {
        if !self.consumed.insert(*key) {
            return Err(LedgerError::double_spend(key));
        }
        if let Some(record) = self.produced.remove(key) {
            return Ok(record);
        }
        match reader.utxo(key)? {
            Some(record) => Ok(record),
            None => {
                self.consumed.remove(key);
                Err(LedgerError::unknown(key))
            }
        }
    }

    /// Outputs produced in this batch and still unspent at its end.
    pub fn into_unspent(self) -> Vec<UtxoRecord> {
        let mut produced = self.produced;
        self.order
            .into_iter()
            .filter_map(|key| produced.remove(&key))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::memory::MemoryLedger;

    fn record(seed: u8, index: u32) -> UtxoRecord {
        UtxoRecord {
            tx_hash: [seed; 32],
            index,
            address: format!("addr{seed}"),
            amount: 100,
            block_num: 1,
        }
    }

    #[test]
    fn intra_batch_output_resolves_without_reader() {
        let ledger = MemoryLedger::default();
        let mut overlay = BatchOverlay::new();
        overlay.produce(record(1, 0));
        overlay.produce(record(1, 1));

        let spent = overlay.consume(&UtxoKey::new([1; 32], 0), &ledger).unwrap();
        assert_eq!(spent.index, 0);

        let unspent = overlay.into_unspent();
        assert_eq!(unspent, vec![record(1, 1)]);
    }

    #[test]
    fn stored_output_resolves_through_reader() {
        let ledger = MemoryLedger::default().with_utxo(record(2, 0));
        let mut overlay = BatchOverlay::new();
        let spent = overlay.consume(&UtxoKey::new([2; 32], 0), &ledger).unwrap();
        assert_eq!(spent, record(2, 0));
    }

    #[test]
    fn unknown_and_double_spend() {
        let ledger = MemoryLedger::default().with_utxo(record(2, 0));
        let mut overlay = BatchOverlay::new();

        assert!(matches!(
            overlay.consume(&UtxoKey::new([9; 32], 0), &ledger),
            Err(LedgerError::UnknownUtxo { .. })
        ));

        let key = UtxoKey::new([2; 32], 0);
        overlay.consume(&key, &ledger).unwrap();
        assert!(matches!(
            overlay.consume(&key, &ledger),
            Err(LedgerError::DoubleSpend { .. })
        ));
    }
}
