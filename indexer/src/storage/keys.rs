//! Key layout of the `index` tree.
//!
//! Every record type lives in its own keyspace, distinguished by a one-byte
//! prefix. Integers are big-endian so that sled's lexicographic order is
//! numeric order within a keyspace.

use crate::crypto::Hash;
use crate::model::UtxoKey;

pub const BLOCK: u8 = b'b';
pub const BLOCK_HASH: u8 = b'h';
pub const TRANSACTION: u8 = b't';
pub const UTXO: u8 = b'u';
pub const SPENT: u8 = b's';
pub const ACCOUNT_ROW: u8 = b'l';
pub const ACCOUNT: u8 = b'a';
pub const ADDRESS_ROW: u8 = b'r';
pub const ADDRESS: u8 = b'w';
pub const PENDING: u8 = b'p';
pub const DELEGATION: u8 = b'd';
pub const CERTIFICATE: u8 = b'c';
pub const CHUNK: u8 = b'k';
pub const META: u8 = b'm';

/// Separates the owner id from the height in ledger row keys. Account ids
/// are hex and addresses base58 or bech32, so the byte never occurs inside
/// them.
const ROW_SEPARATOR: u8 = 0x00;

pub const META_LAST_CHUNK: &[u8] = b"mlast_chunk";
pub const META_GENESIS: &[u8] = b"mgenesis_loaded";
pub const META_GENESIS_SUPPLY: &[u8] = b"mgenesis_supply";

fn prefixed(prefix: u8, parts: &[&[u8]]) -> Vec<u8> {
    let len = 1 + parts.iter().map(|p| p.len()).sum::<usize>();
    let mut key = Vec::with_capacity(len);
    key.push(prefix);
    for part in parts {
        key.extend_from_slice(part);
    }
    key
}

/// `b | height | boundary flag`. A boundary block shares the height of the
/// main block before it and sorts right after it.
pub fn block(height: u64, is_epoch_boundary: bool) -> Vec<u8> {
    prefixed(BLOCK, &[&height.to_be_bytes(), &[u8::from(is_epoch_boundary)]])
}

/// First block key strictly above `height`.
pub fn blocks_above(height: u64) -> Vec<u8> {
    block(height.saturating_add(1), false)
}

pub fn block_hash(hash: &Hash) -> Vec<u8> {
    prefixed(BLOCK_HASH, &[hash])
}

pub fn transaction(hash: &Hash) -> Vec<u8> {
    prefixed(TRANSACTION, &[hash])
}

pub fn utxo(key: &UtxoKey) -> Vec<u8> {
    prefixed(UTXO, &[&key.to_bytes()])
}

pub fn spent(key: &UtxoKey) -> Vec<u8> {
    prefixed(SPENT, &[&key.to_bytes()])
}

/// All ledger rows of one owner share this prefix.
pub fn rows(prefix: u8, owner: &str) -> Vec<u8> {
    prefixed(prefix, &[owner.as_bytes(), &[ROW_SEPARATOR]])
}

/// End (exclusive) of an owner's row range.
pub fn rows_end(prefix: u8, owner: &str) -> Vec<u8> {
    prefixed(prefix, &[owner.as_bytes(), &[ROW_SEPARATOR + 1]])
}

/// `prefix | owner | 0x00 | height | row ordinal`.
pub fn row(prefix: u8, owner: &str, height: u64, row_ordinal: u32) -> Vec<u8> {
    let mut key = rows(prefix, owner);
    key.extend_from_slice(&height.to_be_bytes());
    key.extend_from_slice(&row_ordinal.to_be_bytes());
    key
}

pub fn account_rows(account: &str) -> Vec<u8> {
    rows(ACCOUNT_ROW, account)
}

pub fn account_rows_end(account: &str) -> Vec<u8> {
    rows_end(ACCOUNT_ROW, account)
}

pub fn account_row(account: &str, height: u64, row_ordinal: u32) -> Vec<u8> {
    row(ACCOUNT_ROW, account, height, row_ordinal)
}

pub fn account(account: &str) -> Vec<u8> {
    prefixed(ACCOUNT, &[account.as_bytes()])
}

pub fn address_row(address: &str, height: u64, row_ordinal: u32) -> Vec<u8> {
    row(ADDRESS_ROW, address, height, row_ordinal)
}

pub fn address(address: &str) -> Vec<u8> {
    prefixed(ADDRESS, &[address.as_bytes()])
}

pub fn pending(hash: &Hash) -> Vec<u8> {
    prefixed(PENDING, &[hash])
}

pub fn delegation(tx_hash: &Hash, cert_ordinal: u32) -> Vec<u8> {
    prefixed(DELEGATION, &[tx_hash, &cert_ordinal.to_be_bytes()])
}

pub fn certificate(tx_hash: &Hash, cert_ordinal: u32) -> Vec<u8> {
    prefixed(CERTIFICATE, &[tx_hash, &cert_ordinal.to_be_bytes()])
}

pub fn chunk(chunk: u64) -> Vec<u8> {
    prefixed(CHUNK, &[&chunk.to_be_bytes()])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boundary_sorts_after_main_block_of_same_height() {
        let main = block(100, false);
        let boundary = block(100, true);
        let next = block(101, false);
        assert!(main < boundary);
        assert!(boundary < next);
        assert_eq!(blocks_above(100), next);
    }

    #[test]
    fn account_row_range_is_tight() {
        let start = account_rows("05ab");
        let end = account_rows_end("05ab");
        let row = account_row("05ab", u64::MAX, u32::MAX);
        assert!(start < row && row < end);
        // A longer id with the same prefix falls outside.
        let other = account_row("05abcd", 0, 0);
        assert!(other >= end);
    }

    #[test]
    fn address_rows_do_not_mix_with_account_rows() {
        let account = account_row("Ae2", 1, 0);
        let address = address_row("Ae2", 1, 0);
        assert_ne!(account, address);
        assert!(address > rows(ADDRESS_ROW, "Ae2"));
        assert!(address < rows_end(ADDRESS_ROW, "Ae2"));
    }
}
