//! Address kinds and storage-side address normalisation.

use super::reader::Reader;
use super::DecodeError;
use crate::config::{
    Discrimination, MAX_ADDRESS_LENGTH, TRUNCATED_ADDRESS_PREFIX, TRUNCATED_ADDRESS_SUFFIX,
};
use crate::model::AddressKind;

const KIND_MASK: u8 = 0x7f;

const KIND_SINGLE: u8 = 0x03;
const KIND_GROUP: u8 = 0x04;
const KIND_ACCOUNT: u8 = 0x05;
const KIND_MULTISIG: u8 = 0x06;

/// Length of a public key or multisig identifier.
const KEY_LEN: usize = 32;

/// Truncate addresses longer than `MAX_ADDRESS_LENGTH` characters to
/// `prefix + "..." + suffix`. Shorter addresses are returned unchanged.
///
/// A handful of legacy mainnet addresses run to tens of kilobytes. Nobody
/// needs them to stay spendable through the indexer, but every decode of
/// the same address must produce the same stored string.
///
/// ```
/// use ledger_indexer::decoder::fix_long_address;
///
/// assert_eq!(fix_long_address("short"), "short");
/// let long = "a".repeat(1_500);
/// assert_eq!(fix_long_address(&long).chars().count(), 1_000);
/// ```
pub fn fix_long_address(address: &str) -> String {
    let chars: Vec<char> = address.chars().collect();
    if chars.len() <= MAX_ADDRESS_LENGTH {
        return address.to_string();
    }
    let prefix: String = chars[..TRUNCATED_ADDRESS_PREFIX].iter().collect();
    let suffix: String = chars[chars.len() - TRUNCATED_ADDRESS_SUFFIX..].iter().collect();
    format!("{prefix}...{suffix}")
}

/// Address kind from a header byte. The high bit is the discrimination.
pub fn kind_from_header(header: u8) -> Result<AddressKind, DecodeError> {
    match header & KIND_MASK {
        KIND_SINGLE => Ok(AddressKind::Single),
        KIND_GROUP => Ok(AddressKind::Group),
        KIND_ACCOUNT => Ok(AddressKind::Account),
        KIND_MULTISIG => Ok(AddressKind::Multisig),
        _ => Err(DecodeError::UnknownAddressKind(header)),
    }
}

fn payload_len(kind: AddressKind) -> usize {
    match kind {
        AddressKind::Group => 2 * KEY_LEN,
        _ => KEY_LEN,
    }
}

/// Read one extended address. Returns its kind and full bytes, header
/// included.
pub fn read_address<'a>(reader: &mut Reader<'a>) -> Result<(AddressKind, &'a [u8]), DecodeError> {
    let start = reader.consumed().len();
    let header = reader.read_u8()?;
    let kind = kind_from_header(header)?;
    reader.read_slice(payload_len(kind))?;
    Ok((kind, &reader.consumed()[start..]))
}

/// Hex address of an account key under the given discrimination.
pub fn account_address_hex(key: &[u8; KEY_LEN], discrimination: Discrimination) -> String {
    let mut raw = Vec::with_capacity(1 + KEY_LEN);
    raw.push(discrimination.header_bit() | KIND_ACCOUNT);
    raw.extend_from_slice(key);
    hex::encode(raw)
}
