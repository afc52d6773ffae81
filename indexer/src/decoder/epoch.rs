//! Packed epoch bundles.
//!
//! ```text
//! pack   = magic[8] version:u32 entry*
//! entry  = len:u32 block[len] pad       (pad to a 4-byte boundary)
//! ```

use super::reader::Reader;
use super::DecodeError;

pub const PACK_MAGIC: &[u8; 8] = b"ADAPACK\0";
pub const PACK_VERSION: u32 = 1;

fn padding(len: usize) -> usize {
    (4 - len % 4) % 4
}

/// Split a pack into raw block slices, in order. An empty pack (header
/// only) yields no blocks.
pub fn unpack(bytes: &[u8]) -> Result<Vec<&[u8]>, DecodeError> {
    let mut reader = Reader::new(bytes);
    if reader.read_fixed::<8>().map_err(|_| DecodeError::BadEpochMagic)? != *PACK_MAGIC {
        return Err(DecodeError::BadEpochMagic);
    }
    let version = reader.read_u32()?;
    if version != PACK_VERSION {
        return Err(DecodeError::UnsupportedEpochVersion(version));
    }

    let mut blocks = Vec::new();
    while !reader.is_empty() {
        let len = reader.read_u32()? as usize;
        blocks.push(reader.read_slice(len)?);
        reader.read_slice(padding(len))?;
    }
    Ok(blocks)
}

/// Inverse of `unpack`.
pub fn pack<'a>(blocks: impl IntoIterator<Item = &'a [u8]>) -> Vec<u8> {
    let mut out = PACK_MAGIC.to_vec();
    out.extend_from_slice(&PACK_VERSION.to_be_bytes());
    for block in blocks {
        out.extend_from_slice(&(block.len() as u32).to_be_bytes());
        out.extend_from_slice(block);
        out.resize(out.len() + padding(block.len()), 0);
    }
    out
}
