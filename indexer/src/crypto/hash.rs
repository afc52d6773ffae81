//! # Hashing Utilities
//!
//! Blake2b-256 (unkeyed, 32-byte output) over canonical encodings. The
//! chain uses it for every identifier we store, so this is the one hash
//! function the indexer needs.

use blake2b_simd::Params;

/// A 32-byte content hash.
pub type Hash = [u8; 32];

/// Compute the Blake2b-256 digest of `data`.
///
/// # Example
///
/// ```
/// use ledger_indexer::crypto::blake2b_256;
///
/// let hash = blake2b_256(b"ledger");
/// assert_eq!(hash.len(), 32);
/// ```
pub fn blake2b_256(data: &[u8]) -> Hash {
    let digest = Params::new().hash_length(32).hash(data);
    let mut output = [0u8; 32];
    output.copy_from_slice(digest.as_bytes());
    output
}

/// Hex-encode a hash for logs and API responses.
pub fn to_hex(hash: &Hash) -> String {
    hex::encode(hash)
}

/// Parse a 64-character hex string into a hash.
pub fn from_hex(raw: &str) -> Option<Hash> {
    let bytes = hex::decode(raw).ok()?;
    bytes.try_into().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blake2b_256_known_vector() {
        // Blake2b-256 of the empty string.
        let hash = blake2b_256(b"");
        assert_eq!(
            to_hex(&hash),
            "0e5751c026e543b2e8ab2eb06099daa1d1e5df47778f7787faab45cdf12fe3a8"
        );
    }

    #[test]
    fn blake2b_256_is_deterministic() {
        assert_eq!(blake2b_256(b"block"), blake2b_256(b"block"));
        assert_ne!(blake2b_256(b"block"), blake2b_256(b"blocks"));
    }

    #[test]
    fn hex_round_trip_and_rejects_bad_length() {
        let hash = blake2b_256(b"x");
        assert_eq!(from_hex(&to_hex(&hash)), Some(hash));
        assert_eq!(from_hex("abcd"), None);
        assert_eq!(from_hex("zz"), None);
    }
}
