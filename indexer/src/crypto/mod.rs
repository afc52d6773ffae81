//! # Cryptographic Primitives
//!
//! The indexer does not validate signatures; the only cryptography it needs
//! is content addressing. Block hashes, transaction ids, fragment ids and
//! pool ids are all Blake2b with a 32-byte digest, and they have to match
//! the producer bit-for-bit or nothing downstream lines up.

pub mod hash;

pub use hash::{blake2b_256, from_hex, to_hex, Hash};
