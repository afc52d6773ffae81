//! # Storage Processor
//!
//! Durable representation of everything the indexer derives, and the only
//! component allowed to write it.
//!
//! ```text
//! keys.rs       - keyspace prefixes and key encodings
//! db.rs         - IndexerDB: typed reads, WriteSet, rollback undo
//! processor.rs  - StorageProcessor trait and its sled implementation
//! ```
//!
//! ## Chunks
//!
//! Every commit is one chunk and bumps a persisted chunk counter. Every
//! `CHUNK_STABLE_INTERVAL`th chunk is sealed with a checkpoint recording
//! the highest height it covers. Data above the newest checkpoint is
//! provisional: a restart drops it, and a rollback never keeps it.

pub mod db;
pub mod keys;
pub mod processor;

pub use db::{BlockRecord, IndexerDB, RollbackSummary, StorageError, StorageResult, WriteSet};
pub use processor::{CommitSummary, SledStorageProcessor, StorageProcessor};
