// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Ledger Indexer - Core Library
//!
//! A downstream indexer for a UTXO/account hybrid chain. It polls a chain
//! bridge for new blocks and epochs, decodes the binary payloads, derives
//! ledger state (unspent outputs, account balances, certificates) and
//! commits everything into a queryable store. It trusts the node's data;
//! the only thing it has to get right is noticing when the node changes
//! its mind about history, and rewinding accordingly.
//!
//! ## Architecture
//!
//! Leaf-first, the modules are:
//!
//! - **config** - Protocol constants, genesis parameters, scheduler knobs.
//! - **crypto** - Blake2b-256 content addressing.
//! - **model** - Blocks, transactions, certificates and derived records.
//! - **decoder** - Pure functions from raw bytes to `model` values.
//! - **ledger** - UTXO consumption/production, account deltas, fees and supply.
//! - **storage** - sled-backed commit, rollback and chunk checkpointing.
//! - **sync** - The tip-tracking scheduler, its work queue and the
//!   message pool checker for submitted transactions.
//!
//! ## Data Flow
//!
//! ```text
//! Scheduler ── fetch ──> Decoder ──> LedgerTracker ──> StorageProcessor
//!     ^                                                      │
//!     └──────────────── best block / rollback ───────────────┘
//! ```
//!
//! ## Ground Rules
//!
//! 1. One writer. The storage processor owns the durable state and the
//!    scheduler feeds it from a queue with concurrency exactly 1.
//! 2. Decode failures and accounting inconsistencies are fatal. We never
//!    skip a block we could not understand.
//! 3. A reorganization is a control signal, not an error.

pub mod config;
pub mod crypto;
pub mod decoder;
pub mod ledger;
pub mod model;
pub mod storage;
pub mod sync;
