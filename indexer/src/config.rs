//! # Protocol Configuration & Constants
//!
//! Every magic number the indexer depends on lives here. Most of them are
//! genesis parameters of the chain we index; changing them does not change
//! the chain, it just makes us compute the wrong block times.
//!
//! The rest are operational knobs for the scheduler. Those have sane
//! defaults and can be overridden per deployment.

use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Genesis Parameters
// ---------------------------------------------------------------------------

/// Number of slots in one epoch.
pub const SLOTS_PER_EPOCH: u64 = 21_600;

/// Duration of one slot, in seconds.
pub const SLOT_DURATION_SECS: u64 = 20;

/// Mainnet system start (unix seconds). Slot 0 of epoch 0 begins here.
pub const MAINNET_START_TIME: i64 = 1_506_203_091;

/// Genesis hash the bridge uses for `/genesis/{hash}` on mainnet.
pub const MAINNET_GENESIS_HASH: &str =
    "5f20df933584822601f9e3f8c024eb5eb252fe8cefb24d1317dc3d432e940ebb";

// ---------------------------------------------------------------------------
// Sync Strategy
// ---------------------------------------------------------------------------

/// Remote slot index within the epoch at which only one trailing epoch is
/// still considered unstable. At or below it, two are.
pub const STABLE_SLOT_BOUNDARY: u64 = 2_160;

/// If the local tip sits in the last stable epoch, bulk download still
/// pays off while the local slot is below this index.
pub const EPOCH_DOWNLOAD_THRESHOLD: u64 = 14_400;

/// How far back a rollback rewinds from the best known height.
pub const ROLLBACK_BLOCKS_COUNT: u64 = 200;

/// Pending work items beyond which the poller stops enqueueing.
pub const QUEUE_MAX_LENGTH: usize = 10_000;

/// Maximum number of single-block work items enqueued per poll cycle.
pub const MAX_BLOCKS_PER_POLL: u64 = 9_000;

/// Blocks from an epoch bundle are committed in batches of this size.
pub const EPOCH_COMMIT_BATCH: usize = 100;

/// Default interval between tip polls.
pub const DEFAULT_CHECK_TIP_INTERVAL: Duration = Duration::from_secs(20);

/// Default interval between message pool checks.
pub const DEFAULT_CHECK_MEMPOOL_INTERVAL: Duration = Duration::from_secs(30);

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

/// A stable chunk checkpoint is written every Nth chunk.
pub const CHUNK_STABLE_INTERVAL: u64 = 10;

/// Addresses longer than this are truncated before storage.
pub const MAX_ADDRESS_LENGTH: usize = 1_000;

/// Characters kept from the start of a truncated address.
pub const TRUNCATED_ADDRESS_PREFIX: usize = 497;

/// Characters kept from the end of a truncated address.
pub const TRUNCATED_ADDRESS_SUFFIX: usize = 500;

// ---------------------------------------------------------------------------
// NetworkConfig
// ---------------------------------------------------------------------------

/// Which transaction encoding the indexed chain uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolEra {
    /// CBOR `[inputs, outputs, attributes]` transactions, witnesses apart.
    Legacy,
    /// Self-describing binary fragments with account inputs and certificates.
    Extended,
}

/// Address discrimination of the extended era.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Discrimination {
    Production,
    Test,
}

impl Discrimination {
    /// High bit of an address header byte.
    pub fn header_bit(self) -> u8 {
        match self {
            Discrimination::Production => 0x00,
            Discrimination::Test => 0x80,
        }
    }
}

/// Genesis parameters and endpoints of the network being indexed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NetworkConfig {
    /// Human-readable network name, used for logging only.
    pub name: String,
    /// Base URL of the chain bridge.
    pub bridge_url: String,
    /// Unix time (seconds) of slot 0 in epoch 0.
    pub start_time: i64,
    pub slots_per_epoch: u64,
    pub slot_duration_secs: u64,
    pub era: ProtocolEra,
    pub discrimination: Discrimination,
    /// Genesis hash used to fetch the initial UTXO distribution.
    pub genesis_hash: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            name: "mainnet".to_string(),
            bridge_url: "http://127.0.0.1:8082/mainnet".to_string(),
            start_time: MAINNET_START_TIME,
            slots_per_epoch: SLOTS_PER_EPOCH,
            slot_duration_secs: SLOT_DURATION_SECS,
            era: ProtocolEra::Legacy,
            discrimination: Discrimination::Production,
            genesis_hash: MAINNET_GENESIS_HASH.to_string(),
        }
    }
}

impl NetworkConfig {
    /// Load a network config from JSON. Missing fields take mainnet defaults.
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    /// Wall-clock start of a slot:
    /// `start_time + (epoch * slots_per_epoch + slot) * slot_duration`.
    ///
    /// `None` when the slot lies outside the representable time range.
    pub fn slot_time(&self, epoch: u64, slot: u64) -> Option<DateTime<Utc>> {
        let absolute_slot = epoch
            .checked_mul(self.slots_per_epoch)?
            .checked_add(slot)?;
        let offset = i64::try_from(absolute_slot.checked_mul(self.slot_duration_secs)?).ok()?;
        Utc.timestamp_opt(self.start_time.checked_add(offset)?, 0)
            .single()
    }
}

// ---------------------------------------------------------------------------
// SchedulerConfig
// ---------------------------------------------------------------------------

/// Tuning knobs for the chain sync scheduler.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Interval between tip polls.
    pub check_tip_interval: Duration,
    /// Bound of the work queue.
    pub queue_max_length: usize,
    /// Cap on single-block work items per poll.
    pub max_blocks_per_poll: u64,
    /// Rollback lookback window, in blocks.
    pub rollback_blocks: u64,
    /// Commit batch size when walking an epoch bundle.
    pub epoch_commit_batch: usize,
    /// Interval between message pool checks for rejected submissions.
    pub check_mempool_interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            check_tip_interval: DEFAULT_CHECK_TIP_INTERVAL,
            queue_max_length: QUEUE_MAX_LENGTH,
            max_blocks_per_poll: MAX_BLOCKS_PER_POLL,
            rollback_blocks: ROLLBACK_BLOCKS_COUNT,
            epoch_commit_batch: EPOCH_COMMIT_BATCH,
            check_mempool_interval: DEFAULT_CHECK_MEMPOOL_INTERVAL,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_time_matches_genesis_formula() {
        let config = NetworkConfig::default();
        let time = config.slot_time(0, 0).unwrap();
        assert_eq!(time.timestamp(), MAINNET_START_TIME);

        // Epoch 1, slot 5: (21600 + 5) * 20 seconds after start.
        let time = config.slot_time(1, 5).unwrap();
        assert_eq!(time.timestamp(), MAINNET_START_TIME + 21_605 * 20);
    }

    #[test]
    fn slot_time_out_of_range_is_none() {
        let config = NetworkConfig::default();
        assert!(config.slot_time(u64::MAX / 2, 1).is_none());
        assert!(config.slot_time(0, u64::MAX).is_none());
        // Fits u64 seconds but not i64.
        assert!(config.slot_time(u64::MAX / (21_600 * 20), 0).is_none());
    }

    #[test]
    fn network_config_json_partial_override() {
        let raw = r#"{ "name": "testnet", "startTime": 1563999616, "era": "extended" }"#;
        let config = NetworkConfig::from_json(raw).unwrap();
        assert_eq!(config.name, "testnet");
        assert_eq!(config.start_time, 1_563_999_616);
        assert_eq!(config.era, ProtocolEra::Extended);
        // Untouched fields fall back to mainnet.
        assert_eq!(config.slots_per_epoch, SLOTS_PER_EPOCH);
        assert_eq!(config.discrimination, Discrimination::Production);
    }

    #[test]
    fn truncation_constants_fit_limit() {
        // prefix + "..." + suffix must itself be within the limit.
        assert_eq!(
            TRUNCATED_ADDRESS_PREFIX + 3 + TRUNCATED_ADDRESS_SUFFIX,
            MAX_ADDRESS_LENGTH
        );
    }

    #[test]
    fn scheduler_defaults() {
        let config = SchedulerConfig::default();
        assert_eq!(config.queue_max_length, 10_000);
        assert_eq!(config.max_blocks_per_poll, 9_000);
        assert_eq!(config.rollback_blocks, 200);
    }
}
