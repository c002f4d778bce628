//! Engine configuration.

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};

/// Tunables for the import pipeline and sync state machine.
///
/// The defaults match a Gnosis Chain deployment of the Circles contracts;
/// only the three contract addresses and `start_block` normally need to be
/// set per environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Circles V1 hub contract.
    pub v1_hub_address: Address,
    /// Circles V2 hub contract.
    pub v2_hub_address: Address,
    /// Circles name registry contract.
    pub name_registry_address: Address,
    /// First block worth indexing (the V1 hub deployment block).
    pub start_block: i64,
    /// Events buffered before the sink flushes.
    pub event_buffer_size: usize,
    /// Block rows buffered before the block table flushes.
    pub block_buffer_size: usize,
    /// Concurrent block header fetches.
    pub fetch_parallelism: usize,
    /// Concurrent receipt fetches.
    pub receipt_parallelism: usize,
    /// Concurrent decode workers; defaults to the CPU count.
    pub decode_parallelism: usize,
    /// How many recent persisted blocks the reorg scan compares.
    pub reorg_scan_depth: i64,
    /// Consecutive sync failures tolerated before the machine halts.
    pub max_errors: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);
        Self {
            v1_hub_address: Address::ZERO,
            v2_hub_address: Address::ZERO,
            name_registry_address: Address::ZERO,
            start_block: 0,
            event_buffer_size: 100_000,
            block_buffer_size: 20_000,
            fetch_parallelism: 3,
            receipt_parallelism: 6,
            decode_parallelism: cores,
            reorg_scan_depth: 100,
            max_errors: 3,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = EngineConfig::default();
        assert_eq!(config.event_buffer_size, 100_000);
        assert_eq!(config.fetch_parallelism, 3);
        assert_eq!(config.reorg_scan_depth, 100);
        assert_eq!(config.max_errors, 3);
        assert!(config.decode_parallelism >= 1);
    }

    #[test]
    fn round_trips_through_json() {
        let config = EngineConfig {
            start_block: 12_529_458,
            ..EngineConfig::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        let back: EngineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.start_block, 12_529_458);
        assert_eq!(back.event_buffer_size, config.event_buffer_size);
    }
}
