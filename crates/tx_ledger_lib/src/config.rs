use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::TrackerError;
use crate::{err_custom_create, err_from};

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    pub chain: Chain,
    #[serde(default)]
    pub tracker: Tracker,
    #[serde(default)]
    pub server: Server,
    #[serde(default)]
    pub watched_addresses: Vec<String>,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct Chain {
    pub chain_id: u64,
    pub rpc_endpoints: Vec<String>,
    pub currency_symbol: Option<String>,
    pub confirmation_blocks: u64,
    /// Seconds a transaction may stay unseen before it is marked as error.
    pub transaction_timeout: u64,
    #[serde(default = "default_reorg_window")]
    pub reorg_window: u64,
    /// First block scanned for watched addresses on an empty database,
    /// current head when not set.
    pub start_block: Option<u64>,
}

fn default_reorg_window() -> u64 {
    12
}

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct Tracker {
    pub poll_interval: u64,
    pub rpc_timeout_ms: u64,
    pub max_blocks_per_cycle: u64,
    pub receipt_batch_size: usize,
    /// Seconds between rebroadcasts of a relayed transaction still not seen,
    /// zero disables rebroadcasting.
    pub rebroadcast_interval: u64,
}

impl Default for Tracker {
    fn default() -> Self {
        Tracker {
            poll_interval: 10,
            rpc_timeout_ms: 5000,
            max_blocks_per_cycle: 20,
            receipt_batch_size: 10,
            rebroadcast_interval: 120,
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct Server {
    pub bind_addr: String,
    pub port: u16,
}

impl Default for Server {
    fn default() -> Self {
        Server {
            bind_addr: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, TrackerError> {
        Self::from_toml_bytes(&fs::read(path).map_err(err_from!())?)
    }

    pub fn from_toml_bytes(data: &[u8]) -> Result<Self, TrackerError> {
        match toml::from_slice(data) {
            Ok(config) => Ok(config),
            Err(e) => Err(err_custom_create!("Failed to parse toml {:?}", e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config() {
        let config = Config::from_toml_bytes(
            br#"
watched-addresses = ["0x056db290f8ba3250ca64a45d16284d04bc6f5fbf"]

[chain]
chain-id = 5
rpc-endpoints = ["http://127.0.0.1:8545"]
confirmation-blocks = 3
transaction-timeout = 600

[tracker]
poll-interval = 5
rpc-timeout-ms = 2000
max-blocks-per-cycle = 50
receipt-batch-size = 4
rebroadcast-interval = 0
"#,
        )
        .unwrap();
        assert_eq!(config.chain.chain_id, 5);
        assert_eq!(config.chain.reorg_window, 12);
        assert_eq!(config.chain.start_block, None);
        assert_eq!(config.tracker.receipt_batch_size, 4);
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.watched_addresses.len(), 1);
    }

    #[test]
    fn test_parse_config_missing_chain() {
        assert!(Config::from_toml_bytes(b"watched-addresses = []").is_err());
    }
}
