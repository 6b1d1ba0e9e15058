use crate::config::Config;
use crate::error::TrackerError;
use crate::eth::{format_address, parse_address};
use crate::oracle::Web3Oracle;
use crate::{err_create, err_custom_create};
use serde::Serialize;
use std::time::Duration;
use web3::transports::Http;
use web3::Web3;

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainSetup {
    pub chain_id: u64,
    /// Built from the configured endpoint urls, which are never exposed
    /// since they often carry provider api keys.
    #[serde(skip)]
    pub providers: Vec<Web3<Http>>,
    pub currency_symbol: String,
    pub confirmation_blocks: u64,
    pub transaction_timeout: u64,
    pub reorg_window: u64,
    pub start_block: Option<u64>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackerSetup {
    pub chain_setup: ChainSetup,
    /// Lowercase `0x` addresses from config, the persisted watch list is
    /// merged in by the tracker.
    pub watched_addresses: Vec<String>,
    pub poll_interval: u64,
    pub rpc_timeout_ms: u64,
    pub max_blocks_per_cycle: u64,
    pub receipt_batch_size: usize,
    pub rebroadcast_interval: u64,
    pub bind_addr: String,
    pub port: u16,
}

impl TrackerSetup {
    pub fn new(config: &Config) -> Result<Self, TrackerError> {
        let mut providers = Vec::new();
        for endp in &config.chain.rpc_endpoints {
            let Ok(transport) = web3::transports::Http::new(endp) else {
                return Err(err_custom_create!("Failed to create transport for endpoint: {}", endp));
            };
            providers.push(Web3::new(transport));
        }
        if providers.is_empty() {
            return Err(err_custom_create!(
                "No rpc endpoints for chain id: {}",
                config.chain.chain_id
            ));
        }
        let mut watched_addresses = Vec::new();
        for addr in &config.watched_addresses {
            let addr = format_address(&parse_address(addr).map_err(|e| err_create!(e))?);
            if !watched_addresses.contains(&addr) {
                watched_addresses.push(addr);
            }
        }
        if config.tracker.receipt_batch_size == 0 {
            return Err(err_custom_create!("receipt-batch-size has to be positive"));
        }
        Ok(TrackerSetup {
            chain_setup: ChainSetup {
                chain_id: config.chain.chain_id,
                providers,
                currency_symbol: config
                    .chain
                    .currency_symbol
                    .clone()
                    .unwrap_or_else(|| "ETH".to_string()),
                confirmation_blocks: config.chain.confirmation_blocks,
                transaction_timeout: config.chain.transaction_timeout,
                reorg_window: config.chain.reorg_window,
                start_block: config.chain.start_block,
            },
            watched_addresses,
            poll_interval: config.tracker.poll_interval,
            rpc_timeout_ms: config.tracker.rpc_timeout_ms,
            max_blocks_per_cycle: config.tracker.max_blocks_per_cycle,
            receipt_batch_size: config.tracker.receipt_batch_size,
            rebroadcast_interval: config.tracker.rebroadcast_interval,
            bind_addr: config.server.bind_addr.clone(),
            port: config.server.port,
        })
    }

    pub fn create_oracle(&self) -> Web3Oracle {
        Web3Oracle::new(
            self.chain_setup.providers.clone(),
            Duration::from_millis(self.rpc_timeout_ms),
        )
    }
}

#[cfg(test)]
pub(crate) mod test_setup {
    use super::*;

    /// Setup without any endpoints, used together with the mock oracle.
    pub fn create_test_setup(watched_addresses: &[&str]) -> TrackerSetup {
        TrackerSetup {
            chain_setup: ChainSetup {
                chain_id: 1337,
                providers: vec![],
                currency_symbol: "ETH".to_string(),
                confirmation_blocks: 0,
                transaction_timeout: 600,
                reorg_window: 12,
                start_block: Some(1),
            },
            watched_addresses: watched_addresses.iter().map(|a| a.to_string()).collect(),
            poll_interval: 1,
            rpc_timeout_ms: 1000,
            max_blocks_per_cycle: 20,
            receipt_batch_size: 3,
            rebroadcast_interval: 0,
            bind_addr: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setup_from_config() {
        let config = Config::from_toml_bytes(
            br#"
watched-addresses = ["0x056DB290F8BA3250CA64A45D16284D04BC6F5FBF", "0x056db290f8ba3250ca64a45d16284d04bc6f5fbf"]

[chain]
chain-id = 1337
rpc-endpoints = ["http://127.0.0.1:8545"]
confirmation-blocks = 1
transaction-timeout = 60
"#,
        )
        .unwrap();
        let setup = TrackerSetup::new(&config).unwrap();
        assert_eq!(
            setup.watched_addresses,
            vec!["0x056db290f8ba3250ca64a45d16284d04bc6f5fbf".to_string()]
        );
        assert_eq!(setup.chain_setup.providers.len(), 1);
        assert_eq!(setup.chain_setup.currency_symbol, "ETH");
    }

    #[test]
    fn test_setup_serialization_hides_endpoints() {
        let config = Config::from_toml_bytes(
            br#"
[chain]
chain-id = 1337
rpc-endpoints = ["https://node.example.org/v3/0123456789abcdef"]
confirmation-blocks = 1
transaction-timeout = 60
"#,
        )
        .unwrap();
        let setup = TrackerSetup::new(&config).unwrap();
        let json = serde_json::to_value(&setup).unwrap();
        assert_eq!(json["chainSetup"]["chainId"], 1337);
        assert!(json["chainSetup"].get("rpcEndpoints").is_none());
        assert!(!json.to_string().contains("0123456789abcdef"));
    }

    #[test]
    fn test_setup_rejects_bad_watched_address() {
        let config = Config::from_toml_bytes(
            br#"
watched-addresses = ["abc"]

[chain]
chain-id = 1337
rpc-endpoints = ["http://127.0.0.1:8545"]
confirmation-blocks = 1
transaction-timeout = 60
"#,
        )
        .unwrap();
        let err = TrackerSetup::new(&config).unwrap_err();
        assert!(err.ledger_error().is_some());
    }
}
