use crate::error::OracleError;
use async_trait::async_trait;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use web3::transports::Http;
use web3::types::{Address, BlockId, BlockNumber, Bytes, H256, U256, U64};
use web3::Web3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OracleReceipt {
    pub tx_hash: H256,
    pub block_number: u64,
    pub block_hash: H256,
    pub transaction_index: u64,
    pub status: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OracleTransaction {
    pub hash: H256,
    pub from: Address,
    pub to: Option<Address>,
    pub nonce: U256,
    pub value: U256,
    pub transaction_index: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OracleBlock {
    pub number: u64,
    pub hash: H256,
    pub parent_hash: H256,
    pub transactions: Vec<OracleTransaction>,
}

/// Node answering the questions the ledger needs. Implementations must bound
/// every call in time.
#[async_trait]
pub trait ChainOracle: Send + Sync {
    async fn submit_raw(&self, raw: &[u8]) -> Result<H256, OracleError>;

    async fn get_receipt(&self, tx_hash: H256) -> Result<Option<OracleReceipt>, OracleError>;

    async fn get_block(&self, block_number: u64) -> Result<Option<OracleBlock>, OracleError>;

    async fn latest_block_number(&self) -> Result<u64, OracleError>;

    async fn get_block_hash(&self, block_number: u64) -> Result<Option<H256>, OracleError> {
        Ok(self.get_block(block_number).await?.map(|block| block.hash))
    }
}

fn map_web3_error(err: web3::Error) -> OracleError {
    match err {
        web3::Error::Rpc(rpc_err) => OracleError::Rpc(rpc_err.message),
        web3::Error::Transport(err) => OracleError::Connection(format!("{:?}", err)),
        web3::Error::Unreachable => OracleError::Connection("node unreachable".to_string()),
        web3::Error::Io(err) => OracleError::Connection(err.to_string()),
        other => OracleError::InvalidResponse(other.to_string()),
    }
}

/// JSON-RPC node over http, one of the configured endpoints picked per call.
#[derive(Clone, Debug)]
pub struct Web3Oracle {
    providers: Vec<Web3<Http>>,
    call_timeout: Duration,
}

impl Web3Oracle {
    pub fn new(providers: Vec<Web3<Http>>, call_timeout: Duration) -> Self {
        Self {
            providers,
            call_timeout,
        }
    }

    fn provider(&self) -> Result<&Web3<Http>, OracleError> {
        if self.providers.is_empty() {
            return Err(OracleError::Connection("no rpc endpoints configured".to_string()));
        }
        let mut rng = rand::thread_rng();
        Ok(&self.providers[rng.gen_range(0..self.providers.len())])
    }

    async fn bounded<T, F>(&self, call: F) -> Result<T, OracleError>
    where
        F: Future<Output = Result<T, web3::Error>>,
    {
        match tokio::time::timeout(self.call_timeout, call).await {
            Ok(res) => res.map_err(map_web3_error),
            Err(_elapsed) => Err(OracleError::Timeout(self.call_timeout.as_millis() as u64)),
        }
    }
}

#[async_trait]
impl ChainOracle for Web3Oracle {
    async fn submit_raw(&self, raw: &[u8]) -> Result<H256, OracleError> {
        let web3 = self.provider()?;
        self.bounded(web3.eth().send_raw_transaction(Bytes(raw.to_vec())))
            .await
    }

    async fn get_receipt(&self, tx_hash: H256) -> Result<Option<OracleReceipt>, OracleError> {
        let web3 = self.provider()?;
        let receipt = self
            .bounded(web3.eth().transaction_receipt(tx_hash))
            .await?;
        let receipt = match receipt {
            Some(receipt) => receipt,
            None => return Ok(None),
        };
        // receipts of pending transactions come without block data
        match (receipt.block_number, receipt.block_hash) {
            (Some(block_number), Some(block_hash)) => Ok(Some(OracleReceipt {
                tx_hash,
                block_number: block_number.as_u64(),
                block_hash,
                transaction_index: receipt.transaction_index.as_u64(),
                status: receipt.status.map(|s| s.as_u64()),
            })),
            _ => Ok(None),
        }
    }

    async fn get_block(&self, block_number: u64) -> Result<Option<OracleBlock>, OracleError> {
        let web3 = self.provider()?;
        let block = self
            .bounded(
                web3.eth()
                    .block_with_txs(BlockId::Number(BlockNumber::Number(U64::from(block_number)))),
            )
            .await?;
        let block = match block {
            Some(block) => block,
            None => return Ok(None),
        };
        let hash = block.hash.ok_or_else(|| {
            OracleError::InvalidResponse(format!("block {} without hash", block_number))
        })?;
        let mut transactions = Vec::with_capacity(block.transactions.len());
        for (idx, tx) in block.transactions.into_iter().enumerate() {
            let from = tx.from.ok_or_else(|| {
                OracleError::InvalidResponse(format!("transaction {:#x} without sender", tx.hash))
            })?;
            transactions.push(OracleTransaction {
                hash: tx.hash,
                from,
                to: tx.to,
                nonce: tx.nonce,
                value: tx.value,
                transaction_index: tx
                    .transaction_index
                    .map(|i| i.as_u64())
                    .unwrap_or(idx as u64),
            });
        }
        Ok(Some(OracleBlock {
            number: block_number,
            hash,
            parent_hash: block.parent_hash,
            transactions,
        }))
    }

    async fn latest_block_number(&self) -> Result<u64, OracleError> {
        let web3 = self.provider()?;
        Ok(self.bounded(web3.eth().block_number()).await?.as_u64())
    }

    async fn get_block_hash(&self, block_number: u64) -> Result<Option<H256>, OracleError> {
        let web3 = self.provider()?;
        let block = self
            .bounded(
                web3.eth()
                    .block(BlockId::Number(BlockNumber::Number(U64::from(block_number)))),
            )
            .await?;
        Ok(block.and_then(|b| b.hash))
    }
}
