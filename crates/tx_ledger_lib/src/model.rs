use crate::db::model::TxDao;
use crate::err_from;
use crate::error::TrackerError;
use crate::utils::{dec_str_to_u256, u256_to_hex, u64_to_hex};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Wire form of a ledger record: nonce and value as `0x` hex strings.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TransactionInfo {
    pub hash: String,
    pub from: String,
    pub to: Option<String>,
    pub nonce: String,
    pub value: String,
    pub status: String,
    pub block_number: Option<i64>,
    pub block_hash: Option<String>,
    pub created: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TransactionInfo {
    pub fn from_dao(tx: &TxDao) -> Result<Self, TrackerError> {
        Ok(TransactionInfo {
            hash: tx.tx_hash.clone(),
            from: tx.from_addr.clone(),
            to: tx.to_addr.clone(),
            nonce: u64_to_hex(tx.nonce as u64),
            value: u256_to_hex(dec_str_to_u256(&tx.val).map_err(err_from!())?),
            status: tx.status.clone(),
            block_number: tx.block_number,
            block_hash: tx.block_hash.clone(),
            created: tx.created_date,
            error: tx.error.clone(),
        })
    }
}
