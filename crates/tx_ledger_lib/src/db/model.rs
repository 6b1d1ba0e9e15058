use crate::error::LedgerError;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

#[derive(Serialize, sqlx::FromRow, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TxDao {
    pub id: i64,
    pub tx_hash: String,
    pub from_addr: String,
    pub to_addr: Option<String>,
    pub nonce: i64,
    pub val: String,
    pub status: String,
    pub block_number: Option<i64>,
    pub block_hash: Option<String>,
    pub tx_index: Option<i64>,
    #[serde(skip_serializing)]
    pub signed_raw_data: Option<String>,
    pub created_date: DateTime<Utc>,
    pub unconfirmed_since: DateTime<Utc>,
    pub broadcast_date: Option<DateTime<Utc>>,
    pub broadcast_count: i64,
    pub error: Option<String>,
}

#[derive(Serialize, sqlx::FromRow, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChainBlockDao {
    pub block_number: i64,
    pub block_hash: String,
    pub parent_hash: String,
    pub checked_date: DateTime<Utc>,
}

#[derive(Serialize, sqlx::FromRow, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WatchedAddressDao {
    pub address: String,
    pub created_date: DateTime<Utc>,
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TxStatus {
    Unconfirmed,
    Confirmed,
    Error,
}

impl TxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TxStatus::Unconfirmed => "unconfirmed",
            TxStatus::Confirmed => "confirmed",
            TxStatus::Error => "error",
        }
    }
}

impl Display for TxStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TxStatus {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unconfirmed" => Ok(TxStatus::Unconfirmed),
            "confirmed" => Ok(TxStatus::Confirmed),
            "error" => Ok(TxStatus::Error),
            other => Err(LedgerError::InvalidFilter(format!(
                "unknown status: {other}"
            ))),
        }
    }
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TxDirection {
    In,
    Out,
}

impl FromStr for TxDirection {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in" => Ok(TxDirection::In),
            "out" => Ok(TxDirection::Out),
            other => Err(LedgerError::InvalidFilter(format!(
                "unknown direction: {other}"
            ))),
        }
    }
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TxOrder {
    #[default]
    NewestFirst,
    OldestFirst,
}

impl FromStr for TxOrder {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "desc" => Ok(TxOrder::NewestFirst),
            "asc" => Ok(TxOrder::OldestFirst),
            other => Err(LedgerError::InvalidFilter(format!("unknown order: {other}"))),
        }
    }
}
