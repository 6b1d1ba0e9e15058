use crate::db::model::{TxDirection, TxOrder, TxStatus};
use crate::db::ops::AddressTxFilter;
use crate::err_create;
use crate::error::{LedgerError, TrackerError};
use crate::eth::{format_address, format_tx_hash, parse_address, parse_tx_hash};
use crate::model::TransactionInfo;
use crate::store::LedgerStore;
use serde::Deserialize;
use std::str::FromStr;

pub const DEFAULT_PAGE_LIMIT: u64 = 25;
pub const MAX_PAGE_LIMIT: u64 = 100;

/// Raw query string parameters, validated by `AddressQuery::parse`.
#[derive(Deserialize, Debug, Clone, Default)]
pub struct AddressQueryParams {
    pub status: Option<String>,
    pub direction: Option<String>,
    pub offset: Option<String>,
    pub limit: Option<String>,
    pub order: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressQuery {
    /// Lowercase `0x` form.
    pub address: String,
    pub filter: AddressTxFilter,
    pub order: TxOrder,
    pub offset: u64,
    pub limit: u64,
}

/// Plain digit strings too big for `u64` saturate, they are still valid
/// non-negative integers.
fn parse_pagination(name: &str, value: Option<&str>) -> Result<Option<u64>, LedgerError> {
    value
        .map(|v| match u64::from_str(v) {
            Ok(val) => Ok(val),
            Err(_) if !v.is_empty() && v.bytes().all(|b| b.is_ascii_digit()) => Ok(u64::MAX),
            Err(_) => Err(LedgerError::InvalidPagination(format!(
                "{name} has to be a non-negative integer: {v}"
            ))),
        })
        .transpose()
}

impl AddressQuery {
    /// Address is checked first so that a bad address is reported as such
    /// regardless of the other parameters.
    pub fn parse(address: &str, params: &AddressQueryParams) -> Result<Self, LedgerError> {
        let address = format_address(&parse_address(address)?);
        let status = params
            .status
            .as_deref()
            .map(TxStatus::from_str)
            .transpose()?;
        let direction = params
            .direction
            .as_deref()
            .map(TxDirection::from_str)
            .transpose()?;
        let order = params
            .order
            .as_deref()
            .map(TxOrder::from_str)
            .transpose()?
            .unwrap_or_default();
        let offset = parse_pagination("offset", params.offset.as_deref())?.unwrap_or(0);
        let limit = parse_pagination("limit", params.limit.as_deref())?
            .unwrap_or(DEFAULT_PAGE_LIMIT)
            .min(MAX_PAGE_LIMIT);
        Ok(AddressQuery {
            address,
            filter: AddressTxFilter { status, direction },
            order,
            offset,
            limit,
        })
    }
}

pub async fn list_transactions(
    store: &LedgerStore,
    query: &AddressQuery,
) -> Result<Vec<TransactionInfo>, TrackerError> {
    let txs = store
        .query(
            &query.address,
            &query.filter,
            query.order,
            query.offset,
            query.limit,
        )
        .await?;
    txs.iter().map(TransactionInfo::from_dao).collect()
}

/// Size of the whole filtered history, ignoring offset and limit.
pub async fn count_transactions(
    store: &LedgerStore,
    query: &AddressQuery,
) -> Result<usize, TrackerError> {
    store.count(&query.address, &query.filter).await
}

pub async fn get_transaction(
    store: &LedgerStore,
    tx_hash: &str,
) -> Result<TransactionInfo, TrackerError> {
    let tx_hash = format_tx_hash(&parse_tx_hash(tx_hash).map_err(|e| err_create!(e))?);
    match store.get(&tx_hash).await? {
        Some(tx) => TransactionInfo::from_dao(&tx),
        None => Err(err_create!(LedgerError::NotFound(tx_hash))),
    }
}
