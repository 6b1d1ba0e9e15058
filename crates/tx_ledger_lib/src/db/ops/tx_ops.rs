use crate::db::model::*;
use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AddressTxFilter {
    pub status: Option<TxStatus>,
    pub direction: Option<TxDirection>,
}

/// Position of a transaction inside a block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockRef {
    pub block_number: i64,
    pub block_hash: String,
    pub tx_index: Option<i64>,
}

// records without a block first, then by block position, then ledger sequence
pub const TX_ORDER_NEWEST_FIRST: &str =
    "(block_number IS NULL) DESC, block_number DESC, tx_index DESC, id DESC";
pub const TX_ORDER_OLDEST_FIRST: &str =
    "(block_number IS NULL) ASC, block_number ASC, tx_index ASC, id ASC";

fn address_filter_sql(filter: &AddressTxFilter) -> String {
    let direction = match filter.direction {
        None => "(from_addr = $1 OR to_addr = $1)",
        Some(TxDirection::In) => "(to_addr = $1 AND from_addr != $1)",
        Some(TxDirection::Out) => "(from_addr = $1 AND (to_addr IS NULL OR to_addr != $1))",
    };
    match filter.status {
        Some(_) => format!("{} AND status = $2", direction),
        None => direction.to_string(),
    }
}

/// Returns `None` when a transaction with the same hash is already stored.
pub async fn insert_tx(
    conn: &mut SqliteConnection,
    tx: &TxDao,
) -> Result<Option<TxDao>, sqlx::Error> {
    let res = sqlx::query_as::<_, TxDao>(
        r"INSERT INTO tx
(tx_hash, from_addr, to_addr, nonce, val, status, block_number, block_hash, tx_index, signed_raw_data, created_date, unconfirmed_since, broadcast_date, broadcast_count, error)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
ON CONFLICT(tx_hash) DO NOTHING RETURNING *;
",
    )
    .bind(&tx.tx_hash)
    .bind(&tx.from_addr)
    .bind(&tx.to_addr)
    .bind(tx.nonce)
    .bind(&tx.val)
    .bind(&tx.status)
    .bind(tx.block_number)
    .bind(&tx.block_hash)
    .bind(tx.tx_index)
    .bind(&tx.signed_raw_data)
    .bind(tx.created_date)
    .bind(tx.unconfirmed_since)
    .bind(tx.broadcast_date)
    .bind(tx.broadcast_count)
    .bind(&tx.error)
    .fetch_optional(conn)
    .await?;
    Ok(res)
}

pub async fn get_tx_by_hash(
    conn: &mut SqliteConnection,
    tx_hash: &str,
) -> Result<Option<TxDao>, sqlx::Error> {
    let row = sqlx::query_as::<_, TxDao>(r"SELECT * FROM tx WHERE tx_hash = $1")
        .bind(tx_hash)
        .fetch_optional(conn)
        .await?;
    Ok(row)
}

/// Single statement status change guarded by the forward-only state machine.
/// Returns the number of matched rows, zero means either unknown hash or a
/// transition that is not allowed.
pub async fn update_tx_status(
    conn: &mut SqliteConnection,
    tx_hash: &str,
    status: TxStatus,
    block: Option<&BlockRef>,
    error: Option<&str>,
) -> Result<u64, sqlx::Error> {
    let res = sqlx::query(
        r"UPDATE tx SET
status = $2,
block_number = COALESCE($3, block_number),
block_hash = COALESCE($4, block_hash),
tx_index = COALESCE($5, tx_index),
error = COALESCE(error, $6)
WHERE tx_hash = $1 AND (status = 'unconfirmed' OR status = $2)
",
    )
    .bind(tx_hash)
    .bind(status.as_str())
    .bind(block.map(|b| b.block_number))
    .bind(block.map(|b| b.block_hash.clone()))
    .bind(block.and_then(|b| b.tx_index))
    .bind(error)
    .execute(conn)
    .await?;
    Ok(res.rows_affected())
}

/// Reorg handling: every confirmed record of an orphaned block goes back to
/// `unconfirmed`, keeping its hash.
pub async fn revert_block_txs(
    conn: &mut SqliteConnection,
    block_hash: &str,
    unconfirmed_since: DateTime<Utc>,
) -> Result<u64, sqlx::Error> {
    let res = sqlx::query(
        r"UPDATE tx SET
status = 'unconfirmed',
block_number = NULL,
block_hash = NULL,
tx_index = NULL,
unconfirmed_since = $2
WHERE block_hash = $1 AND status = 'confirmed'
",
    )
    .bind(block_hash)
    .bind(unconfirmed_since)
    .execute(conn)
    .await?;
    Ok(res.rows_affected())
}

/// Other pending transactions of the sender using an already mined nonce.
pub async fn mark_replaced_txs(
    conn: &mut SqliteConnection,
    from_addr: &str,
    nonce: i64,
    mined_tx_hash: &str,
) -> Result<u64, sqlx::Error> {
    let res = sqlx::query(
        r"UPDATE tx SET
status = 'error',
error = $4
WHERE from_addr = $1 AND nonce = $2 AND tx_hash != $3 AND status = 'unconfirmed'
",
    )
    .bind(from_addr)
    .bind(nonce)
    .bind(mined_tx_hash)
    .bind(format!("replaced by {}", mined_tx_hash))
    .execute(conn)
    .await?;
    Ok(res.rows_affected())
}

pub async fn record_tx_broadcast(
    conn: &mut SqliteConnection,
    tx_hash: &str,
    broadcast_date: DateTime<Utc>,
) -> Result<u64, sqlx::Error> {
    let res = sqlx::query(
        r"UPDATE tx SET broadcast_date = $2, broadcast_count = broadcast_count + 1 WHERE tx_hash = $1",
    )
    .bind(tx_hash)
    .bind(broadcast_date)
    .execute(conn)
    .await?;
    Ok(res.rows_affected())
}

pub async fn get_unconfirmed_txs(
    conn: &mut SqliteConnection,
    limit: Option<i64>,
) -> Result<Vec<TxDao>, sqlx::Error> {
    let limit = limit.unwrap_or(i64::MAX);
    let rows = sqlx::query_as::<_, TxDao>(
        r"SELECT * FROM tx WHERE status = 'unconfirmed' ORDER BY id ASC LIMIT $1",
    )
    .bind(limit)
    .fetch_all(conn)
    .await?;
    Ok(rows)
}

/// Distinct blocks holding confirmed records, from given height up.
pub async fn get_confirmed_blocks_since(
    conn: &mut SqliteConnection,
    min_block_number: i64,
) -> Result<Vec<(i64, String)>, sqlx::Error> {
    let rows = sqlx::query_as::<_, (i64, String)>(
        r"SELECT DISTINCT block_number, block_hash FROM tx
WHERE status = 'confirmed' AND block_number >= $1 AND block_hash IS NOT NULL
ORDER BY block_number ASC",
    )
    .bind(min_block_number)
    .fetch_all(conn)
    .await?;
    Ok(rows)
}

pub async fn get_address_txs(
    conn: &mut SqliteConnection,
    address: &str,
    filter: &AddressTxFilter,
    order: TxOrder,
    offset: u64,
    limit: u64,
) -> Result<Vec<TxDao>, sqlx::Error> {
    let order = match order {
        TxOrder::NewestFirst => TX_ORDER_NEWEST_FIRST,
        TxOrder::OldestFirst => TX_ORDER_OLDEST_FIRST,
    };
    let sql = format!(
        r"SELECT * FROM tx WHERE {} ORDER BY {} LIMIT {} OFFSET {}",
        address_filter_sql(filter),
        order,
        limit.min(i64::MAX as u64),
        offset.min(i64::MAX as u64)
    );
    let mut query = sqlx::query_as::<_, TxDao>(&sql).bind(address);
    if let Some(status) = filter.status {
        query = query.bind(status.as_str());
    }
    let rows = query.fetch_all(conn).await?;
    Ok(rows)
}

pub async fn get_address_tx_count(
    conn: &mut SqliteConnection,
    address: &str,
    filter: &AddressTxFilter,
) -> Result<usize, sqlx::Error> {
    let sql = format!(
        r"SELECT COUNT(*) FROM tx WHERE {}",
        address_filter_sql(filter)
    );
    let mut query = sqlx::query_scalar::<_, i64>(&sql).bind(address);
    if let Some(status) = filter.status {
        query = query.bind(status.as_str());
    }
    let count = query.fetch_one(conn).await?;
    Ok(count as usize)
}
