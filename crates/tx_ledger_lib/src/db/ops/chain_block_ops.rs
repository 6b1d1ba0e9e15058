use crate::db::model::*;
use sqlx::SqliteConnection;

pub async fn insert_chain_block(
    conn: &mut SqliteConnection,
    chain_block: &ChainBlockDao,
) -> Result<ChainBlockDao, sqlx::Error> {
    let res = sqlx::query_as::<_, ChainBlockDao>(
        r"INSERT OR REPLACE INTO chain_block
(block_number, block_hash, parent_hash, checked_date)
VALUES ($1, $2, $3, $4) RETURNING *;
",
    )
    .bind(chain_block.block_number)
    .bind(&chain_block.block_hash)
    .bind(&chain_block.parent_hash)
    .bind(chain_block.checked_date)
    .fetch_one(conn)
    .await?;
    Ok(res)
}

pub async fn get_last_chain_block(
    conn: &mut SqliteConnection,
) -> Result<Option<ChainBlockDao>, sqlx::Error> {
    let row = sqlx::query_as::<_, ChainBlockDao>(
        r"SELECT * FROM chain_block ORDER BY block_number DESC LIMIT 1",
    )
    .fetch_optional(conn)
    .await?;
    Ok(row)
}

pub async fn get_chain_blocks_since(
    conn: &mut SqliteConnection,
    min_block_number: i64,
) -> Result<Vec<ChainBlockDao>, sqlx::Error> {
    let rows = sqlx::query_as::<_, ChainBlockDao>(
        r"SELECT * FROM chain_block WHERE block_number >= $1 ORDER BY block_number ASC",
    )
    .bind(min_block_number)
    .fetch_all(conn)
    .await?;
    Ok(rows)
}

/// Forget scanned blocks from given height up, used when rewinding after a reorg.
pub async fn delete_chain_blocks_from(
    conn: &mut SqliteConnection,
    block_number: i64,
) -> Result<u64, sqlx::Error> {
    let res = sqlx::query(r"DELETE FROM chain_block WHERE block_number >= $1")
        .bind(block_number)
        .execute(conn)
        .await?;
    Ok(res.rows_affected())
}
