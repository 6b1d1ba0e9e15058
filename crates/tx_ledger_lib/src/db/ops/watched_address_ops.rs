use crate::db::model::*;
use sqlx::SqliteConnection;

/// Returns false when the address was already watched.
pub async fn insert_watched_address(
    conn: &mut SqliteConnection,
    watched_address: &WatchedAddressDao,
) -> Result<bool, sqlx::Error> {
    let res = sqlx::query(
        r"INSERT INTO watched_address (address, created_date) VALUES ($1, $2)
ON CONFLICT(address) DO NOTHING",
    )
    .bind(&watched_address.address)
    .bind(watched_address.created_date)
    .execute(conn)
    .await?;
    Ok(res.rows_affected() > 0)
}

pub async fn get_watched_addresses(
    conn: &mut SqliteConnection,
) -> Result<Vec<WatchedAddressDao>, sqlx::Error> {
    let rows = sqlx::query_as::<_, WatchedAddressDao>(
        r"SELECT * FROM watched_address ORDER BY created_date ASC",
    )
    .fetch_all(conn)
    .await?;
    Ok(rows)
}
