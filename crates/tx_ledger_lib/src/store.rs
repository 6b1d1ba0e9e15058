use crate::db::model::*;
use crate::db::ops::*;
use crate::error::{LedgerError, TrackerError};
use crate::{err_create, err_from};
use chrono::Utc;
use sqlx::{Connection, SqlitePool};

/// Ledger contract on top of the sqlite pool. Cheap to clone, every call
/// checks out its own connection so readers and the tracker never share one.
#[derive(Clone, Debug)]
pub struct LedgerStore {
    pool: SqlitePool,
}

impl LedgerStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, tx: &TxDao) -> Result<TxDao, TrackerError> {
        let mut conn = self.pool.acquire().await.map_err(err_from!())?;
        insert_tx(&mut conn, tx)
            .await
            .map_err(err_from!())?
            .ok_or_else(|| err_create!(LedgerError::DuplicateHash(tx.tx_hash.clone())))
    }

    pub async fn get(&self, tx_hash: &str) -> Result<Option<TxDao>, TrackerError> {
        let mut conn = self.pool.acquire().await.map_err(err_from!())?;
        get_tx_by_hash(&mut conn, tx_hash).await.map_err(err_from!())
    }

    /// Atomic and idempotent, see `update_tx_status`. On zero matched rows
    /// the record is read back only to tell `NotFound` from a rejected
    /// transition.
    pub async fn update_status(
        &self,
        tx_hash: &str,
        status: TxStatus,
        block: Option<&BlockRef>,
        error: Option<&str>,
    ) -> Result<(), TrackerError> {
        let mut conn = self.pool.acquire().await.map_err(err_from!())?;
        let matched = update_tx_status(&mut conn, tx_hash, status, block, error)
            .await
            .map_err(err_from!())?;
        if matched > 0 {
            return Ok(());
        }
        match get_tx_by_hash(&mut conn, tx_hash)
            .await
            .map_err(err_from!())?
        {
            None => Err(err_create!(LedgerError::NotFound(tx_hash.to_string()))),
            Some(current) => Err(err_create!(LedgerError::InvalidTransition {
                tx_hash: tx_hash.to_string(),
                from: current.status,
                to: status.to_string(),
            })),
        }
    }

    /// Confirm a record and fail every competing record of the same sender
    /// nonce, in one sqlite transaction.
    pub async fn confirm(
        &self,
        tx: &TxDao,
        block: &BlockRef,
    ) -> Result<u64, TrackerError> {
        let mut conn = self.pool.acquire().await.map_err(err_from!())?;
        let mut db_transaction = conn.begin().await.map_err(err_from!())?;
        let matched = update_tx_status(
            &mut db_transaction,
            &tx.tx_hash,
            TxStatus::Confirmed,
            Some(block),
            None,
        )
        .await
        .map_err(err_from!())?;
        if matched == 0 {
            return Err(err_create!(LedgerError::InvalidTransition {
                tx_hash: tx.tx_hash.clone(),
                from: tx.status.clone(),
                to: TxStatus::Confirmed.to_string(),
            }));
        }
        let replaced = mark_replaced_txs(&mut db_transaction, &tx.from_addr, tx.nonce, &tx.tx_hash)
            .await
            .map_err(err_from!())?;
        db_transaction.commit().await.map_err(err_from!())?;
        Ok(replaced)
    }

    pub async fn mark_replaced(
        &self,
        from_addr: &str,
        nonce: i64,
        mined_tx_hash: &str,
    ) -> Result<u64, TrackerError> {
        let mut conn = self.pool.acquire().await.map_err(err_from!())?;
        mark_replaced_txs(&mut conn, from_addr, nonce, mined_tx_hash)
            .await
            .map_err(err_from!())
    }

    pub async fn revert_block(&self, block_hash: &str) -> Result<u64, TrackerError> {
        let mut conn = self.pool.acquire().await.map_err(err_from!())?;
        revert_block_txs(&mut conn, block_hash, Utc::now())
            .await
            .map_err(err_from!())
    }

    pub async fn record_broadcast(&self, tx_hash: &str) -> Result<(), TrackerError> {
        let mut conn = self.pool.acquire().await.map_err(err_from!())?;
        let matched = record_tx_broadcast(&mut conn, tx_hash, Utc::now())
            .await
            .map_err(err_from!())?;
        if matched == 0 {
            return Err(err_create!(LedgerError::NotFound(tx_hash.to_string())));
        }
        Ok(())
    }

    pub async fn list_unconfirmed(&self, limit: Option<i64>) -> Result<Vec<TxDao>, TrackerError> {
        let mut conn = self.pool.acquire().await.map_err(err_from!())?;
        get_unconfirmed_txs(&mut conn, limit)
            .await
            .map_err(err_from!())
    }

    pub async fn query(
        &self,
        address: &str,
        filter: &AddressTxFilter,
        order: TxOrder,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<TxDao>, TrackerError> {
        let mut conn = self.pool.acquire().await.map_err(err_from!())?;
        get_address_txs(&mut conn, address, filter, order, offset, limit)
            .await
            .map_err(err_from!())
    }

    pub async fn count(
        &self,
        address: &str,
        filter: &AddressTxFilter,
    ) -> Result<usize, TrackerError> {
        let mut conn = self.pool.acquire().await.map_err(err_from!())?;
        get_address_tx_count(&mut conn, address, filter)
            .await
            .map_err(err_from!())
    }

    /// Heights and hashes the ledger relies on: scanned blocks and blocks
    /// holding confirmed records.
    pub async fn blocks_since(&self, min_block_number: i64) -> Result<Vec<(i64, String)>, TrackerError> {
        let mut conn = self.pool.acquire().await.map_err(err_from!())?;
        let mut blocks = get_confirmed_blocks_since(&mut conn, min_block_number)
            .await
            .map_err(err_from!())?;
        let scanned = get_chain_blocks_since(&mut conn, min_block_number)
            .await
            .map_err(err_from!())?;
        blocks.extend(scanned.into_iter().map(|b| (b.block_number, b.block_hash)));
        blocks.sort();
        blocks.dedup();
        Ok(blocks)
    }

    pub async fn save_chain_block(&self, chain_block: &ChainBlockDao) -> Result<(), TrackerError> {
        let mut conn = self.pool.acquire().await.map_err(err_from!())?;
        insert_chain_block(&mut conn, chain_block)
            .await
            .map_err(err_from!())?;
        Ok(())
    }

    pub async fn last_chain_block(&self) -> Result<Option<ChainBlockDao>, TrackerError> {
        let mut conn = self.pool.acquire().await.map_err(err_from!())?;
        get_last_chain_block(&mut conn).await.map_err(err_from!())
    }

    pub async fn forget_chain_blocks_from(&self, block_number: i64) -> Result<u64, TrackerError> {
        let mut conn = self.pool.acquire().await.map_err(err_from!())?;
        delete_chain_blocks_from(&mut conn, block_number)
            .await
            .map_err(err_from!())
    }

    pub async fn add_watched_address(&self, address: &str) -> Result<bool, TrackerError> {
        let mut conn = self.pool.acquire().await.map_err(err_from!())?;
        insert_watched_address(
            &mut conn,
            &WatchedAddressDao {
                address: address.to_string(),
                created_date: Utc::now(),
            },
        )
        .await
        .map_err(err_from!())
    }

    pub async fn watched_addresses(&self) -> Result<Vec<String>, TrackerError> {
        let mut conn = self.pool.acquire().await.map_err(err_from!())?;
        Ok(get_watched_addresses(&mut conn)
            .await
            .map_err(err_from!())?
            .into_iter()
            .map(|w| w.address)
            .collect())
    }
}
