use crate::chain_state::ChainState;
use crate::db::model::*;
use crate::db::ops::BlockRef;
use crate::error::{LedgerError, OracleError, TrackerError};
use crate::eth::{format_address, format_tx_hash, parse_tx_hash};
use crate::oracle::{ChainOracle, OracleBlock, OracleReceipt};
use crate::setup::TrackerSetup;
use crate::store::LedgerStore;
use crate::utils::u256_to_rust_dec;
use crate::{err_create, err_from};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use web3::types::U256;

/// Counters of a single poll cycle, exposed through the shared state.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CycleStats {
    pub checked: usize,
    pub confirmed: usize,
    pub replaced: usize,
    pub timed_out: usize,
    pub rebroadcast: usize,
    pub oracle_failures: usize,
    pub blocks_scanned: usize,
    pub discovered: usize,
    pub reverted: usize,
}

enum ReceiptCheck {
    NotFound,
    Found(OracleReceipt),
    Failed(OracleError),
}

async fn check_receipt(oracle: Arc<dyn ChainOracle>, tx_hash: String) -> ReceiptCheck {
    let tx_hash = match parse_tx_hash(&tx_hash) {
        Ok(tx_hash) => tx_hash,
        Err(err) => return ReceiptCheck::Failed(OracleError::InvalidResponse(err.to_string())),
    };
    match oracle.get_receipt(tx_hash).await {
        Ok(Some(receipt)) => ReceiptCheck::Found(receipt),
        Ok(None) => ReceiptCheck::NotFound,
        Err(err) => ReceiptCheck::Failed(err),
    }
}

/// One task per hash, at most `batch_size` in flight. Results keep the
/// order of `txs`.
async fn check_receipts(
    oracle: &Arc<dyn ChainOracle>,
    txs: &[TxDao],
    batch_size: usize,
) -> Vec<ReceiptCheck> {
    let mut results = Vec::with_capacity(txs.len());
    for batch in txs.chunks(batch_size.max(1)) {
        let handles: Vec<_> = batch
            .iter()
            .map(|tx| tokio::spawn(check_receipt(oracle.clone(), tx.tx_hash.clone())))
            .collect();
        for handle in handles {
            results.push(match handle.await {
                Ok(check) => check,
                Err(err) => ReceiptCheck::Failed(OracleError::InvalidResponse(format!(
                    "receipt task failed: {}",
                    err
                ))),
            });
        }
    }
    results
}

fn rebroadcast_due(tx: &TxDao, rebroadcast_interval: u64, now: DateTime<Utc>) -> bool {
    if rebroadcast_interval == 0 || tx.signed_raw_data.is_none() {
        return false;
    }
    match tx.broadcast_date {
        Some(broadcast_date) => (now - broadcast_date).num_seconds() >= rebroadcast_interval as i64,
        None => true,
    }
}

async fn rebroadcast_tx(
    store: &LedgerStore,
    oracle: &dyn ChainOracle,
    tx: &TxDao,
) -> Result<bool, TrackerError> {
    let raw = match &tx.signed_raw_data {
        Some(raw) => hex::decode(raw).map_err(err_from!())?,
        None => return Ok(false),
    };
    match oracle.submit_raw(&raw).await {
        Ok(_) => {
            store.record_broadcast(&tx.tx_hash).await?;
            log::info!(
                "Rebroadcast transaction {} (broadcast count {})",
                tx.tx_hash,
                tx.broadcast_count + 1
            );
            Ok(true)
        }
        Err(err) => {
            log::warn!("Rebroadcast of {} failed: {}", tx.tx_hash, err);
            Ok(false)
        }
    }
}

/// Walk every unconfirmed record: confirm the ones mined deep enough, time
/// out the ones never seen, rebroadcast relayed ones that went missing.
pub async fn process_unconfirmed(
    store: &LedgerStore,
    oracle: &Arc<dyn ChainOracle>,
    setup: &TrackerSetup,
    head: u64,
    stats: &mut CycleStats,
) -> Result<(), TrackerError> {
    let chain_setup = &setup.chain_setup;
    let txs = store.list_unconfirmed(None).await?;
    if txs.is_empty() {
        return Ok(());
    }
    log::debug!("Checking {} unconfirmed transactions", txs.len());
    let checks = check_receipts(oracle, &txs, setup.receipt_batch_size).await;
    let now = Utc::now();

    for (tx, check) in txs.iter().zip(checks) {
        stats.checked += 1;
        match check {
            ReceiptCheck::Failed(err) => {
                stats.oracle_failures += 1;
                if err.is_transient() {
                    log::warn!("Receipt check of {} failed, retrying later: {}", tx.tx_hash, err);
                } else {
                    log::error!("Receipt check of {} failed: {}", tx.tx_hash, err);
                }
            }
            ReceiptCheck::Found(receipt) => {
                if receipt.block_number + chain_setup.confirmation_blocks > head {
                    log::info!(
                        "Waiting for confirmations: tx: {}. Current block {}, expected at least: {}",
                        tx.tx_hash,
                        head,
                        receipt.block_number + chain_setup.confirmation_blocks
                    );
                    continue;
                }
                if receipt.status == Some(0) {
                    log::warn!("Transaction {} mined but execution failed", tx.tx_hash);
                }
                let block = BlockRef {
                    block_number: receipt.block_number as i64,
                    block_hash: format_tx_hash(&receipt.block_hash),
                    tx_index: Some(receipt.transaction_index as i64),
                };
                match store.confirm(tx, &block).await {
                    Ok(replaced) => {
                        log::info!(
                            "Transaction {} confirmed in block {}",
                            tx.tx_hash,
                            receipt.block_number
                        );
                        if replaced > 0 {
                            log::warn!(
                                "{} pending transactions of {} with nonce {} replaced by {}",
                                replaced,
                                tx.from_addr,
                                tx.nonce,
                                tx.tx_hash
                            );
                        }
                        stats.confirmed += 1;
                        stats.replaced += replaced as usize;
                    }
                    Err(err) if err.ledger_error().is_some() => {
                        log::warn!("Cannot confirm {}: {}", tx.tx_hash, err);
                    }
                    Err(err) => return Err(err),
                }
            }
            ReceiptCheck::NotFound => {
                let age = now - tx.unconfirmed_since;
                if age.num_seconds() >= chain_setup.transaction_timeout as i64 {
                    log::warn!("Transaction timeout for tx: {}", tx.tx_hash);
                    match store
                        .update_status(&tx.tx_hash, TxStatus::Error, None, Some("timeout"))
                        .await
                    {
                        Ok(()) => stats.timed_out += 1,
                        Err(err) if err.ledger_error().is_some() => {
                            log::warn!("Cannot time out {}: {}", tx.tx_hash, err);
                        }
                        Err(err) => return Err(err),
                    }
                } else if rebroadcast_due(tx, setup.rebroadcast_interval, now) {
                    if rebroadcast_tx(store, oracle.as_ref(), tx).await? {
                        stats.rebroadcast += 1;
                    }
                } else {
                    log::debug!("Receipt not found: {}", tx.tx_hash);
                }
            }
        }
    }
    Ok(())
}

fn touches_watched(from: &str, to: Option<&str>, watched: &[String]) -> bool {
    watched.iter().any(|w| w == from || Some(w.as_str()) == to)
}

async fn discover_in_block(
    store: &LedgerStore,
    block: &OracleBlock,
    watched: &[String],
    currency_symbol: &str,
) -> Result<usize, TrackerError> {
    let mut discovered = 0;
    for tx in &block.transactions {
        let from_addr = format_address(&tx.from);
        let to_addr = tx.to.as_ref().map(format_address);
        if !touches_watched(&from_addr, to_addr.as_deref(), watched) {
            continue;
        }
        if tx.nonce > U256::from(i64::MAX as u64) {
            log::warn!("Skipping transaction {:#x} with nonce {}", tx.hash, tx.nonce);
            continue;
        }
        let now = Utc::now();
        let record = TxDao {
            id: 0,
            tx_hash: format_tx_hash(&tx.hash),
            from_addr,
            to_addr,
            nonce: tx.nonce.as_u64() as i64,
            val: tx.value.to_string(),
            status: TxStatus::Confirmed.to_string(),
            block_number: Some(block.number as i64),
            block_hash: Some(format_tx_hash(&block.hash)),
            tx_index: Some(tx.transaction_index as i64),
            signed_raw_data: None,
            created_date: now,
            unconfirmed_since: now,
            broadcast_date: None,
            broadcast_count: 0,
            error: None,
        };
        match store.insert(&record).await {
            Ok(inserted) => {
                log::info!(
                    "Discovered transaction {} in block {}: {} {}",
                    inserted.tx_hash,
                    block.number,
                    u256_to_rust_dec(tx.value, None)
                        .map(|v| v.to_string())
                        .unwrap_or_else(|_| tx.value.to_string()),
                    currency_symbol
                );
                store
                    .mark_replaced(&inserted.from_addr, inserted.nonce, &inserted.tx_hash)
                    .await?;
                discovered += 1;
            }
            Err(err) if matches!(err.ledger_error(), Some(LedgerError::DuplicateHash(_))) => {
                log::debug!("Transaction {} already in ledger", record.tx_hash);
            }
            Err(err) => return Err(err),
        }
    }
    Ok(discovered)
}

/// Scan new blocks for transactions touching watched addresses.
pub async fn discover_blocks(
    store: &LedgerStore,
    oracle: &dyn ChainOracle,
    setup: &TrackerSetup,
    chain_state: &mut ChainState,
    stats: &mut CycleStats,
) -> Result<(), TrackerError> {
    let range = match chain_state.blocks_to_scan(
        setup.max_blocks_per_cycle,
        setup.chain_setup.confirmation_blocks,
    ) {
        Some(range) => range,
        None => return Ok(()),
    };
    let mut watched = setup.watched_addresses.clone();
    for addr in store.watched_addresses().await? {
        if !watched.contains(&addr) {
            watched.push(addr);
        }
    }
    log::debug!("Scanning blocks {:?} for {} watched addresses", range, watched.len());

    for block_number in range {
        let block = match oracle
            .get_block(block_number)
            .await
            .map_err(|e| err_create!(e))?
        {
            Some(block) => block,
            None => {
                log::debug!("Block {} not available yet", block_number);
                break;
            }
        };
        stats.discovered += discover_in_block(
            store,
            &block,
            &watched,
            &setup.chain_setup.currency_symbol,
        )
        .await?;
        store
            .save_chain_block(&ChainBlockDao {
                block_number: block.number as i64,
                block_hash: format_tx_hash(&block.hash),
                parent_hash: format_tx_hash(&block.parent_hash),
                checked_date: Utc::now(),
            })
            .await?;
        chain_state.mark_scanned(block_number);
        stats.blocks_scanned += 1;
    }
    Ok(())
}

/// Compare every block the ledger relies on inside the reorg window with the
/// canonical chain. Records from the first diverging height up go back to
/// `unconfirmed` and discovery restarts there. An oracle failure only skips
/// the check for this cycle.
pub async fn check_reorgs(
    store: &LedgerStore,
    oracle: &dyn ChainOracle,
    setup: &TrackerSetup,
    chain_state: &mut ChainState,
    stats: &mut CycleStats,
) -> Result<(), TrackerError> {
    let head = match chain_state.latest_block {
        Some(head) => head,
        None => return Ok(()),
    };
    let min_block = head.saturating_sub(setup.chain_setup.reorg_window);
    let known = store.blocks_since(min_block as i64).await?;

    let mut fork_point = None;
    for (block_number, block_hash) in &known {
        let canonical = match oracle.get_block_hash(*block_number as u64).await {
            Ok(canonical) => canonical.map(|h| format_tx_hash(&h)),
            Err(err) => {
                // unverified blocks are checked again next cycle
                stats.oracle_failures += 1;
                if err.is_transient() {
                    log::warn!("Reorg check at block {} failed: {}", block_number, err);
                } else {
                    log::error!("Reorg check at block {} failed: {}", block_number, err);
                }
                return Ok(());
            }
        };
        if canonical.as_deref() != Some(block_hash.as_str()) {
            log::warn!(
                "Reorg detected at block {}: stored {}, canonical {:?}",
                block_number,
                block_hash,
                canonical
            );
            fork_point = Some(*block_number);
            break;
        }
    }
    let fork_point = match fork_point {
        Some(fork_point) => fork_point,
        None => return Ok(()),
    };

    for (block_number, block_hash) in known.iter().filter(|(n, _)| *n >= fork_point) {
        let reverted = store.revert_block(block_hash).await?;
        if reverted > 0 {
            log::warn!(
                "Reverted {} transactions of orphaned block {} ({})",
                reverted,
                block_number,
                block_hash
            );
        }
        stats.reverted += reverted as usize;
    }
    store.forget_chain_blocks_from(fork_point).await?;
    chain_state.rewind_to(fork_point as u64);
    Ok(())
}

/// Single poll cycle. Any error aborts only this cycle, the state already
/// written stays consistent and the next cycle picks up from there.
pub async fn run_tracker_cycle(
    store: &LedgerStore,
    oracle: &Arc<dyn ChainOracle>,
    setup: &TrackerSetup,
    chain_state: &mut ChainState,
) -> Result<CycleStats, TrackerError> {
    let mut stats = CycleStats::default();
    let head = chain_state
        .refresh(oracle.as_ref())
        .await
        .map_err(|e| e.with_msg("Refreshing chain head"))?;
    check_reorgs(store, oracle.as_ref(), setup, chain_state, &mut stats)
        .await
        .map_err(|e| e.with_msg("Checking reorgs"))?;
    process_unconfirmed(store, oracle, setup, head, &mut stats)
        .await
        .map_err(|e| e.with_msg("Processing unconfirmed transactions"))?;
    discover_blocks(store, oracle.as_ref(), setup, chain_state, &mut stats)
        .await
        .map_err(|e| e.with_msg("Scanning blocks"))?;
    Ok(stats)
}
