use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::chain_state::ChainState;
use crate::err_create;
use crate::error::{LedgerError, OracleError, TrackerError};
use crate::eth::format_tx_hash;
use crate::oracle::ChainOracle;
use crate::runtime::SharedState;
use crate::setup::TrackerSetup;
use crate::store::LedgerStore;
use crate::tracker::run_tracker_cycle;
use crate::transaction::{create_submitted_tx, decode_signed_transaction, validate_transaction};
use crate::utils::{decode_prefixed_hex, u256_to_rust_dec};

/// Decode, validate and relay a signed transaction, then record it as
/// `unconfirmed`. Returns without waiting for the transaction to be mined.
pub async fn submit_transaction(
    store: &LedgerStore,
    oracle: &dyn ChainOracle,
    chain_id: u64,
    raw: &[u8],
) -> Result<String, TrackerError> {
    let decoded = decode_signed_transaction(raw).map_err(|e| err_create!(e))?;
    validate_transaction(&decoded, chain_id).map_err(|e| err_create!(e))?;
    let tx_hash = format_tx_hash(&decoded.tx_hash);

    if let Some(existing) = store.get(&tx_hash).await? {
        log::warn!(
            "Transaction {} already in ledger with status {}, not relaying again",
            tx_hash,
            existing.status
        );
        return Ok(tx_hash);
    }

    log::info!(
        "Relaying transaction {} from {:#x} nonce {} value {}",
        tx_hash,
        decoded.from,
        decoded.nonce,
        u256_to_rust_dec(decoded.value, None)
            .map(|v| v.to_string())
            .unwrap_or_else(|_| decoded.value.to_string())
    );
    match oracle.submit_raw(raw).await {
        Ok(node_hash) => {
            if node_hash != decoded.tx_hash {
                log::warn!("Node reported hash {:#x} for {}", node_hash, tx_hash);
            }
        }
        Err(OracleError::Rpc(reason)) => {
            log::warn!("Transaction {} rejected by node: {}", tx_hash, reason);
            return Err(err_create!(LedgerError::RelayRejected(reason)));
        }
        Err(err) => {
            log::warn!("Relaying {} failed: {}", tx_hash, err);
            return Err(err_create!(err));
        }
    }

    match store.insert(&create_submitted_tx(&decoded, raw)).await {
        Ok(tx) => log::info!("Transaction {} added to ledger (id {})", tx.tx_hash, tx.id),
        Err(err) if matches!(err.ledger_error(), Some(LedgerError::DuplicateHash(_))) => {
            log::warn!("Transaction {} recorded concurrently", tx_hash);
        }
        Err(err) => return Err(err),
    }
    Ok(tx_hash)
}

/// Same as `submit_transaction` for `0x` prefixed hex payloads.
pub async fn submit_transaction_hex(
    store: &LedgerStore,
    oracle: &dyn ChainOracle,
    chain_id: u64,
    raw_hex: &str,
) -> Result<String, TrackerError> {
    let raw = decode_prefixed_hex(raw_hex)
        .map_err(|e| err_create!(LedgerError::MalformedTransaction(e.to_string())))?;
    submit_transaction(store, oracle, chain_id, &raw).await
}

pub async fn service_loop(
    shared_state: Arc<Mutex<SharedState>>,
    store: LedgerStore,
    oracle: Arc<dyn ChainOracle>,
    setup: TrackerSetup,
) {
    let wait_duration = Duration::from_secs(setup.poll_interval);
    let mut chain_state = loop {
        match ChainState::init(&store, oracle.as_ref(), setup.chain_setup.start_block).await {
            Ok(chain_state) => break chain_state,
            Err(err) => {
                log::error!("Cannot initialize chain state: {}", err);
                shared_state.lock().await.last_error = Some(err.to_string());
                tokio::time::sleep(wait_duration).await;
            }
        }
    };

    loop {
        shared_state.lock().await.idling = false;
        let res = run_tracker_cycle(&store, &oracle, &setup, &mut chain_state).await;
        {
            let mut shared_state = shared_state.lock().await;
            shared_state.cycles += 1;
            shared_state.chain_state = Some(chain_state.clone());
            shared_state.last_cycle_date = Some(chrono::Utc::now());
            match res {
                Ok(stats) => {
                    log::debug!("Tracker cycle finished: {:?}", stats);
                    shared_state.last_cycle = Some(stats);
                    shared_state.last_error = None;
                }
                Err(err) => {
                    log::error!("Tracker cycle failed: {}", err);
                    shared_state.last_error = Some(err.to_string());
                }
            }
            shared_state.idling = true;
        }
        tokio::time::sleep(wait_duration).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_sqlite_connection;
    use crate::db::model::TxStatus;
    use crate::db::ops::test_data::*;
    use crate::eth::{get_eth_addr_from_secret, parse_address};
    use crate::oracle::mock::MockOracle;
    use crate::query::{list_transactions, AddressQuery, AddressQueryParams};
    use crate::setup::test_setup::create_test_setup;
    use crate::transaction::test_signing::{sign_eip1559_transfer, sign_legacy_transfer};
    use secp256k1::SecretKey;
    use std::str::FromStr;
    use web3::types::U256;

    const CHAIN_ID: u64 = 1337;

    fn faucet_key() -> SecretKey {
        SecretKey::from_str("0000000000000000000000000000000000000000000000000000000000000001")
            .unwrap()
    }

    // controls TEST_ADDRESS
    fn test_key() -> SecretKey {
        SecretKey::from_str("e8f32e723decf4051aefac8e2c93c9c5b214313817cdb01a1494b917c8436b35")
            .unwrap()
    }

    async fn test_store() -> LedgerStore {
        LedgerStore::new(create_sqlite_connection(None, true).await.unwrap())
    }

    #[tokio::test]
    async fn test_address_history_after_relay() {
        let store = test_store().await;
        let oracle = MockOracle::new(1);
        let test_address = parse_address(TEST_ADDRESS).unwrap();
        assert_eq!(get_eth_addr_from_secret(&test_key()), test_address);

        for nonce in 0..5u64 {
            let value = U256::from(nonce + 1).pow(U256::from(16));
            let raw = sign_legacy_transfer(&faucet_key(), nonce, test_address, value, CHAIN_ID);
            submit_transaction(&store, &oracle, CHAIN_ID, &raw).await.unwrap();
        }
        let raw = sign_eip1559_transfer(
            &test_key(),
            0,
            parse_address(TEST_ADDRESS_2).unwrap(),
            U256::exp10(15),
            CHAIN_ID,
            U256::from(2_000_000_000u64),
        );
        submit_transaction(&store, &oracle, CHAIN_ID, &raw).await.unwrap();

        let query = AddressQuery::parse(TEST_ADDRESS, &AddressQueryParams::default()).unwrap();
        let txs = list_transactions(&store, &query).await.unwrap();
        assert_eq!(txs.len(), 6);
        assert!(txs.iter().all(|tx| tx.status == "unconfirmed"));
        assert_eq!(txs[0].from, TEST_ADDRESS);
        assert_eq!(oracle.submitted_count(), 6);
    }

    #[tokio::test]
    async fn test_submit_failures_create_no_record() {
        let store = test_store().await;
        let oracle = MockOracle::new(1);
        let test_address = parse_address(TEST_ADDRESS).unwrap();
        let raw = sign_legacy_transfer(&faucet_key(), 0, test_address, U256::one(), CHAIN_ID);

        oracle.reject_next_submissions(Some("nonce too low"));
        let err = submit_transaction(&store, &oracle, CHAIN_ID, &raw).await.unwrap_err();
        assert_eq!(
            err.ledger_error(),
            Some(&LedgerError::RelayRejected("nonce too low".to_string()))
        );
        oracle.reject_next_submissions(None);

        oracle.set_offline(true);
        let err = submit_transaction(&store, &oracle, CHAIN_ID, &raw).await.unwrap_err();
        assert!(err.oracle_error().unwrap().is_transient());
        oracle.set_offline(false);

        let err = submit_transaction(&store, &oracle, 5, &raw).await.unwrap_err();
        assert!(matches!(
            err.ledger_error(),
            Some(LedgerError::MalformedTransaction(_))
        ));
        let err = submit_transaction_hex(&store, &oracle, CHAIN_ID, "0xzz").await.unwrap_err();
        assert!(matches!(
            err.ledger_error(),
            Some(LedgerError::MalformedTransaction(_))
        ));

        let query = AddressQuery::parse(TEST_ADDRESS, &AddressQueryParams::default()).unwrap();
        assert!(list_transactions(&store, &query).await.unwrap().is_empty());
        assert_eq!(oracle.submitted_count(), 0);
    }

    #[tokio::test]
    async fn test_resubmission_returns_existing_hash() {
        let store = test_store().await;
        let oracle = MockOracle::new(1);
        let raw = sign_legacy_transfer(
            &faucet_key(),
            0,
            parse_address(TEST_ADDRESS).unwrap(),
            U256::one(),
            CHAIN_ID,
        );
        let raw_hex = format!("0x{}", hex::encode(&raw));
        let first = submit_transaction_hex(&store, &oracle, CHAIN_ID, &raw_hex).await.unwrap();
        let second = submit_transaction_hex(&store, &oracle, CHAIN_ID, &raw_hex).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(oracle.submitted_count(), 1);
        let stored = store.get(&first).await.unwrap().unwrap();
        assert_eq!(stored.status, TxStatus::Unconfirmed.as_str());
        assert_eq!(stored.block_number, None);
        assert_eq!(stored.signed_raw_data, Some(hex::encode(&raw)));
    }

    #[tokio::test]
    async fn test_service_loop_confirms_relayed() {
        let store = test_store().await;
        let mock = Arc::new(MockOracle::new(1));
        let oracle: Arc<dyn ChainOracle> = mock.clone();
        let setup = create_test_setup(&[]);
        let raw = sign_legacy_transfer(
            &faucet_key(),
            0,
            parse_address(TEST_ADDRESS).unwrap(),
            U256::one(),
            CHAIN_ID,
        );
        let tx_hash = submit_transaction(&store, oracle.as_ref(), CHAIN_ID, &raw)
            .await
            .unwrap();
        mock.mine_mempool(2);
        assert!(mock.mempool().is_empty());

        let shared_state = Arc::new(Mutex::new(SharedState::default()));
        let handle = tokio::spawn(service_loop(
            shared_state.clone(),
            store.clone(),
            oracle.clone(),
            setup,
        ));
        tokio::time::timeout(Duration::from_secs(10), async {
            while shared_state.lock().await.cycles == 0 {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .unwrap();
        handle.abort();

        let state = shared_state.lock().await.clone();
        assert_eq!(state.last_error, None);
        assert_eq!(state.chain_state.unwrap().latest_block, Some(2));
        assert_eq!(state.last_cycle.unwrap().confirmed, 1);
        let stored = store.get(&tx_hash).await.unwrap().unwrap();
        assert_eq!(stored.status, "confirmed");
        assert_eq!(stored.block_number, Some(2));
    }
}
