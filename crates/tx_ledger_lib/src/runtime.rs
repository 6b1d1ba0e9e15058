use crate::chain_state::ChainState;
use crate::config::Config;
use crate::db::create_sqlite_connection;
use crate::error::TrackerError;
use crate::oracle::ChainOracle;
use crate::service::service_loop;
use crate::setup::TrackerSetup;
use crate::store::LedgerStore;
use crate::tracker::CycleStats;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

#[derive(Serialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct SharedState {
    pub chain_state: Option<ChainState>,
    pub cycles: u64,
    pub last_cycle: Option<CycleStats>,
    pub last_cycle_date: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub idling: bool,
}

pub struct TrackerRuntime {
    pub runtime_handle: JoinHandle<()>,
    pub setup: TrackerSetup,
    pub shared_state: Arc<Mutex<SharedState>>,
    pub store: LedgerStore,
    pub oracle: Arc<dyn ChainOracle>,
}

/// `None` keeps the ledger in memory, useful only for trying things out.
pub async fn open_store(db_filename: Option<&str>) -> Result<LedgerStore, TrackerError> {
    match db_filename {
        Some(db_filename) => log::info!("connecting to sqlite file db: {}", db_filename),
        None => log::warn!("using in-memory db, ledger will be lost on exit"),
    }
    Ok(LedgerStore::new(
        create_sqlite_connection(db_filename, true).await?,
    ))
}

pub fn start_tracker(
    setup: TrackerSetup,
    store: LedgerStore,
    oracle: Arc<dyn ChainOracle>,
) -> TrackerRuntime {
    let shared_state = Arc::new(Mutex::new(SharedState::default()));
    let jh = tokio::spawn(service_loop(
        shared_state.clone(),
        store.clone(),
        oracle.clone(),
        setup.clone(),
    ));
    TrackerRuntime {
        runtime_handle: jh,
        setup,
        shared_state,
        store,
        oracle,
    }
}

pub async fn start_tracker_engine(
    config: &Config,
    db_filename: Option<&str>,
) -> Result<TrackerRuntime, TrackerError> {
    let setup = TrackerSetup::new(config)?;
    log::debug!(
        "Starting tracker engine: chain id {}, {} providers, {} watched addresses",
        setup.chain_setup.chain_id,
        setup.chain_setup.providers.len(),
        setup.watched_addresses.len()
    );
    let store = open_store(db_filename).await?;
    let oracle: Arc<dyn ChainOracle> = Arc::new(setup.create_oracle());
    Ok(start_tracker(setup, store, oracle))
}
