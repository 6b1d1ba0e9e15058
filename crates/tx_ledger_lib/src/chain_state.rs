use crate::err_create;
use crate::error::TrackerError;
use crate::oracle::ChainOracle;
use crate::store::LedgerStore;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::ops::RangeInclusive;

/// What the tracker knows about the chain. Owned by the runtime and handed
/// to every poll cycle.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainState {
    pub latest_block: Option<u64>,
    /// Next block to be scanned for watched addresses.
    pub next_block: u64,
    pub last_refresh: Option<DateTime<Utc>>,
}

impl ChainState {
    /// Resume after the last scanned block, otherwise start at the configured
    /// block, otherwise at the current head.
    pub async fn init(
        store: &LedgerStore,
        oracle: &dyn ChainOracle,
        start_block: Option<u64>,
    ) -> Result<Self, TrackerError> {
        let mut state = ChainState {
            latest_block: None,
            next_block: 0,
            last_refresh: None,
        };
        if let Some(last) = store.last_chain_block().await? {
            state.next_block = last.block_number as u64 + 1;
            log::info!("Resuming block scan at {}", state.next_block);
            return Ok(state);
        }
        state.next_block = match start_block {
            Some(start_block) => start_block,
            None => state.refresh(oracle).await?,
        };
        log::info!("Starting block scan at {}", state.next_block);
        Ok(state)
    }

    pub async fn refresh(&mut self, oracle: &dyn ChainOracle) -> Result<u64, TrackerError> {
        let latest = oracle
            .latest_block_number()
            .await
            .map_err(|e| err_create!(e))?;
        if let Some(prev) = self.latest_block {
            if latest < prev {
                log::warn!("Chain head moved back from {} to {}", prev, latest);
            }
        }
        self.latest_block = Some(latest);
        self.last_refresh = Some(Utc::now());
        Ok(latest)
    }

    /// Blocks deep enough to scan in this cycle, at most `max_blocks`.
    pub fn blocks_to_scan(
        &self,
        max_blocks: u64,
        confirmation_blocks: u64,
    ) -> Option<RangeInclusive<u64>> {
        let latest = self.latest_block?.checked_sub(confirmation_blocks)?;
        if self.next_block > latest || max_blocks == 0 {
            return None;
        }
        let last = latest.min(self.next_block + max_blocks - 1);
        Some(self.next_block..=last)
    }

    pub fn mark_scanned(&mut self, block_number: u64) {
        if block_number >= self.next_block {
            self.next_block = block_number + 1;
        }
    }

    pub fn rewind_to(&mut self, block_number: u64) {
        if block_number < self.next_block {
            log::warn!("Rewinding block scan from {} to {}", self.next_block, block_number);
            self.next_block = block_number;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_sqlite_connection;
    use crate::db::model::ChainBlockDao;
    use crate::oracle::mock::MockOracle;

    async fn test_store() -> LedgerStore {
        LedgerStore::new(create_sqlite_connection(None, true).await.unwrap())
    }

    #[tokio::test]
    async fn test_init_sources() {
        let store = test_store().await;
        let oracle = MockOracle::new(40);
        let state = ChainState::init(&store, &oracle, None).await.unwrap();
        assert_eq!(state.next_block, 40);
        assert_eq!(state.latest_block, Some(40));

        let state = ChainState::init(&store, &oracle, Some(7)).await.unwrap();
        assert_eq!(state.next_block, 7);
        assert_eq!(state.latest_block, None);

        store
            .save_chain_block(&ChainBlockDao {
                block_number: 15,
                block_hash: format!("0x{:064x}", 15),
                parent_hash: format!("0x{:064x}", 14),
                checked_date: Utc::now(),
            })
            .await
            .unwrap();
        let state = ChainState::init(&store, &oracle, Some(7)).await.unwrap();
        assert_eq!(state.next_block, 16);
    }

    #[tokio::test]
    async fn test_refresh_failure_keeps_state() {
        let oracle = MockOracle::new(10);
        let mut state = ChainState {
            latest_block: Some(8),
            next_block: 5,
            last_refresh: None,
        };
        oracle.set_offline(true);
        let err = state.refresh(&oracle).await.unwrap_err();
        assert!(err.oracle_error().unwrap().is_transient());
        assert_eq!(state.latest_block, Some(8));
        oracle.set_offline(false);
        assert_eq!(state.refresh(&oracle).await.unwrap(), 10);
        assert!(state.last_refresh.is_some());
    }

    #[test]
    fn test_blocks_to_scan() {
        let mut state = ChainState {
            latest_block: Some(30),
            next_block: 5,
            last_refresh: None,
        };
        assert_eq!(state.blocks_to_scan(10, 0), Some(5..=14));
        state.mark_scanned(14);
        assert_eq!(state.blocks_to_scan(100, 0), Some(15..=30));
        assert_eq!(state.blocks_to_scan(100, 3), Some(15..=27));
        assert_eq!(state.blocks_to_scan(100, 31), None);
        state.mark_scanned(30);
        assert_eq!(state.blocks_to_scan(100, 0), None);
        state.rewind_to(28);
        assert_eq!(state.blocks_to_scan(100, 0), Some(28..=30));
        state.rewind_to(29);
        assert_eq!(state.next_block, 28);
    }
}
