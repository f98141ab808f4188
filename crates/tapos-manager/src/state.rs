//! Per-chain TAPOS state: the freshest reference-block snapshot, the
//! chain's API pool, and the most-recently-successful host.

use parking_lot::Mutex;
use serde::Serialize;

use crate::pool::{ApiHost, ApiPool};

/// The freshest reference-block metadata known for a chain (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TaposSnapshot {
    /// Unix epoch seconds this snapshot was acquired.
    pub acq_epoch: u64,
    /// `last_irreversible_block_num & 0xFFFF`.
    pub ref_block_num: u16,
    /// Little-endian `u32` at byte offset 8 of the irreversible block id.
    pub ref_block_prefix: u32,
}

/// One chain's TAPOS state: expected chain hash, current snapshot (if any),
/// rotating API pool, and most-recently-successful host.
///
/// Every field lives behind its own lock (§5: "protect each chain's state
/// ... with independent locks") so a reader of `api_last` never blocks
/// behind a concurrent pool selection or TAPOS write.
pub struct ChainState {
    pub expected_chain_hash: String,
    tapos: Mutex<Option<TaposSnapshot>>,
    pool: Mutex<ApiPool>,
    api_last: Mutex<Option<ApiHost>>,
}

impl ChainState {
    pub fn new(expected_chain_hash: String, pool: ApiPool) -> Self {
        Self {
            expected_chain_hash,
            tapos: Mutex::new(None),
            pool: Mutex::new(pool),
            api_last: Mutex::new(None),
        }
    }

    /// Atomically replaces the TAPOS snapshot and records `host` as
    /// `api_last` — called on a successful poll (§4.5 step 4).
    pub fn commit_success(&self, snapshot: TaposSnapshot, host: ApiHost, version: Option<String>) {
        *self.tapos.lock() = Some(snapshot);
        self.pool.lock().record_success(&host, version);
        *self.api_last.lock() = Some(host);
    }

    /// Records a failed poll against `host` (§4.5 step 4, error branch).
    pub fn record_error(&self, host: &ApiHost) {
        self.pool.lock().record_error(host);
    }

    /// Selects the next API host to poll (§4.5 step 2).
    pub fn select_host(&self) -> Option<ApiHost> {
        self.pool.lock().select()
    }

    /// Returns the current TAPOS snapshot, if one has ever been acquired.
    pub fn tapos(&self) -> Option<TaposSnapshot> {
        *self.tapos.lock()
    }

    /// Returns the most-recently-successful API host, if any.
    pub fn api_last(&self) -> Option<ApiHost> {
        self.api_last.lock().clone()
    }

    /// A JSON-friendly snapshot of this chain's state for the
    /// `/api/tapos_manager_state` introspection route.
    pub fn summary(&self) -> ChainStateSummary {
        ChainStateSummary {
            expected_chain_hash: self.expected_chain_hash.clone(),
            tapos: self.tapos(),
            api_last: self.api_last(),
            api_pool: self.pool.lock().entries().to_vec(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChainStateSummary {
    pub expected_chain_hash: String,
    pub tapos: Option<TaposSnapshot>,
    pub api_last: Option<ApiHost>,
    pub api_pool: Vec<crate::pool::ApiPoolEntry>,
}
