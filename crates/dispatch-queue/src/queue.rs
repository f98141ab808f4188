//! The per-chain FIFO and its dispatch sweep.
//!
//! One shared `reqwest::Client`, plain async methods, `tracing` on every
//! outcome, generalized from request/response querying to a fire-and-forget
//! push: nothing here retries — a device resubmits if its transaction never
//! lands, bounded by TAPOS expiration.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use elpp_types::{ChainId, DeviceKey, DispatchError};
use parking_lot::Mutex;
use serde_json::Value as JsonValue;

/// One completed transaction awaiting dispatch.
#[derive(Debug, Clone)]
pub struct QueueItem {
    /// Monotonic id, used only to identify this item for removal once its
    /// in-flight POST settles; carries no wire meaning.
    id: u64,
    /// Unix epoch seconds this item was enqueued.
    pub epoch: u64,
    /// Set once a sweep has claimed this item for dispatch, so a second
    /// concurrent sweep does not double-POST it.
    started: bool,
    /// The `send_transaction` JSON body.
    pub json: JsonValue,
    /// The device whose uplink produced this transaction (diagnostics only).
    pub device_key: DeviceKey,
}

/// The chain-keyed collection of FIFOs.
pub struct DispatchQueue {
    queues: DashMap<u8, Mutex<VecDeque<QueueItem>>>,
    next_id: AtomicU64,
}

impl DispatchQueue {
    pub fn new() -> Self {
        Self {
            queues: DashMap::new(),
            next_id: AtomicU64::new(0),
        }
    }

    /// Appends a completed transaction to `chain`'s queue with `started = false`.
    pub fn push(&self, chain: ChainId, json: JsonValue, device_key: DeviceKey, now_epoch: u64) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let item = QueueItem {
            id,
            epoch: now_epoch,
            started: false,
            json,
            device_key,
        };
        self.queues
            .entry(chain.0)
            .or_insert_with(|| Mutex::new(VecDeque::new()))
            .lock()
            .push_back(item);
    }

    /// Claims every not-yet-started item across every chain, marking each
    /// started in place so a concurrent sweep skips it. Returns the claimed
    /// items grouped by chain.
    pub(crate) fn claim_pending(&self) -> Vec<(ChainId, QueueItem)> {
        let mut claimed = Vec::new();
        for entry in self.queues.iter() {
            let chain = ChainId(*entry.key());
            let mut queue = entry.value().lock();
            for item in queue.iter_mut() {
                if !item.started {
                    item.started = true;
                    claimed.push((chain, item.clone()));
                }
            }
        }
        claimed
    }

    /// Removes the item identified by `id` from `chain`'s queue, regardless
    /// of whether its dispatch succeeded or failed.
    pub(crate) fn remove(&self, chain: ChainId, id: u64) {
        if let Some(queue) = self.queues.get(&chain.0) {
            queue.lock().retain(|item| item.id != id);
        }
    }

    /// Total pending items across every chain, for diagnostics/tests.
    pub fn len(&self) -> usize {
        self.queues.iter().map(|e| e.value().lock().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for DispatchQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl QueueItem {
    pub(crate) fn id(&self) -> u64 {
        self.id
    }
}

/// Result of one item's dispatch attempt, surfaced for logging/metrics.
#[derive(Debug)]
pub struct DispatchOutcome {
    pub chain: ChainId,
    pub device_key: DeviceKey,
    pub result: Result<(), DispatchError>,
}
