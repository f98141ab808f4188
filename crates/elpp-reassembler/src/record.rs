//! The per-transaction-id fragment record and the per-device table of them.

use std::collections::HashMap;

use elpp_types::ChainId;
use serde::Serialize;

/// The size, in bytes, of a reframed TAPOS field: 10 bytes of wire payload
/// plus 3 trailing zero bytes for `max_net_usage_words`, `max_cpu_usage_ms`
/// and `delay_sec` (each a varuint32 encoding of `0`, i.e. one zero byte).
pub const TAPOS_BYTES_LEN: usize = 13;

/// The size, in bytes, of a reframed ACTION field: outer action-array count
/// (1) ∥ dapp+action name (16) ∥ permission-array count (1) ∥ permission+actor
/// name (16).
pub const ACTION_BYTES_LEN: usize = 34;

/// One in-flight transaction's fragments for a single device and trx-id.
///
/// First-write-wins: once a field is `Some`, later fragments of the same
/// kind are ignored (enforced by the channel processors in
/// [`crate::channels`], not by this type — this type just holds state).
#[derive(Debug, Clone, Default)]
pub struct TrxRecord {
    /// Fixed by the first TAPOS fragment; later fragments do not change it.
    pub chain: Option<ChainId>,
    /// Rendered `SIG_K1_...` string, set as soon as the signature fragment arrives.
    pub signature: Option<String>,
    /// 13-byte reframed TAPOS payload.
    pub tapos_bytes: Option<[u8; TAPOS_BYTES_LEN]>,
    /// 34-byte reframed action payload.
    pub action_bytes: Option<[u8; ACTION_BYTES_LEN]>,
    /// The serialized action data payload (opaque to this layer).
    pub data_bytes: Option<Vec<u8>>,
    /// Unix epoch seconds of the most recent fragment that touched this record.
    pub last_epoch: u64,
}

impl TrxRecord {
    /// A record is complete iff all four byte/string members are set.
    pub fn is_complete(&self) -> bool {
        self.tapos_bytes.is_some()
            && self.action_bytes.is_some()
            && self.data_bytes.is_some()
            && self.signature.is_some()
    }

    /// Builds the "has X, needs Y" status line used for `{incomplete}` responses.
    pub fn status_line(&self) -> String {
        let mut parts = Vec::with_capacity(4);
        parts.push(if self.tapos_bytes.is_some() { "has tapos" } else { "needs tapos" });
        parts.push(if self.action_bytes.is_some() { "has action" } else { "needs action" });
        parts.push(if self.data_bytes.is_some() { "has data" } else { "needs data" });
        parts.push(if self.signature.is_some() { "has signature" } else { "needs signature" });
        parts.join(", ")
    }

    /// A JSON-friendly snapshot for the `/api/device_states` introspection route.
    pub fn summary(&self) -> TrxRecordSummary {
        TrxRecordSummary {
            chain: self.chain.map(|c| c.0),
            has_signature: self.signature.is_some(),
            tapos_bytes: self.tapos_bytes.map(hex::encode),
            action_bytes: self.action_bytes.map(hex::encode),
            data_len: self.data_bytes.as_ref().map(Vec::len),
            last_epoch: self.last_epoch,
            status: self.status_line(),
        }
    }
}

/// Serializable view of a [`TrxRecord`] for introspection; byte arrays are
/// hex-encoded and the signature is reduced to a presence flag to avoid
/// putting key material in a debug endpoint's response.
#[derive(Debug, Clone, Serialize)]
pub struct TrxRecordSummary {
    /// The record's chain id, if a TAPOS fragment has arrived yet.
    pub chain: Option<u8>,
    /// Whether a signature fragment has arrived.
    pub has_signature: bool,
    /// Hex-encoded 13-byte TAPOS field, if present.
    pub tapos_bytes: Option<String>,
    /// Hex-encoded 34-byte action field, if present.
    pub action_bytes: Option<String>,
    /// Length of the serialized action data, if present.
    pub data_len: Option<usize>,
    /// Unix epoch seconds of the most recent fragment.
    pub last_epoch: u64,
    /// The same "has X, needs Y" status line used in `{incomplete}` responses.
    pub status: String,
}

/// A single device's table of in-flight transactions, keyed by the 3-bit
/// transaction id (`0..8`).
///
/// Created lazily on first uplink for a device key; persists for the life
/// of the process. Not persisted to disk.
#[derive(Debug, Default)]
pub struct DeviceState {
    trx_map: HashMap<u8, TrxRecord>,
}

impl DeviceState {
    /// Creates an empty device state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a mutable reference to the record for `trx_id`, inserting a
    /// fresh default record if none exists yet.
    pub fn record_mut(&mut self, trx_id: u8) -> &mut TrxRecord {
        self.trx_map.entry(trx_id).or_default()
    }

    /// Removes and returns the record for `trx_id`, if any.
    pub fn take_record(&mut self, trx_id: u8) -> Option<TrxRecord> {
        self.trx_map.remove(&trx_id)
    }

    /// Drops any record whose `last_epoch` is older than `max_age_secs`
    /// relative to `now_epoch`. Called on every lookup of this device's state.
    pub fn purge(&mut self, now_epoch: u64, max_age_secs: u64) {
        self.trx_map
            .retain(|_, record| now_epoch.saturating_sub(record.last_epoch) <= max_age_secs);
    }

    /// Number of in-flight records currently held (test/introspection helper).
    pub fn len(&self) -> usize {
        self.trx_map.len()
    }

    /// Whether the device currently holds no in-flight records.
    pub fn is_empty(&self) -> bool {
        self.trx_map.is_empty()
    }

    /// A JSON-friendly snapshot of every in-flight record, keyed by trx id.
    pub fn summary(&self) -> HashMap<u8, TrxRecordSummary> {
        self.trx_map.iter().map(|(id, record)| (*id, record.summary())).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn purge_drops_only_stale_records() {
        let mut state = DeviceState::new();
        state.record_mut(0).last_epoch = 1_000;
        state.record_mut(1).last_epoch = 1_290;
        state.purge(1_300, 300);
        assert!(state.trx_map.contains_key(&1));
        assert!(!state.trx_map.contains_key(&0));
    }

    #[test]
    fn status_line_reflects_missing_fields() {
        let mut record = TrxRecord::default();
        record.tapos_bytes = Some([0u8; TAPOS_BYTES_LEN]);
        record.action_bytes = Some([0u8; ACTION_BYTES_LEN]);
        assert_eq!(record.status_line(), "has tapos, has action, needs data, needs signature");
    }
}
