//! Per-device transaction reassembler.
//!
//! Collects out-of-order Antelope transaction fragments (TAPOS, ACTION,
//! SERIALIZED-ACTION, SIGNATURE) across independent uplink payloads, keyed
//! by device and by the 3-bit transaction id carried in each fragment's
//! header byte, and emits a complete blockchain-ready transaction once all
//! four fragments for a transaction id have arrived.
//!
//! Grounded on the teacher's `crates/relayer/src/handshake/mod.rs`
//! accumulate-then-emit shape (collect partial proof pieces across messages,
//! emit once a handshake step's required set is present), generalized here
//! from a fixed handshake sequence to an 8-slot per-device table keyed by
//! transaction id.

#![forbid(unsafe_code)]

mod channels;
mod device_table;
mod record;
mod signature;

pub use channels::{encode_tapos_response, CHANNEL_ACTION, CHANNEL_SERIALIZED_ACTION, CHANNEL_SIGNATURE, CHANNEL_TAPOS, CHANNEL_TAPOS_REQUEST};
pub use device_table::DeviceTable;
pub use record::{DeviceState, TrxRecord, TrxRecordSummary, ACTION_BYTES_LEN, TAPOS_BYTES_LEN};
pub use signature::render_sig_k1;

use elpp_types::{DecodeOutcome, DecoderError, DeviceKey};

use channels::ProcessorCtx;

/// The reassembler's public entry point: decodes one uplink payload against
/// one device's in-flight transaction table, purging stale records first.
///
/// Stateless beyond its configured purge age — the device table it reads
/// and writes lives in the caller-owned [`DeviceTable`], so one
/// `Reassembler` can safely be shared (e.g. behind an `Arc`) across every
/// ingress handler task.
pub struct Reassembler {
    purge_age_secs: u64,
}

impl Reassembler {
    /// Builds a reassembler that purges transaction records older than
    /// `purge_age_secs` since their last touch (default 300s, §3).
    pub fn new(purge_age_secs: u64) -> Self {
        Self { purge_age_secs }
    }

    /// Decodes `payload` for `device_key`, looking up (or lazily creating)
    /// that device's state in `table`.
    ///
    /// Per §5's concurrency model, the device's per-key lock is held for the
    /// duration of this call and released before returning — callers must
    /// not perform any network I/O while still holding the returned result
    /// if they intend to re-enter `decode` for the same device concurrently
    /// (they won't: the lock lives only inside this function body).
    pub fn decode(
        &self,
        table: &DeviceTable,
        device_key: &DeviceKey,
        payload: &[u8],
        now_epoch: u64,
    ) -> Result<DecodeOutcome, DecoderError> {
        let handle = table.get_or_create(device_key);
        let mut device = handle.lock();
        device.purge(now_epoch, self.purge_age_secs);

        let engine = channels::build_engine();
        let mut ctx = ProcessorCtx::new(&mut device, now_epoch);
        engine.run(payload, &mut ctx)?;
        Ok(channels::resolve(ctx.into_events(), device_key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use elpp_codec::{encode_schema, PrimitiveKind, Schema, Value};

    fn fragment(channel: u8, header: u8, rest: &[Value], schema_tail: Vec<Schema>) -> Vec<u8> {
        let mut schema_children = vec![Schema::prim(PrimitiveKind::U8)];
        schema_children.extend(schema_tail);
        let schema = Schema::seq(schema_children);
        let mut values = vec![Value::U8(header)];
        values.extend_from_slice(rest);
        let mut out = vec![channel];
        out.extend(encode_schema(&schema, &values).unwrap());
        out
    }

    fn tapos_fragment(trx_id: u8, chain: u8) -> Vec<u8> {
        fragment(
            CHANNEL_TAPOS,
            trx_id,
            &[Value::U8(chain), Value::Bytes(vec![0xAA; 10])],
            vec![Schema::prim(PrimitiveKind::U8), Schema::prim(PrimitiveKind::FixedBytes { n: 10 })],
        )
    }

    fn action_fragment(trx_id: u8) -> Vec<u8> {
        fragment(
            CHANNEL_ACTION,
            trx_id,
            &[Value::Bytes(vec![0x11; 16]), Value::Bytes(vec![0x22; 16])],
            vec![
                Schema::prim(PrimitiveKind::FixedBytes { n: 16 }),
                Schema::prim(PrimitiveKind::FixedBytes { n: 16 }),
            ],
        )
    }

    fn serialized_action_fragment(trx_id: u8, data: &[u8]) -> Vec<u8> {
        fragment(
            CHANNEL_SERIALIZED_ACTION,
            trx_id,
            &[Value::Bytes(data.to_vec())],
            vec![Schema::prim(PrimitiveKind::DynBytes)],
        )
    }

    fn signature_fragment(trx_id: u8) -> Vec<u8> {
        fragment(
            CHANNEL_SIGNATURE,
            trx_id,
            &[Value::Bytes(vec![0x01; 65])],
            vec![Schema::prim(PrimitiveKind::FixedBytes { n: 65 })],
        )
    }

    #[test]
    fn scenario_a_tapos_then_action_is_incomplete() {
        let reassembler = Reassembler::new(300);
        let table = DeviceTable::new();
        let key = DeviceKey::from("dev-a");

        let mut payload = tapos_fragment(5, 1);
        payload.extend(action_fragment(5));

        let outcome = reassembler.decode(&table, &key, &payload, 1_000).unwrap();
        match outcome {
            DecodeOutcome::Incomplete { status } => {
                assert_eq!(status, "has tapos, has action, needs data, needs signature");
            }
            other => panic!("expected Incomplete, got {other:?}"),
        }
    }

    #[test]
    fn scenario_b_data_then_signature_completes() {
        let reassembler = Reassembler::new(300);
        let table = DeviceTable::new();
        let key = DeviceKey::from("dev-b");

        let mut first = tapos_fragment(5, 1);
        first.extend(action_fragment(5));
        reassembler.decode(&table, &key, &first, 1_000).unwrap();

        let data = vec![0x42u8; 82];
        let mut second = serialized_action_fragment(5, &data);
        second.extend(signature_fragment(5));

        let outcome = reassembler.decode(&table, &key, &second, 1_010).unwrap();
        match outcome {
            DecodeOutcome::Complete { transaction, chain, device } => {
                assert_eq!(chain.0, 1);
                assert_eq!(device, key);
                assert_eq!(transaction.signatures.len(), 1);
                assert!(transaction.signatures[0].starts_with("SIG_K1_"));
                assert!(!transaction.compression);
                assert_eq!(transaction.packed_context_free_data, "");
                // 13 (tapos) + 1 (cfa count) + 34 (action) + 1 (len prefix) + 82 (data)
                assert_eq!(transaction.packed_trx.len(), (13 + 1 + 34 + 1 + 82) * 2);
            }
            other => panic!("expected Complete, got {other:?}"),
        }
    }

    #[test]
    fn completed_record_is_removed_from_the_table() {
        let reassembler = Reassembler::new(300);
        let table = DeviceTable::new();
        let key = DeviceKey::from("dev-c");

        let mut payload = tapos_fragment(2, 1);
        payload.extend(action_fragment(2));
        payload.extend(serialized_action_fragment(2, &[0x01, 0x02]));
        payload.extend(signature_fragment(2));
        reassembler.decode(&table, &key, &payload, 1_000).unwrap();

        let handle = table.get_or_create(&key);
        assert!(handle.lock().is_empty());
    }

    #[test]
    fn first_write_wins_on_duplicate_tapos_fragment() {
        let reassembler = Reassembler::new(300);
        let table = DeviceTable::new();
        let key = DeviceKey::from("dev-d");

        reassembler.decode(&table, &key, &tapos_fragment(3, 1), 1_000).unwrap();
        // A second TAPOS fragment for the same trx_id with a different chain
        // must not change the already-recorded chain.
        reassembler.decode(&table, &key, &tapos_fragment(3, 2), 1_001).unwrap();

        let handle = table.get_or_create(&key);
        let summary = handle.lock().summary();
        assert_eq!(summary.get(&3).unwrap().chain, Some(1));
    }

    #[test]
    fn unknown_channel_errors_without_poisoning_other_fragments() {
        let reassembler = Reassembler::new(300);
        let table = DeviceTable::new();
        let key = DeviceKey::from("dev-e");

        let mut payload = tapos_fragment(1, 1);
        payload.push(0x7F); // unknown channel selector
        let err = reassembler.decode(&table, &key, &payload, 1_000).unwrap_err();
        assert_eq!(err, DecoderError::ChannelNotFound(0x7F));

        // The TAPOS fragment that decoded before the unknown channel was
        // still committed to the device table.
        let handle = table.get_or_create(&key);
        let summary = handle.lock().summary();
        assert!(summary.get(&1).unwrap().tapos_bytes.is_some());
    }

    #[test]
    fn tapos_request_without_trx_id_is_reported() {
        let reassembler = Reassembler::new(300);
        let table = DeviceTable::new();
        let key = DeviceKey::from("dev-f");

        let payload = fragment(CHANNEL_TAPOS_REQUEST, 1, &[Value::U8(42)], vec![Schema::prim(PrimitiveKind::U8)]);
        let outcome = reassembler.decode(&table, &key, &payload, 1_000).unwrap();
        match outcome {
            DecodeOutcome::TaposRequest { chain, req_id } => {
                assert_eq!(chain.0, 1);
                assert_eq!(req_id, 42);
            }
            other => panic!("expected TaposRequest, got {other:?}"),
        }
    }

    #[test]
    fn scenario_f_purge_drops_stale_record_before_reuse() {
        let reassembler = Reassembler::new(300);
        let table = DeviceTable::new();
        let key = DeviceKey::from("dev-g");

        reassembler.decode(&table, &key, &tapos_fragment(4, 1), 1_000).unwrap();
        // 301s later, well past the 300s purge age: the record must be gone
        // before the next fragment is applied, so the new TAPOS fragment
        // starts a brand new record rather than completing the stale one.
        reassembler.decode(&table, &key, &action_fragment(4), 1_301).unwrap();

        let handle = table.get_or_create(&key);
        let summary = handle.lock().summary();
        let record = summary.get(&4).unwrap();
        assert!(record.tapos_bytes.is_none(), "stale tapos should have been purged");
        assert!(record.action_bytes.is_some());
    }

    #[test]
    fn encode_tapos_response_round_trips_through_the_decode_schema() {
        let encoded = encode_tapos_response(elpp_types::ChainId(1), 42, 1_700_000_000, 500, 0x1234, 0xDEADBEEF);
        assert_eq!(encoded[0], CHANNEL_TAPOS_REQUEST);
        assert!(encoded.len() > 1);
    }
}
