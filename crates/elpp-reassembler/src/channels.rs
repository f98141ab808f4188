//! Channel map and fragment processors for the four Antelope transaction
//! fragments (TAPOS, ACTION, SERIALIZED-ACTION, SIGNATURE) plus the
//! device-originated TAPOS-REQUEST channel.
//!
//! Grounded on the engine's own test channel maps in
//! `elpp_codec::engine` — processors here follow the same
//! "fold decoded values into a mutable context" shape, generalized from a
//! `Vec<u8>` test context to the real [`ProcessorCtx`].

use elpp_codec::{encode_schema, ChannelMap, Engine, PrimitiveKind, Schema, Value};
use elpp_types::{ChainId, DecoderError, DeviceKey, PackedTransaction};

use crate::record::{DeviceState, ACTION_BYTES_LEN, TAPOS_BYTES_LEN};
use crate::signature::render_sig_k1;

/// Wire channel selector for the TAPOS fragment.
pub const CHANNEL_TAPOS: u8 = 0;
/// Wire channel selector for the ACTION fragment.
pub const CHANNEL_ACTION: u8 = 1;
/// Wire channel selector for the SERIALIZED-ACTION fragment.
pub const CHANNEL_SERIALIZED_ACTION: u8 = 2;
/// Wire channel selector for the SIGNATURE fragment.
pub const CHANNEL_SIGNATURE: u8 = 3;
/// Wire channel selector for the device-originated TAPOS-REQUEST message,
/// reused on the downlink direction to frame the TAPOS-RESPONSE.
pub const CHANNEL_TAPOS_REQUEST: u8 = 4;

const TAPOS_PAYLOAD_LEN: usize = 10;
const NAME_PAIR_LEN: usize = 16;
const SIGNATURE_LEN: usize = 65;

/// One outcome local to a single fragment/channel processor invocation.
///
/// [`Reassembler::decode`](crate::Reassembler::decode) collects these across
/// every channel present in one uplink payload and resolves them into the
/// public [`elpp_types::DecodeOutcome`] once the engine finishes the payload.
#[derive(Debug, Clone)]
enum LocalEvent {
    Complete {
        transaction: PackedTransaction,
        chain: ChainId,
    },
    TaposRequest {
        chain: ChainId,
        req_id: u8,
    },
    Touched {
        status: String,
    },
}

/// Mutable state threaded through one [`Engine::run`] call: the device's
/// in-flight record table, the gateway-receive epoch to stamp fragments
/// with, and the ordered list of per-channel outcomes.
pub(crate) struct ProcessorCtx<'a> {
    pub device: &'a mut DeviceState,
    pub now_epoch: u64,
    events: Vec<LocalEvent>,
}

impl<'a> ProcessorCtx<'a> {
    pub fn new(device: &'a mut DeviceState, now_epoch: u64) -> Self {
        Self {
            device,
            now_epoch,
            events: Vec::new(),
        }
    }

    pub fn into_events(self) -> Vec<LocalEvent> {
        self.events
    }
}

fn expect_u8(values: &[Value], idx: usize, what: &str) -> Result<u8, DecoderError> {
    values
        .get(idx)
        .and_then(Value::as_u8)
        .ok_or_else(|| DecoderError::SchemaMismatch(format!("expected u8 {what} at index {idx}")))
}

fn expect_bytes<'v>(values: &'v [Value], idx: usize, what: &str) -> Result<&'v [u8], DecoderError> {
    values
        .get(idx)
        .and_then(Value::as_bytes)
        .ok_or_else(|| DecoderError::SchemaMismatch(format!("expected bytes {what} at index {idx}")))
}

/// Checks completeness for `trx_id` after a fragment wrote to it, recording
/// either a [`LocalEvent::Complete`] (removing the record, per the
/// completion-atomicity property) or a [`LocalEvent::Touched`] status line.
fn check_completion(ctx: &mut ProcessorCtx<'_>, trx_id: u8) -> Result<(), DecoderError> {
    let complete = ctx.device.record_mut(trx_id).is_complete();
    if !complete {
        let status = ctx.device.record_mut(trx_id).status_line();
        ctx.events.push(LocalEvent::Touched { status });
        return Ok(());
    }
    let record = ctx
        .device
        .take_record(trx_id)
        .expect("record_mut just reported complete for this trx_id");
    let chain = record.chain.expect("complete record always has a chain");
    let signature = record.signature.clone().expect("complete record always has a signature");
    let tapos_bytes = record.tapos_bytes.expect("complete record always has tapos bytes");
    let action_bytes = record.action_bytes.expect("complete record always has action bytes");
    let data_bytes = record.data_bytes.as_ref().expect("complete record always has data bytes");

    let mut packed = Vec::with_capacity(TAPOS_BYTES_LEN + 1 + ACTION_BYTES_LEN + data_bytes.len() + 5);
    packed.extend_from_slice(&tapos_bytes);
    packed.push(0x00); // context-free actions count
    packed.extend_from_slice(&action_bytes);
    let data_framed = encode_schema(&Schema::prim(PrimitiveKind::DynBytes), &[Value::Bytes(data_bytes.clone())])
        .map_err(|e| DecoderError::SchemaMismatch(format!("framing serialized action data: {e}")))?;
    packed.extend_from_slice(&data_framed);

    let transaction = PackedTransaction {
        signatures: vec![signature],
        compression: false,
        packed_context_free_data: String::new(),
        packed_trx: hex::encode(packed),
    };
    ctx.events.push(LocalEvent::Complete { transaction, chain });
    Ok(())
}

fn process_tapos(values: &[Value], ctx: &mut ProcessorCtx<'_>) -> Result<(), DecoderError> {
    let header = expect_u8(values, 0, "header")?;
    let chain_byte = expect_u8(values, 1, "chain_id")?;
    let payload = expect_bytes(values, 2, "tapos payload")?;
    if payload.len() != TAPOS_PAYLOAD_LEN {
        return Err(DecoderError::SchemaMismatch(format!(
            "tapos payload expected {TAPOS_PAYLOAD_LEN} bytes, got {}",
            payload.len()
        )));
    }
    let trx_id = elpp_types::TrxId::from_header(header).value();
    let chain = ChainId(chain_byte & 0x7);

    let record = ctx.device.record_mut(trx_id);
    record.last_epoch = ctx.now_epoch;
    if record.chain.is_none() {
        record.chain = Some(chain);
    }
    if record.tapos_bytes.is_none() {
        let mut buf = [0u8; TAPOS_BYTES_LEN];
        buf[..TAPOS_PAYLOAD_LEN].copy_from_slice(payload);
        // Trailing 3 bytes stay zero: varuint32(0) for each of
        // max_net_usage_words, max_cpu_usage_ms, delay_sec.
        record.tapos_bytes = Some(buf);
    }
    check_completion(ctx, trx_id)
}

fn process_action(values: &[Value], ctx: &mut ProcessorCtx<'_>) -> Result<(), DecoderError> {
    let header = expect_u8(values, 0, "header")?;
    let dapp_action_name = expect_bytes(values, 1, "dapp+action name")?;
    let permission_actor_name = expect_bytes(values, 2, "permission+actor name")?;
    if dapp_action_name.len() != NAME_PAIR_LEN || permission_actor_name.len() != NAME_PAIR_LEN {
        return Err(DecoderError::SchemaMismatch("action name fields must be 16 bytes each".to_string()));
    }
    let trx_id = elpp_types::TrxId::from_header(header).value();

    let record = ctx.device.record_mut(trx_id);
    record.last_epoch = ctx.now_epoch;
    if record.action_bytes.is_none() {
        let mut buf = [0u8; ACTION_BYTES_LEN];
        buf[0] = 0x01; // outer action-array count
        buf[1..17].copy_from_slice(dapp_action_name);
        buf[17] = 0x01; // permission-array count
        buf[18..34].copy_from_slice(permission_actor_name);
        record.action_bytes = Some(buf);
    }
    check_completion(ctx, trx_id)
}

fn process_serialized_action(values: &[Value], ctx: &mut ProcessorCtx<'_>) -> Result<(), DecoderError> {
    let header = expect_u8(values, 0, "header")?;
    let data = expect_bytes(values, 1, "serialized action data")?;
    let trx_id = elpp_types::TrxId::from_header(header).value();

    let record = ctx.device.record_mut(trx_id);
    record.last_epoch = ctx.now_epoch;
    if record.data_bytes.is_none() {
        record.data_bytes = Some(data.to_vec());
    }
    check_completion(ctx, trx_id)
}

fn process_signature(values: &[Value], ctx: &mut ProcessorCtx<'_>) -> Result<(), DecoderError> {
    let header = expect_u8(values, 0, "header")?;
    let sig = expect_bytes(values, 1, "signature")?;
    if sig.len() != SIGNATURE_LEN {
        return Err(DecoderError::SchemaMismatch(format!(
            "signature expected {SIGNATURE_LEN} bytes, got {}",
            sig.len()
        )));
    }
    let trx_id = elpp_types::TrxId::from_header(header).value();

    let record = ctx.device.record_mut(trx_id);
    record.last_epoch = ctx.now_epoch;
    if record.signature.is_none() {
        record.signature = Some(render_sig_k1(sig));
    }
    check_completion(ctx, trx_id)
}

fn process_tapos_request(values: &[Value], ctx: &mut ProcessorCtx<'_>) -> Result<(), DecoderError> {
    let chain_byte = expect_u8(values, 0, "chain_id")?;
    let req_id = expect_u8(values, 1, "req_id")?;
    ctx.events.push(LocalEvent::TaposRequest {
        chain: ChainId(chain_byte & 0x7),
        req_id,
    });
    Ok(())
}

fn tapos_schema() -> Schema {
    Schema::seq([
        Schema::named("header", PrimitiveKind::U8),
        Schema::named("chain_id", PrimitiveKind::U8),
        Schema::named("tapos", PrimitiveKind::FixedBytes { n: TAPOS_PAYLOAD_LEN }),
    ])
}

fn action_schema() -> Schema {
    Schema::seq([
        Schema::named("header", PrimitiveKind::U8),
        Schema::named("dapp_action_name", PrimitiveKind::FixedBytes { n: NAME_PAIR_LEN }),
        Schema::named("permission_actor_name", PrimitiveKind::FixedBytes { n: NAME_PAIR_LEN }),
    ])
}

fn serialized_action_schema() -> Schema {
    Schema::seq([
        Schema::named("header", PrimitiveKind::U8),
        Schema::named("data", PrimitiveKind::DynBytes),
    ])
}

fn signature_schema() -> Schema {
    Schema::seq([
        Schema::named("header", PrimitiveKind::U8),
        Schema::named("signature", PrimitiveKind::FixedBytes { n: SIGNATURE_LEN }),
    ])
}

fn tapos_request_schema() -> Schema {
    Schema::seq([
        Schema::named("chain_id", PrimitiveKind::U8),
        Schema::named("req_id", PrimitiveKind::U8),
    ])
}

/// The schema for the downlink TAPOS-RESPONSE body: `chain_id, req_id,
/// gateway_sec, gateway_ms, ref_block_num, ref_block_prefix`.
fn tapos_response_schema() -> Schema {
    Schema::seq([
        Schema::named("chain_id", PrimitiveKind::U8),
        Schema::named("req_id", PrimitiveKind::U8),
        Schema::named("gateway_sec", PrimitiveKind::U32),
        Schema::named("gateway_ms", PrimitiveKind::U16),
        Schema::named("ref_block_num", PrimitiveKind::U16),
        Schema::named("ref_block_prefix", PrimitiveKind::U32),
    ])
}

/// Builds a fresh [`Engine`] over the fixed five-channel map (TAPOS, ACTION,
/// SERIALIZED-ACTION, SIGNATURE, TAPOS-REQUEST), generic over the processor
/// context's lifetime so no per-call allocation is needed to rebuild it.
pub(crate) fn build_engine<'a>() -> Engine<ProcessorCtx<'a>> {
    let mut map: ChannelMap<ProcessorCtx<'a>> = ChannelMap::new();
    map.register(CHANNEL_TAPOS, tapos_schema(), Box::new(process_tapos));
    map.register(CHANNEL_ACTION, action_schema(), Box::new(process_action));
    map.register(
        CHANNEL_SERIALIZED_ACTION,
        serialized_action_schema(),
        Box::new(process_serialized_action),
    );
    map.register(CHANNEL_SIGNATURE, signature_schema(), Box::new(process_signature));
    map.register(CHANNEL_TAPOS_REQUEST, tapos_request_schema(), Box::new(process_tapos_request));
    Engine::new(map)
}

/// Resolves the ordered [`LocalEvent`]s produced by one payload's worth of
/// channel processors into the public [`elpp_types::DecodeOutcome`].
///
/// Priority: a completed transaction wins over a TAPOS request, which wins
/// over a plain "still incomplete" status — matching the closed sum in the
/// design notes rather than a dynamic object with optional fields.
pub(crate) fn resolve(events: Vec<LocalEvent>, device: &DeviceKey) -> elpp_types::DecodeOutcome {
    use elpp_types::DecodeOutcome;

    let mut tapos_request = None;
    let mut last_status = None;
    for event in events {
        match event {
            LocalEvent::Complete { transaction, chain } => {
                return DecodeOutcome::Complete {
                    transaction,
                    chain,
                    device: device.clone(),
                };
            }
            LocalEvent::TaposRequest { chain, req_id } => {
                tapos_request.get_or_insert((chain, req_id));
            }
            LocalEvent::Touched { status } => {
                last_status = Some(status);
            }
        }
    }
    if let Some((chain, req_id)) = tapos_request {
        return DecodeOutcome::TaposRequest { chain, req_id };
    }
    DecodeOutcome::Incomplete {
        status: last_status.unwrap_or_else(|| "no fragments decoded".to_string()),
    }
}

/// Encodes a TAPOS-RESPONSE downlink body: the channel-4 selector byte
/// followed by the schema's six fields, for the gateway to base64 and wrap
/// in the downlink envelope (§4.7 / §6).
pub fn encode_tapos_response(
    chain: ChainId,
    req_id: u8,
    gateway_sec: u32,
    gateway_ms: u16,
    ref_block_num: u16,
    ref_block_prefix: u32,
) -> Vec<u8> {
    let values = vec![
        Value::U8(chain.0),
        Value::U8(req_id),
        Value::U32(gateway_sec),
        Value::U16(gateway_ms),
        Value::U16(ref_block_num),
        Value::U32(ref_block_prefix),
    ];
    let mut out = Vec::with_capacity(1 + 1 + 1 + 4 + 2 + 2 + 4);
    out.push(CHANNEL_TAPOS_REQUEST);
    out.extend(
        encode_schema(&tapos_response_schema(), &values).expect("tapos response schema is fixed-shape and infallible"),
    );
    out
}
