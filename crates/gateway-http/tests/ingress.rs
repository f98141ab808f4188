//! End-to-end ingress scenarios (§8 Scenarios A–D) driven against a real
//! router via `tower::ServiceExt::oneshot`, matching the teacher's
//! `testing/rpc.rs` convention of exercising the HTTP surface directly
//! rather than only unit-testing the handler functions.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use dispatch_queue::DispatchQueue;
use elpp_codec::{encode_schema, PrimitiveKind, Schema, Value};
use elpp_reassembler::DeviceTable;
use elpp_types::{ChainConfig, GatewayConfig, TaposTuning};
use gateway_http::{build_router, HttpServerConfig};
use http_body_util::BodyExt as _;
use tapos_manager::TaposManager;
use tower::ServiceExt as _;

fn test_config() -> GatewayConfig {
    let mut chains = BTreeMap::new();
    chains.insert(
        1u8,
        ChainConfig {
            expected_chain_hash: "testchain".to_string(),
            api_pool: vec![],
        },
    );
    GatewayConfig {
        elpp_port: 8,
        purge_age_secs: 300,
        request_deadline_secs: 30,
        outbound_deadline_secs: 20,
        tapos: TaposTuning::default(),
        chains,
    }
}

fn build_test_router() -> axum::Router {
    let gateway_config = test_config();
    let http_config = HttpServerConfig::default();
    let device_table = Arc::new(DeviceTable::new());
    let tapos_manager = Arc::new(TaposManager::new(&gateway_config).unwrap());
    let dispatch_queue = Arc::new(DispatchQueue::new());
    build_router(&gateway_config, &http_config, device_table, tapos_manager, dispatch_queue)
}

fn fragment(channel: u8, header: u8, tail: Schema, values: Vec<Value>) -> Vec<u8> {
    let schema = Schema::seq([Schema::prim(PrimitiveKind::U8), tail]);
    let mut all_values = vec![Value::U8(header)];
    all_values.extend(values);
    let mut out = vec![channel];
    out.extend(encode_schema(&schema, &all_values).unwrap());
    out
}

fn tapos_fragment(trx_id: u8, chain: u8) -> Vec<u8> {
    fragment(
        elpp_reassembler::CHANNEL_TAPOS,
        trx_id,
        Schema::seq([Schema::prim(PrimitiveKind::U8), Schema::prim(PrimitiveKind::FixedBytes { n: 10 })]),
        vec![Value::U8(chain), Value::Bytes(vec![0xAA; 10])],
    )
}

fn action_fragment(trx_id: u8) -> Vec<u8> {
    fragment(
        elpp_reassembler::CHANNEL_ACTION,
        trx_id,
        Schema::seq([
            Schema::prim(PrimitiveKind::FixedBytes { n: 16 }),
            Schema::prim(PrimitiveKind::FixedBytes { n: 16 }),
        ]),
        vec![Value::Bytes(vec![0x11; 16]), Value::Bytes(vec![0x22; 16])],
    )
}

fn serialized_action_fragment(trx_id: u8, data: &[u8]) -> Vec<u8> {
    fragment(
        elpp_reassembler::CHANNEL_SERIALIZED_ACTION,
        trx_id,
        Schema::prim(PrimitiveKind::DynBytes),
        vec![Value::Bytes(data.to_vec())],
    )
}

fn signature_fragment(trx_id: u8) -> Vec<u8> {
    fragment(
        elpp_reassembler::CHANNEL_SIGNATURE,
        trx_id,
        Schema::prim(PrimitiveKind::FixedBytes { n: 65 }),
        vec![Value::Bytes(vec![0x01; 65])],
    )
}

fn uplink_body(payload: &[u8], dev_eui: &str) -> String {
    serde_json::json!({
        "port": 8,
        "payload": BASE64.encode(payload),
        "dev_eui": dev_eui,
    })
    .to_string()
}

async fn post_uplink(router: &axum::Router, body: String) -> (StatusCode, String) {
    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/uplink")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, String::from_utf8(bytes.to_vec()).unwrap())
}

#[tokio::test]
async fn scenario_a_tapos_then_action_reports_incomplete() {
    let router = build_test_router();
    let mut payload = tapos_fragment(5, 1);
    payload.extend(action_fragment(5));

    let (status, body) = post_uplink(&router, uplink_body(&payload, "dev-a")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "has tapos, has action, needs data, needs signature");
}

#[tokio::test]
async fn scenario_b_data_then_signature_completes_and_queues_dispatch() {
    let router = build_test_router();
    let mut first = tapos_fragment(5, 1);
    first.extend(action_fragment(5));
    post_uplink(&router, uplink_body(&first, "dev-b")).await;

    let data = vec![0x42u8; 82];
    let mut second = serialized_action_fragment(5, &data);
    second.extend(signature_fragment(5));

    let (status, body) = post_uplink(&router, uplink_body(&second, "dev-b")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "queued for dispatch to chain 1");
}

#[tokio::test]
async fn scenario_c_unknown_channel_is_a_500() {
    let router = build_test_router();
    let mut payload = tapos_fragment(1, 1);
    payload.push(0x7F);

    let (status, body) = post_uplink(&router, uplink_body(&payload, "dev-c")).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body.contains("DECODER_CHANNEL_NOT_FOUND"));
}

#[tokio::test]
async fn scenario_d_tapos_request_without_tapos_held_is_a_500() {
    let router = build_test_router();
    let payload = fragment(
        elpp_reassembler::CHANNEL_TAPOS_REQUEST,
        1,
        Schema::prim(PrimitiveKind::U8),
        vec![Value::U8(42)],
    );

    let (status, body) = post_uplink(&router, uplink_body(&payload, "dev-d")).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body.contains("TAPOS_UNAVAILABLE"));
}

#[tokio::test]
async fn wrong_elpp_port_is_a_bad_request() {
    let router = build_test_router();
    let body = serde_json::json!({
        "port": 99,
        "payload": BASE64.encode(tapos_fragment(1, 1)),
        "dev_eui": "dev-e",
    })
    .to_string();

    let (status, body) = post_uplink(&router, body).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body.contains("GATEWAY_BAD_REQUEST"));
}

#[tokio::test]
async fn healthz_reports_ok() {
    let router = build_test_router();
    let response = router
        .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
