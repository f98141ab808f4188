//! The ELPP gateway's HTTP ingress surface.
//!
//! An `axum::Router` assembled from a handful of routes layered with a
//! `tower::ServiceBuilder` stack — `TraceLayer`, `CatchPanicLayer`, a
//! `HandleErrorLayer`-guarded `TimeoutLayer` + `ConcurrencyLimitLayer` +
//! `LoadShedLayer`, and `RequestBodyLimitLayer`.

#![forbid(unsafe_code)]

mod dispatch_worker;
mod error;
mod limiter;
mod metrics;

pub use dispatch_worker::TaposHostSource;
pub use error::AppError;
pub use limiter::IpLimiter;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use axum::error_handling::HandleErrorLayer;
use axum::extract::State;
use axum::http::StatusCode;
use axum::middleware;
use axum::response::{IntoResponse, Json};
use axum::routing::{get, post};
use axum::{BoxError, Router};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use dispatch_queue::DispatchQueue;
use elpp_reassembler::{encode_tapos_response, DeviceTable, Reassembler};
use elpp_types::{ChainId, DecodeOutcome, DeviceKey, GatewayConfig, GatewayError, TaposError};
use serde::{Deserialize, Serialize};
use tapos_manager::TaposManager;
use tokio::sync::Notify;
use tower::limit::ConcurrencyLimitLayer;
use tower::load_shed::LoadShedLayer;
use tower::timeout::TimeoutLayer;
use tower::ServiceBuilder;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

/// Per-client-rate-limit and body-size tunables the core [`GatewayConfig`]
/// doesn't carry — these are properties of the HTTP surface, not of the
/// ELPP protocol itself.
#[derive(Debug, Clone)]
pub struct HttpServerConfig {
    /// Address to bind the listener to.
    pub listen_addr: SocketAddr,
    /// Sustained requests/sec allowed per client IP.
    pub rps: u32,
    /// Burst capacity per client IP.
    pub burst: u32,
    /// Maximum accepted request body size, in KiB.
    pub body_limit_kb: usize,
    /// CIDRs of proxies trusted to set `X-Forwarded-For`.
    pub trusted_proxies: Vec<String>,
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".parse().unwrap(),
            rps: 50,
            burst: 100,
            body_limit_kb: 64,
            trusted_proxies: Vec::new(),
        }
    }
}

struct GatewayState {
    device_table: Arc<DeviceTable>,
    reassembler: Reassembler,
    tapos_manager: Arc<TaposManager>,
    dispatch_queue: Arc<DispatchQueue>,
    dispatch_notify: Arc<Notify>,
    downlink_client: reqwest::Client,
    elpp_port: u16,
}

fn now_epoch_and_millis() -> (u64, u16) {
    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
    (now.as_secs(), now.subsec_millis() as u16)
}

/// The gateway-receive timestamp for one ingress request: the device's
/// reported ms-since-epoch (`reported_at`) when supplied, falling back to
/// this process's own wall clock otherwise. Used both to stamp the
/// reassembler's `last_epoch`/purge clock and as the "gateway-receive-time"
/// answered in a TAPOS-response downlink (§3, §4.7).
fn request_time(reported_at: Option<i64>) -> (u64, u16) {
    match reported_at {
        Some(ms) if ms >= 0 => ((ms as u64) / 1000, ((ms as u64) % 1000) as u16),
        _ => now_epoch_and_millis(),
    }
}

#[derive(Debug, Deserialize)]
struct UplinkRequest {
    port: u16,
    payload: String,
    dev_eui: String,
    #[serde(default)]
    downlink_url: Option<String>,
    /// Device-reported receive time, ms since epoch. When present, this
    /// (not the gateway's own wall clock) stamps the reassembler's purge
    /// clock and the TAPOS-response gateway-receive-time.
    #[serde(default)]
    reported_at: Option<i64>,
}

#[derive(Debug, Serialize)]
struct DownlinkBody {
    payload_raw: String,
    port: u16,
    confirmed: bool,
}

async fn uplink_handler(
    State(state): State<Arc<GatewayState>>,
    Json(req): Json<UplinkRequest>,
) -> Result<String, AppError> {
    let started = std::time::Instant::now();
    let outcome = handle_uplink(&state, req).await;
    let label = match &outcome {
        Ok(DecodeOutcome::Complete { .. }) => "complete",
        Ok(DecodeOutcome::TaposRequest { .. }) => "tapos_request",
        Ok(DecodeOutcome::Incomplete { .. }) => "incomplete",
        Err(_) => "error",
    };
    metrics::record_ingress(label, started.elapsed().as_secs_f64());

    match outcome {
        Ok(DecodeOutcome::Incomplete { status }) => Ok(status),
        Ok(DecodeOutcome::Complete { chain, .. }) => {
            state.dispatch_notify.notify_one();
            Ok(format!("queued for dispatch to chain {}", chain.0))
        }
        Ok(DecodeOutcome::TaposRequest { chain, .. }) => Ok(format!("tapos response dispatched for chain {}", chain.0)),
        Err(e) => Err(e),
    }
}

/// The actual per-request work, split out of [`uplink_handler`] so the
/// labeling/metrics wrapper stays a thin shell.
async fn handle_uplink(state: &Arc<GatewayState>, req: UplinkRequest) -> Result<DecodeOutcome, AppError> {
    if req.port != state.elpp_port {
        return Err(AppError::BadRequest(format!(
            "port {} does not match configured ELPP port {}",
            req.port, state.elpp_port
        )));
    }
    let payload = BASE64
        .decode(req.payload.as_bytes())
        .map_err(|e| AppError::BadRequest(format!("payload is not valid base64: {e}")))?;
    let device_key = DeviceKey::from(req.dev_eui.as_str());
    let (gateway_sec, gateway_ms) = request_time(req.reported_at);

    let outcome = state
        .reassembler
        .decode(&state.device_table, &device_key, &payload, gateway_sec)
        .map_err(GatewayError::Decoder)?;

    match &outcome {
        DecodeOutcome::Complete { transaction, chain, device } => {
            let json = serde_json::to_value(transaction)
                .map_err(|e| AppError::BadRequest(format!("failed to serialize transaction: {e}")))?;
            state.dispatch_queue.push(*chain, json, device.clone(), gateway_sec);
        }
        DecodeOutcome::TaposRequest { chain, req_id } => {
            dispatch_tapos_response(state, *chain, *req_id, req.downlink_url.as_deref(), gateway_sec, gateway_ms).await?;
        }
        DecodeOutcome::Incomplete { .. } => {}
    }
    Ok(outcome)
}

/// On a device TAPOS request, POST a downlink carrying the chain's
/// current reference-block metadata. Errors if no TAPOS is held for the
/// chain, or if the device didn't supply a `downlink_url` to answer on.
async fn dispatch_tapos_response(
    state: &Arc<GatewayState>,
    chain: ChainId,
    req_id: u8,
    downlink_url: Option<&str>,
    gateway_sec: u64,
    gateway_ms: u16,
) -> Result<(), AppError> {
    let snapshot = state
        .tapos_manager
        .tapos(chain)
        .ok_or(GatewayError::Tapos(TaposError::Unavailable(chain)))?;
    let downlink_url = downlink_url
        .ok_or_else(|| AppError::BadRequest("device requested TAPOS but no downlink_url was supplied".to_string()))?;

    let frame = encode_tapos_response(
        chain,
        req_id,
        gateway_sec as u32,
        gateway_ms,
        snapshot.ref_block_num,
        snapshot.ref_block_prefix,
    );
    let body = DownlinkBody {
        payload_raw: BASE64.encode(frame),
        port: state.elpp_port,
        confirmed: false,
    };

    let resp = state
        .downlink_client
        .post(downlink_url)
        .json(&body)
        .send()
        .await
        .map_err(|e| AppError::BadRequest(format!("downlink POST failed: {e}")))?;
    if !resp.status().is_success() {
        return Err(AppError::BadRequest(format!("downlink POST rejected with status {}", resp.status())));
    }
    Ok(())
}

#[derive(Serialize)]
struct DeviceStatesResponse {
    devices: std::collections::HashMap<String, std::collections::HashMap<u8, elpp_reassembler::TrxRecordSummary>>,
}

async fn device_states_handler(State(state): State<Arc<GatewayState>>) -> Json<DeviceStatesResponse> {
    Json(DeviceStatesResponse { devices: state.device_table.summary() })
}

async fn tapos_state_handler(
    State(state): State<Arc<GatewayState>>,
) -> Json<std::collections::HashMap<u8, tapos_manager::ChainStateSummary>> {
    Json(state.tapos_manager.summary())
}

async fn metrics_handler() -> impl IntoResponse {
    let (content_type, body) = metrics::encode();
    ([(axum::http::header::CONTENT_TYPE, content_type)], body)
}

async fn healthz_handler() -> &'static str {
    "OK"
}

async fn map_middleware_error(err: BoxError) -> impl IntoResponse {
    if err.is::<tower::timeout::error::Elapsed>() {
        (
            StatusCode::REQUEST_TIMEOUT,
            Json(serde_json::json!({ "error": { "code": "TIMEOUT", "message": "request timed out" } })),
        )
    } else {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({ "error": { "code": "OVERLOADED", "message": err.to_string() } })),
        )
    }
}

/// Builds the gateway's `axum::Router`, wiring the reassembler, TAPOS
/// manager and dispatch queue behind the ingress and introspection routes.
///
/// Spawns the dispatch worker task as a side effect; callers that need to
/// control its lifetime directly should use [`dispatch_worker::spawn`] and
/// assemble their own state instead.
pub fn build_router(
    gateway_config: &GatewayConfig,
    http_config: &HttpServerConfig,
    device_table: Arc<DeviceTable>,
    tapos_manager: Arc<TaposManager>,
    dispatch_queue: Arc<DispatchQueue>,
) -> Router {
    metrics::install();

    let downlink_client = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(gateway_config.outbound_deadline_secs))
        .timeout(Duration::from_secs(gateway_config.outbound_deadline_secs))
        .build()
        .expect("building reqwest client for downlink dispatch");

    let dispatch_notify = Arc::new(Notify::new());
    let hosts = Arc::new(TaposHostSource(Arc::clone(&tapos_manager)));
    let sweep_client = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(gateway_config.outbound_deadline_secs))
        .timeout(Duration::from_secs(gateway_config.outbound_deadline_secs))
        .build()
        .expect("building reqwest client for dispatch sweep");
    dispatch_worker::spawn(sweep_client, Arc::clone(&dispatch_queue), hosts, Arc::clone(&dispatch_notify));

    let state = Arc::new(GatewayState {
        device_table,
        reassembler: Reassembler::new(gateway_config.purge_age_secs),
        tapos_manager,
        dispatch_queue,
        dispatch_notify,
        downlink_client,
        elpp_port: gateway_config.elpp_port,
    });

    let limiter = IpLimiter::new(http_config.rps, http_config.burst, &http_config.trusted_proxies);

    Router::new()
        .route("/uplink", post(uplink_handler))
        .route("/api/device_states", get(device_states_handler))
        .route("/api/tapos_manager_state", get(tapos_state_handler))
        .route_layer(middleware::from_fn_with_state(limiter.clone(), limiter::rate_limit_middleware))
        .with_state(state)
        .route("/metrics", get(metrics_handler))
        .route("/healthz", get(healthz_handler))
        .layer(
            ServiceBuilder::new()
                .layer(HandleErrorLayer::new(map_middleware_error))
                .layer(LoadShedLayer::new())
                .layer(ConcurrencyLimitLayer::new(256))
                .layer(TimeoutLayer::new(Duration::from_secs(gateway_config.request_deadline_secs))),
        )
        .layer(CatchPanicLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(RequestBodyLimitLayer::new(http_config.body_limit_kb * 1024))
}

/// Binds `http_config.listen_addr` and serves the router until `shutdown`
/// resolves, via `axum::serve(...).with_graceful_shutdown`.
pub async fn run_server(
    gateway_config: &GatewayConfig,
    http_config: &HttpServerConfig,
    device_table: Arc<DeviceTable>,
    tapos_manager: Arc<TaposManager>,
    dispatch_queue: Arc<DispatchQueue>,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let app = build_router(gateway_config, http_config, device_table, tapos_manager, dispatch_queue);
    tracing::info!(target: "http-gateway", addr = %http_config.listen_addr, "ELPP gateway listening");
    let listener = tokio::net::TcpListener::bind(http_config.listen_addr).await?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}
