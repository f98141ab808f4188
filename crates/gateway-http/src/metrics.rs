//! Prometheus metrics for the ingress surface.
//!
//! Uses the `OnceCell<IntCounterVec>`/`HistogramVec` install-once pattern so
//! `install()` is safe to call from more than one entrypoint.

use once_cell::sync::OnceCell;
use prometheus::{exponential_buckets, register_histogram_vec, register_int_counter_vec, Encoder, HistogramVec, IntCounterVec};

static INGRESS_TOTAL: OnceCell<IntCounterVec> = OnceCell::new();
static INGRESS_LATENCY: OnceCell<HistogramVec> = OnceCell::new();

/// Registers this crate's metrics. Safe to call more than once (later calls
/// are no-ops); the caller must call this before serving `/metrics`.
pub fn install() {
    INGRESS_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            "elpp_gateway_ingress_requests_total",
            "Total /uplink requests by outcome",
            &["outcome"]
        )
        .expect("register_int_counter_vec")
    });
    INGRESS_LATENCY.get_or_init(|| {
        register_histogram_vec!(
            "elpp_gateway_ingress_duration_seconds",
            "Latency of /uplink requests (seconds)",
            &["outcome"],
            exponential_buckets(0.001, 2.0, 15).expect("buckets")
        )
        .expect("register_histogram_vec")
    });
}

/// Records one `/uplink` request's outcome and latency. `outcome` is a
/// short label: `"incomplete"`, `"complete"`, `"tapos_request"`, or `"error"`.
pub fn record_ingress(outcome: &str, elapsed_secs: f64) {
    if let Some(m) = INGRESS_TOTAL.get() {
        m.with_label_values(&[outcome]).inc();
    }
    if let Some(m) = INGRESS_LATENCY.get() {
        m.with_label_values(&[outcome]).observe(elapsed_secs);
    }
}

/// Renders every registered metric family in Prometheus text exposition format.
pub fn encode() -> (String, Vec<u8>) {
    let encoder = prometheus::TextEncoder::new();
    let families = prometheus::gather();
    let mut buf = Vec::with_capacity(4096);
    if let Err(e) = encoder.encode(&families, &mut buf) {
        tracing::error!(target: "http-gateway", error = %e, "failed to encode prometheus metrics");
    }
    (encoder.format_type().to_string(), buf)
}
