//! CLI entrypoint for the ELPP gateway.
//!
//! Resolves the bind interface, loads configuration, wires the device
//! table, TAPOS manager and dispatch queue together, and serves the HTTP
//! ingress surface until an interrupt or terminate signal arrives.
//!
//! Grounded on the teacher's `crates/node/src/bin/signer.rs` shape (a
//! small `clap::Parser` options struct feeding a single long-lived async
//! service), with logging upgraded from the teacher CLI's `env_logger` to
//! `tracing-subscriber` per the gateway's ambient-stack choice (§4.9).

#![forbid(unsafe_code)]

use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use dispatch_queue::DispatchQueue;
use elpp_reassembler::DeviceTable;
use elpp_types::GatewayConfig;
use gateway_http::HttpServerConfig;
use tapos_manager::TaposManager;
use tracing_subscriber::EnvFilter;

/// The ELPP gateway: reassembles fragmented uplink payloads into
/// blockchain transactions and dispatches them to a chain's JSON-RPC API.
#[derive(Parser, Debug)]
#[command(name = "elpp-gateway", version, about)]
struct Args {
    /// Network interface name to bind to (its first IPv4 address is used),
    /// or a literal IP address.
    interface_or_ip: String,

    /// TCP port to listen on.
    port: u16,

    /// Path to the gateway's TOML configuration file.
    #[arg(long, env = "ELPP_CONFIG", default_value = "elpp-gateway.toml")]
    config: PathBuf,
}

fn main() -> ExitCode {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::from(1);
        }
    };

    init_tracing();

    let bind_ip = match resolve_bind_ip(&args.interface_or_ip) {
        Ok(ip) => ip,
        Err(err) => {
            eprintln!("error: {err}");
            return ExitCode::from(1);
        }
    };

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(err) => {
            eprintln!("error: failed to start the tokio runtime: {err}");
            return ExitCode::from(1);
        }
    };

    match runtime.block_on(run(bind_ip, args.port, &args.config)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(target: "elpp-gateway", error = %err, "gateway exited with an error");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// If `interface_or_ip` parses as an IP address, it is used literally;
/// otherwise it is looked up by name against the host's network
/// interfaces and its first IPv4 address is used (§6).
fn resolve_bind_ip(interface_or_ip: &str) -> Result<IpAddr> {
    if let Ok(ip) = interface_or_ip.parse::<IpAddr>() {
        return Ok(ip);
    }

    let interfaces = if_addrs::get_if_addrs().context("enumerating network interfaces")?;
    interfaces
        .into_iter()
        .find(|iface| iface.name == interface_or_ip && iface.addr.ip().is_ipv4())
        .map(|iface| iface.addr.ip())
        .ok_or_else(|| {
            anyhow!("'{interface_or_ip}' is neither a valid IP address nor a known network interface with an IPv4 address")
        })
}

/// Loads configuration from `path`, falling back to the built-in default
/// (no chains configured) if no file exists there — so a minimal
/// invocation with no `--config` still starts, just with nothing to poll
/// or dispatch to until a real config file is supplied.
fn load_config(path: &Path) -> Result<GatewayConfig> {
    if path.exists() {
        GatewayConfig::load(path).with_context(|| format!("loading configuration from {}", path.display()))
    } else {
        tracing::warn!(
            target: "elpp-gateway",
            path = %path.display(),
            "no configuration file found; starting with the built-in default (no chains configured)"
        );
        Ok(GatewayConfig::default())
    }
}

async fn run(bind_ip: IpAddr, port: u16, config_path: &Path) -> Result<()> {
    let gateway_config = load_config(config_path)?;

    let device_table = Arc::new(DeviceTable::new());
    let tapos_manager = Arc::new(TaposManager::new(&gateway_config).context("building TAPOS manager")?);
    let dispatch_queue = Arc::new(DispatchQueue::new());

    // One independent polling loop per configured chain (§4.5); the join
    // handles are held for the life of the process and aborted on drop.
    let _tapos_handles = tapos_manager.spawn_all();

    let http_config = HttpServerConfig {
        listen_addr: SocketAddr::new(bind_ip, port),
        ..HttpServerConfig::default()
    };

    gateway_http::run_server(
        &gateway_config,
        &http_config,
        device_table,
        tapos_manager,
        dispatch_queue,
        shutdown_signal(),
    )
    .await
}

/// Resolves once an interrupt (Ctrl-C) or, on Unix, a `SIGTERM` arrives.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install the ctrl-c signal handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install the SIGTERM signal handler")
            .recv()
            .await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    tracing::info!(target: "elpp-gateway", "shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_bind_ip_accepts_a_literal_ip() {
        let ip = resolve_bind_ip("127.0.0.1").unwrap();
        assert_eq!(ip, IpAddr::from([127, 0, 0, 1]));
    }

    #[test]
    fn resolve_bind_ip_rejects_an_unknown_name() {
        let err = resolve_bind_ip("definitely-not-a-real-interface-name").unwrap_err();
        assert!(err.to_string().contains("neither a valid IP address"));
    }

    #[test]
    fn missing_config_file_falls_back_to_the_built_in_default() {
        let cfg = load_config(Path::new("/nonexistent/elpp-gateway.toml")).unwrap();
        assert!(cfg.chains.is_empty());
        assert_eq!(cfg.elpp_port, 8);
    }
}
