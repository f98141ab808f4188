//! Shared configuration structures for the ELPP gateway.
//!
//! Loaded from a TOML file (see [`GatewayConfig::load`]) with documented
//! defaults for every tunable so a minimal or even empty file still
//! produces a runnable configuration.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::ids::ChainId;

/// Default ELPP port carried in the ingress envelope's `port` field.
pub fn default_elpp_port() -> u16 {
    8
}

/// Default age, in seconds, after which an in-flight transaction record is purged.
pub fn default_purge_age_secs() -> u64 {
    300
}

/// Default ingress request-level deadline, in seconds.
pub fn default_request_deadline_secs() -> u64 {
    30
}

/// Default outbound HTTP connect+read deadline, in seconds.
pub fn default_outbound_deadline_secs() -> u64 {
    20
}

/// Default lower bound, in seconds, of the TAPOS poll interval after a success.
pub fn default_tapos_success_min_secs() -> u64 {
    5 * 60
}

/// Default upper bound, in seconds, of the TAPOS poll interval after a success.
pub fn default_tapos_success_max_secs() -> u64 {
    10 * 60
}

/// Default lower bound, in seconds, of the TAPOS poll interval after an error.
pub fn default_tapos_error_min_secs() -> u64 {
    10
}

/// Default upper bound, in seconds, of the TAPOS poll interval after an error.
pub fn default_tapos_error_max_secs() -> u64 {
    30
}

/// Default error threshold at which an API pool entry becomes quarantined.
pub fn default_errors_max() -> u32 {
    5
}

/// Default number of selection skips a quarantined entry must endure before
/// its error count decays.
pub fn default_check_max() -> u32 {
    10
}

/// Default max draws per selection attempt before giving up.
pub fn default_selection_draws() -> u32 {
    10
}

/// One entry in a chain's rotating API-host pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiPoolEntryConfig {
    /// HTTP method prefix, e.g. `"http://"` or `"https://"`.
    #[serde(default = "default_method")]
    pub method: String,
    /// Host (and optional port), e.g. `"mainnet.telos.net"`.
    pub host: String,
}

fn default_method() -> String {
    "http://".to_string()
}

/// Per-chain configuration: expected chain-id hash and its API pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    /// The `chain_id` hex string the chain's `get_info` responses must match.
    pub expected_chain_hash: String,
    /// The rotating pool of API hosts polled for TAPOS and used for dispatch.
    pub api_pool: Vec<ApiPoolEntryConfig>,
}

/// Top-level gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// The ELPP port uplink envelopes must declare.
    #[serde(default = "default_elpp_port")]
    pub elpp_port: u16,
    /// Age, in seconds, after which an in-flight transaction record is purged.
    #[serde(default = "default_purge_age_secs")]
    pub purge_age_secs: u64,
    /// Ingress request-level deadline, in seconds.
    #[serde(default = "default_request_deadline_secs")]
    pub request_deadline_secs: u64,
    /// Outbound HTTP (get_info / send_transaction / downlink) connect+read deadline, in seconds.
    #[serde(default = "default_outbound_deadline_secs")]
    pub outbound_deadline_secs: u64,
    /// TAPOS polling tunables.
    #[serde(default)]
    pub tapos: TaposTuning,
    /// Per-chain configuration, keyed by chain id.
    pub chains: BTreeMap<u8, ChainConfig>,
}

/// TAPOS manager timing and quarantine tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaposTuning {
    /// Lower bound, in seconds, of the post-success poll interval.
    #[serde(default = "default_tapos_success_min_secs")]
    pub success_min_secs: u64,
    /// Upper bound, in seconds, of the post-success poll interval.
    #[serde(default = "default_tapos_success_max_secs")]
    pub success_max_secs: u64,
    /// Lower bound, in seconds, of the post-error poll interval.
    #[serde(default = "default_tapos_error_min_secs")]
    pub error_min_secs: u64,
    /// Upper bound, in seconds, of the post-error poll interval.
    #[serde(default = "default_tapos_error_max_secs")]
    pub error_max_secs: u64,
    /// Error count at which a pool entry becomes quarantined (`ERRORS_MAX`).
    #[serde(default = "default_errors_max")]
    pub errors_max: u32,
    /// Skips a quarantined entry must endure before decay (`CHECK_MAX`).
    #[serde(default = "default_check_max")]
    pub check_max: u32,
    /// Max random draws attempted per selection before failing.
    #[serde(default = "default_selection_draws")]
    pub selection_draws: u32,
}

impl Default for TaposTuning {
    fn default() -> Self {
        Self {
            success_min_secs: default_tapos_success_min_secs(),
            success_max_secs: default_tapos_success_max_secs(),
            error_min_secs: default_tapos_error_min_secs(),
            error_max_secs: default_tapos_error_max_secs(),
            errors_max: default_errors_max(),
            check_max: default_check_max(),
            selection_draws: default_selection_draws(),
        }
    }
}

impl Default for GatewayConfig {
    /// The built-in configuration used when no config file is found: every
    /// tunable at its documented default and no chains configured (so the
    /// TAPOS manager and dispatch queue simply have nothing to poll or
    /// forward to until a real config file is supplied).
    fn default() -> Self {
        Self {
            elpp_port: default_elpp_port(),
            purge_age_secs: default_purge_age_secs(),
            request_deadline_secs: default_request_deadline_secs(),
            outbound_deadline_secs: default_outbound_deadline_secs(),
            tapos: TaposTuning::default(),
            chains: BTreeMap::new(),
        }
    }
}

impl GatewayConfig {
    /// Loads configuration from a TOML file at `path`.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            anyhow::anyhow!("failed to read config file {:?}: {e}", path.as_ref())
        })?;
        let cfg: Self = toml::from_str(&raw)
            .map_err(|e| anyhow::anyhow!("failed to parse config file {:?}: {e}", path.as_ref()))?;
        Ok(cfg)
    }

    /// Looks up a chain's configuration by id.
    pub fn chain(&self, chain: ChainId) -> Option<&ChainConfig> {
        self.chains.get(&chain.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_toml_fills_in_defaults() {
        let toml_src = r#"
            [chains.1]
            expected_chain_hash = "4667b205c6838ef70ff7988f6e8257e8be0e1284a2f59699054a018f95b6cba"

            [[chains.1.api_pool]]
            host = "mainnet.telos.net"
        "#;
        let cfg: GatewayConfig = toml::from_str(toml_src).expect("parse");
        assert_eq!(cfg.elpp_port, 8);
        assert_eq!(cfg.purge_age_secs, 300);
        assert_eq!(cfg.tapos.errors_max, 5);
        assert_eq!(cfg.tapos.check_max, 10);
        let chain = cfg.chain(ChainId(1)).expect("chain 1");
        assert_eq!(chain.api_pool.len(), 1);
        assert_eq!(chain.api_pool[0].method, "http://");
    }
}
