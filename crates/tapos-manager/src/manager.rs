//! One independent control loop per chain, maintaining freshest TAPOS
//! reference-block metadata by polling the chain's API pool.
//!
//! Each chain gets its own `tokio::spawn`ed loop owning its own reschedule
//! logic, built around a single `poll_once` tick driven by a caller-owned
//! loop so it can be exercised deterministically in tests without a real
//! timer.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use elpp_types::{ChainConfig, ChainId, GatewayConfig, TaposError, TaposTuning};
use rand::Rng;

use crate::pool::{ApiHost, ApiPool};
use crate::state::{ChainState, ChainStateSummary, TaposSnapshot};

/// Holds every chain's [`ChainState`] and the shared HTTP client used to
/// poll all of them.
///
/// A single shared, connection-pooling `reqwest::Client` per process is
/// constructed once in [`TaposManager::new`] with the configured
/// connect/read deadline, rather than built per request.
pub struct TaposManager {
    chains: HashMap<u8, Arc<ChainState>>,
    client: reqwest::Client,
    tuning: TaposTuning,
}

impl TaposManager {
    /// Builds a manager for every chain in `config`, with one independent
    /// `ApiPool` per chain.
    pub fn new(config: &GatewayConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.outbound_deadline_secs))
            .timeout(Duration::from_secs(config.outbound_deadline_secs))
            .build()?;

        let chains = config
            .chains
            .iter()
            .map(|(id, chain_cfg): (&u8, &ChainConfig)| {
                let pool = ApiPool::new(
                    &chain_cfg.api_pool,
                    config.tapos.errors_max,
                    config.tapos.check_max,
                    config.tapos.selection_draws,
                );
                let state = Arc::new(ChainState::new(chain_cfg.expected_chain_hash.clone(), pool));
                (*id, state)
            })
            .collect();

        Ok(Self {
            chains,
            client,
            tuning: config.tapos.clone(),
        })
    }

    /// The configured chain ids this manager polls.
    pub fn chain_ids(&self) -> Vec<ChainId> {
        self.chains.keys().map(|id| ChainId(*id)).collect()
    }

    fn state(&self, chain: ChainId) -> Option<&Arc<ChainState>> {
        self.chains.get(&chain.0)
    }

    /// Returns the current TAPOS snapshot for `chain`, if one has been acquired.
    pub fn tapos(&self, chain: ChainId) -> Option<TaposSnapshot> {
        self.state(chain).and_then(|s| s.tapos())
    }

    /// Returns the chain's most-recently-successful API host, for dispatch.
    pub fn api_last(&self, chain: ChainId) -> Option<ApiHost> {
        self.state(chain).and_then(|s| s.api_last())
    }

    /// A JSON-friendly snapshot of every chain's state, for the
    /// `/api/tapos_manager_state` introspection route.
    pub fn summary(&self) -> HashMap<u8, ChainStateSummary> {
        self.chains.iter().map(|(id, s)| (*id, s.summary())).collect()
    }

    /// Runs one poll attempt against `chain`: selects a host, issues
    /// `get_info`, and on success/error updates the chain's state. Returns
    /// the delay until the next tick should fire.
    pub async fn poll_once(&self, chain: ChainId, now_epoch: u64) -> Duration {
        let Some(state) = self.state(chain) else {
            return self.error_delay();
        };

        let host = match state.select_host() {
            Some(h) => h,
            None => {
                tracing::warn!(target: "tapos-manager", chain = chain.0, "api pool exhausted: {}", TaposError::PoolExhausted(chain));
                return self.error_delay();
            }
        };

        match crate::poll::poll_get_info(&self.client, &host, chain, &state.expected_chain_hash, now_epoch).await {
            Ok((snapshot, version)) => {
                tracing::debug!(
                    target: "tapos-manager",
                    chain = chain.0,
                    host = %host.host,
                    ref_block_num = snapshot.ref_block_num,
                    "tapos refreshed"
                );
                state.commit_success(snapshot, host, version);
                self.success_delay()
            }
            Err(err) => {
                tracing::warn!(target: "tapos-manager", chain = chain.0, host = %host.host, error = %err, "get_info poll failed");
                state.record_error(&host);
                self.error_delay()
            }
        }
    }

    fn success_delay(&self) -> Duration {
        random_delay(self.tuning.success_min_secs, self.tuning.success_max_secs)
    }

    fn error_delay(&self) -> Duration {
        random_delay(self.tuning.error_min_secs, self.tuning.error_max_secs)
    }

    /// Spawns one `tokio::spawn`ed loop per chain, each re-arming its own
    /// `tokio::time::sleep` with the delay `poll_once` returns. Returns the
    /// join handles so the caller can hold (and, for graceful shutdown,
    /// abort) them.
    pub fn spawn_all(self: &Arc<Self>) -> Vec<tokio::task::JoinHandle<()>> {
        self.chain_ids()
            .into_iter()
            .map(|chain| {
                let manager = Arc::clone(self);
                tokio::spawn(async move {
                    loop {
                        let now_epoch = std::time::SystemTime::now()
                            .duration_since(std::time::UNIX_EPOCH)
                            .map(|d| d.as_secs())
                            .unwrap_or(0);
                        let delay = manager.poll_once(chain, now_epoch).await;
                        tokio::time::sleep(delay).await;
                    }
                })
            })
            .collect()
    }
}

fn random_delay(min_secs: u64, max_secs: u64) -> Duration {
    if max_secs <= min_secs {
        return Duration::from_secs(min_secs);
    }
    let secs = rand::thread_rng().gen_range(min_secs..max_secs);
    Duration::from_secs(secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn config_with_one_chain(host: &str) -> GatewayConfig {
        let toml_src = format!(
            r#"
            [chains.1]
            expected_chain_hash = "abc123"

            [[chains.1.api_pool]]
            host = "{host}"
            "#
        );
        toml::from_str(&toml_src).expect("parse")
    }

    #[test]
    fn success_delay_is_within_configured_bounds() {
        let config = config_with_one_chain("example.test");
        let manager = TaposManager::new(&config).unwrap();
        for _ in 0..50 {
            let d = manager.success_delay();
            assert!(d.as_secs() >= 300 && d.as_secs() < 600);
        }
    }

    #[test]
    fn error_delay_is_within_configured_bounds() {
        let config = config_with_one_chain("example.test");
        let manager = TaposManager::new(&config).unwrap();
        for _ in 0..50 {
            let d = manager.error_delay();
            assert!(d.as_secs() >= 10 && d.as_secs() < 30);
        }
    }

    #[tokio::test]
    async fn poll_against_unreachable_host_records_an_error() {
        let config = config_with_one_chain("127.0.0.1:1");
        let manager = TaposManager::new(&config).unwrap();
        manager.poll_once(ChainId(1), 1_000).await;
        let summary = manager.summary();
        assert_eq!(summary[&1].api_pool[0].errors, 1);
        assert!(manager.tapos(ChainId(1)).is_none());
    }

    #[test]
    fn chain_ids_reflects_configuration() {
        let mut chains = BTreeMap::new();
        chains.insert(
            1u8,
            ChainConfig {
                expected_chain_hash: "abc".to_string(),
                api_pool: vec![],
            },
        );
        let config = GatewayConfig {
            elpp_port: 8,
            purge_age_secs: 300,
            request_deadline_secs: 30,
            outbound_deadline_secs: 20,
            tapos: TaposTuning::default(),
            chains,
        };
        let manager = TaposManager::new(&config).unwrap();
        assert_eq!(manager.chain_ids(), vec![ChainId(1)]);
    }
}
