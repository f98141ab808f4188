//! Wakes the dispatch sweep after every ingress completion rather than
//! busy-polling: a `tokio::sync::Notify` is the whole scheduling mechanism,
//! running inside a single long-lived `tokio::spawn`ed loop.

use std::sync::Arc;

use dispatch_queue::{sweep, ApiHostSource, DispatchQueue};
use elpp_types::ChainId;
use tapos_manager::TaposManager;
use tokio::sync::Notify;

/// Adapts [`TaposManager::api_last`] to [`dispatch_queue::ApiHostSource`]
/// without coupling the dispatch-queue crate to the TAPOS manager's types.
pub struct TaposHostSource(pub Arc<TaposManager>);

impl ApiHostSource for TaposHostSource {
    fn api_base_url(&self, chain: ChainId) -> Option<String> {
        self.0.api_last(chain).map(|h| h.base_url())
    }
}

/// Spawns the dispatch worker loop: waits to be notified, then sweeps the
/// queue dry before waiting again.
pub fn spawn(
    client: reqwest::Client,
    queue: Arc<DispatchQueue>,
    hosts: Arc<TaposHostSource>,
    notify: Arc<Notify>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            notify.notified().await;
            while !queue.is_empty() {
                let outcomes = sweep(&client, &queue, hosts.as_ref()).await;
                for outcome in &outcomes {
                    match &outcome.result {
                        Ok(()) => tracing::debug!(
                            target: "dispatch",
                            chain = outcome.chain.0,
                            device = %outcome.device_key,
                            "dispatched"
                        ),
                        Err(e) => tracing::warn!(
                            target: "dispatch",
                            chain = outcome.chain.0,
                            device = %outcome.device_key,
                            error = %e,
                            "dispatch failed"
                        ),
                    }
                }
            }
        }
    })
}
