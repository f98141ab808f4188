//! The dispatch sweep: claims pending items and fires each at its chain's
//! known-good API host.

use elpp_types::{ChainId, DispatchError};

use crate::queue::{DispatchOutcome, DispatchQueue};

/// Supplies the dispatch sweep with each chain's most-recently-successful
/// API base URL (e.g. `"http://mainnet.telos.net"`), without coupling this
/// crate to the TAPOS manager's concrete state types.
pub trait ApiHostSource {
    fn api_base_url(&self, chain: ChainId) -> Option<String>;
}

/// Runs one dispatch sweep over every chain's queue.
///
/// For each claimed item: if the chain has no known-good host, the item is
/// dropped with [`DispatchError::NoApiHost`] (unconditional removal, same
/// as any other outcome — the device will resubmit). Otherwise POSTs `json`
/// to `<base_url>/v1/chain/send_transaction` and removes the item
/// regardless of the response.
pub async fn sweep(client: &reqwest::Client, queue: &DispatchQueue, hosts: &dyn ApiHostSource) -> Vec<DispatchOutcome> {
    let claimed = queue.claim_pending();
    let mut outcomes = Vec::with_capacity(claimed.len());

    for (chain, item) in claimed {
        let result = match hosts.api_base_url(chain) {
            None => Err(DispatchError::NoApiHost(chain)),
            Some(base_url) => send(client, &base_url, &item.json).await,
        };

        match &result {
            Ok(()) => tracing::debug!(target: "dispatch", chain = chain.0, device = %item.device_key, "transaction dispatched"),
            Err(e) => tracing::warn!(target: "dispatch", chain = chain.0, device = %item.device_key, error = %e, "dispatch failed"),
        }

        queue.remove(chain, item.id());
        outcomes.push(DispatchOutcome {
            chain,
            device_key: item.device_key.clone(),
            result,
        });
    }

    outcomes
}

async fn send(client: &reqwest::Client, base_url: &str, json: &serde_json::Value) -> Result<(), DispatchError> {
    let url = format!("{base_url}/v1/chain/send_transaction");
    let resp = client
        .post(&url)
        .header("Content-Type", "application/json")
        .json(json)
        .send()
        .await
        .map_err(|e| DispatchError::Transport(e.to_string()))?;

    if resp.status().is_success() {
        Ok(())
    } else {
        Err(DispatchError::Rejected(resp.status().as_u16()))
    }
}
