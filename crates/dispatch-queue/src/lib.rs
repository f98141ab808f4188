//! Fire-and-forget dispatch of completed transactions to the chain.
//!
//! One FIFO per chain; a sweep claims every pending item and POSTs it to
//! that chain's most-recently-successful API host, removing the item
//! regardless of outcome. Devices are the retry mechanism, bounded by
//! TAPOS expiration.

#![forbid(unsafe_code)]

mod queue;
mod sweep;

pub use queue::{DispatchOutcome, DispatchQueue, QueueItem};
pub use sweep::{sweep, ApiHostSource};

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use elpp_types::{ChainId, DeviceKey};
    use serde_json::json;

    use super::*;

    struct FixedHosts(HashMap<u8, String>);

    impl ApiHostSource for FixedHosts {
        fn api_base_url(&self, chain: ChainId) -> Option<String> {
            self.0.get(&chain.0).cloned()
        }
    }

    #[test]
    fn push_increases_len_and_claim_marks_started() {
        let queue = DispatchQueue::new();
        assert!(queue.is_empty());
        queue.push(ChainId(1), json!({"a": 1}), DeviceKey::from("dev-1"), 1_000);
        assert_eq!(queue.len(), 1);

        let claimed = queue.claim_pending();
        assert_eq!(claimed.len(), 1);
        // still present (only removed by `remove`), but no longer claimable again.
        assert_eq!(queue.len(), 1);
        assert!(queue.claim_pending().is_empty());
    }

    #[tokio::test]
    async fn sweep_drops_item_with_no_api_host() {
        let queue = DispatchQueue::new();
        queue.push(ChainId(1), json!({"a": 1}), DeviceKey::from("dev-1"), 1_000);
        let hosts = FixedHosts(HashMap::new());
        let client = reqwest::Client::new();

        let outcomes = sweep(&client, &queue, &hosts).await;
        assert_eq!(outcomes.len(), 1);
        assert!(outcomes[0].result.is_err());
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn sweep_removes_item_even_on_transport_error() {
        let queue = DispatchQueue::new();
        queue.push(ChainId(1), json!({"a": 1}), DeviceKey::from("dev-1"), 1_000);
        let mut map = HashMap::new();
        map.insert(1u8, "http://127.0.0.1:1".to_string());
        let hosts = FixedHosts(map);
        let client = reqwest::Client::new();

        let outcomes = sweep(&client, &queue, &hosts).await;
        assert_eq!(outcomes.len(), 1);
        assert!(outcomes[0].result.is_err());
        assert!(queue.is_empty());
    }

    #[test]
    fn queues_are_independent_per_chain() {
        let queue = DispatchQueue::new();
        queue.push(ChainId(1), json!({}), DeviceKey::from("d1"), 1);
        queue.push(ChainId(2), json!({}), DeviceKey::from("d2"), 1);
        assert_eq!(queue.len(), 2);
        let claimed = queue.claim_pending();
        let chains: Vec<u8> = claimed.iter().map(|(c, _)| c.0).collect();
        assert!(chains.contains(&1));
        assert!(chains.contains(&2));
    }
}
