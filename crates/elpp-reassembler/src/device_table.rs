//! The process-wide table of per-device states.
//!
//! Grounded on the teacher's `DashMap`-keyed-by-client rate limiter in
//! `http-rpc-gateway` (`Arc<DashMap<IpAddr, Bucket>>`): a sharded concurrent
//! map gives lock-free lookup of the right per-key lock, while the
//! reassembly work itself stays serialized per device behind a
//! `parking_lot::Mutex` (cheap to acquire for CPU-only critical sections,
//! never held across an `.await`).

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use elpp_types::DeviceKey;
use parking_lot::Mutex;

use crate::record::{DeviceState, TrxRecordSummary};

/// Process-wide table of device states, created lazily per device key.
#[derive(Default)]
pub struct DeviceTable {
    devices: DashMap<DeviceKey, Arc<Mutex<DeviceState>>>,
}

impl DeviceTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self {
            devices: DashMap::new(),
        }
    }

    /// Returns the device's state handle, creating an empty one if this is
    /// the device's first uplink.
    pub fn get_or_create(&self, key: &DeviceKey) -> Arc<Mutex<DeviceState>> {
        self.devices
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(DeviceState::new())))
            .clone()
    }

    /// A JSON-friendly snapshot of every known device's in-flight records,
    /// for the `/api/device_states` introspection route.
    pub fn summary(&self) -> HashMap<String, HashMap<u8, TrxRecordSummary>> {
        self.devices
            .iter()
            .map(|entry| (entry.key().0.clone(), entry.value().lock().summary()))
            .collect()
    }

    /// Number of devices with any recorded state (test/introspection helper).
    pub fn device_count(&self) -> usize {
        self.devices.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_key_returns_same_handle() {
        let table = DeviceTable::new();
        let key = DeviceKey::from("dev-1");
        let a = table.get_or_create(&key);
        let b = table.get_or_create(&key);
        a.lock().record_mut(0).last_epoch = 42;
        assert_eq!(b.lock().record_mut(0).last_epoch, 42);
        assert_eq!(table.device_count(), 1);
    }
}
