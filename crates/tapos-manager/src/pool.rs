//! The rotating, error-aware API host pool.
//!
//! A "decay a penalty counter on repeated skips" shape applied to host
//! *selection*: the `errors_max`/`check_max` quarantine rule behaves like a
//! stateful retry budget, but one paid out across selections rather than
//! within a single request's retry loop.

use rand::Rng;
use serde::Serialize;

use elpp_types::config::ApiPoolEntryConfig;

/// One entry in a chain's rotating API-host pool.
#[derive(Debug, Clone)]
pub struct ApiPoolEntry {
    /// HTTP method prefix, e.g. `"http://"`.
    pub method: String,
    /// Host (and optional port).
    pub host: String,
    /// Consecutive-ish error count; quarantined once this reaches `errors_max`.
    pub errors: u32,
    /// Selection-skip counter while quarantined; decays `errors` at `check_max`.
    pub check_count: u32,
    /// Number of times this entry has been selected (diagnostics only).
    pub use_count: u64,
    /// The chain node's reported version string, if ever observed.
    pub version_found: Option<String>,
}

impl ApiPoolEntry {
    fn new(cfg: &ApiPoolEntryConfig) -> Self {
        Self {
            method: cfg.method.clone(),
            host: cfg.host.clone(),
            errors: 0,
            check_count: 0,
            use_count: 0,
            version_found: None,
        }
    }

    /// An entry is quarantined while `errors >= errors_max`.
    fn is_quarantined(&self, errors_max: u32) -> bool {
        self.errors >= errors_max
    }

    /// `method ∥ host`, the prefix every outbound URL to this entry is built from.
    pub fn base_url(&self) -> String {
        format!("{}{}", self.method, self.host)
    }
}

/// An immutable snapshot of one API host, returned by [`ApiPool::select`] and
/// by the TAPOS manager's `api_last` query — cheap to clone and hand across
/// an `.await` point without holding the pool's lock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApiHost {
    /// HTTP method prefix, e.g. `"http://"`.
    pub method: String,
    /// Host (and optional port).
    pub host: String,
}

impl ApiHost {
    /// `method ∥ host`.
    pub fn base_url(&self) -> String {
        format!("{}{}", self.method, self.host)
    }
}

impl From<&ApiPoolEntry> for ApiHost {
    fn from(entry: &ApiPoolEntry) -> Self {
        Self {
            method: entry.method.clone(),
            host: entry.host.clone(),
        }
    }
}

/// The chain's rotating pool of API hosts, with quarantine decay and
/// uniform-random selection over eligible (non-quarantined) entries.
#[derive(Debug)]
pub struct ApiPool {
    entries: Vec<ApiPoolEntry>,
    errors_max: u32,
    check_max: u32,
    selection_draws: u32,
}

impl ApiPool {
    /// Builds a pool from configuration, starting every entry fresh (zero errors).
    pub fn new(configs: &[ApiPoolEntryConfig], errors_max: u32, check_max: u32, selection_draws: u32) -> Self {
        Self {
            entries: configs.iter().map(ApiPoolEntry::new).collect(),
            errors_max,
            check_max,
            selection_draws,
        }
    }

    /// Applies the quarantine-decay rule to every entry, then performs up to
    /// `selection_draws` uniform draws, rejecting quarantined entries,
    /// returning the index of the first eligible draw.
    ///
    /// Returns `None` (ApiPoolExhausted) if every draw lands on a
    /// still-quarantined entry or the pool is empty.
    pub fn select(&mut self) -> Option<ApiHost> {
        if self.entries.is_empty() {
            return None;
        }
        for entry in &mut self.entries {
            if entry.is_quarantined(self.errors_max) {
                entry.check_count += 1;
                if entry.check_count >= self.check_max {
                    entry.errors = entry.errors.saturating_sub(1);
                    entry.check_count = 0;
                }
            }
        }

        let mut rng = rand::thread_rng();
        for _ in 0..self.selection_draws {
            let idx = rng.gen_range(0..self.entries.len());
            if !self.entries[idx].is_quarantined(self.errors_max) {
                self.entries[idx].use_count += 1;
                return Some(ApiHost::from(&self.entries[idx]));
            }
        }
        None
    }

    /// Records a successful poll against `host`: decrements its error count
    /// (floor 0) and stamps the reported version string.
    pub fn record_success(&mut self, host: &ApiHost, version: Option<String>) {
        if let Some(entry) = self.find_mut(host) {
            entry.errors = entry.errors.saturating_sub(1);
            if version.is_some() {
                entry.version_found = version;
            }
        }
    }

    /// Records a failed poll against `host`: increments its error count.
    pub fn record_error(&mut self, host: &ApiHost) {
        if let Some(entry) = self.find_mut(host) {
            entry.errors += 1;
        }
    }

    fn find_mut(&mut self, host: &ApiHost) -> Option<&mut ApiPoolEntry> {
        self.entries
            .iter_mut()
            .find(|e| e.method == host.method && e.host == host.host)
    }

    /// A JSON-friendly snapshot of every entry, for the
    /// `/api/tapos_manager_state` introspection route.
    pub fn entries(&self) -> &[ApiPoolEntry] {
        &self.entries
    }
}

impl Serialize for ApiPoolEntry {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct;
        let mut s = serializer.serialize_struct("ApiPoolEntry", 6)?;
        s.serialize_field("method", &self.method)?;
        s.serialize_field("host", &self.host)?;
        s.serialize_field("errors", &self.errors)?;
        s.serialize_field("check_count", &self.check_count)?;
        s.serialize_field("use_count", &self.use_count)?;
        s.serialize_field("version_found", &self.version_found)?;
        s.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(host: &str) -> ApiPoolEntryConfig {
        ApiPoolEntryConfig {
            method: "http://".to_string(),
            host: host.to_string(),
        }
    }

    #[test]
    fn fairness_over_many_draws() {
        let mut pool = ApiPool::new(&[cfg("a"), cfg("b"), cfg("c")], 5, 10, 10);
        let mut counts = [0u32; 3];
        for _ in 0..30_000 {
            let host = pool.select().unwrap();
            let idx = ["a", "b", "c"].iter().position(|h| *h == host.host).unwrap();
            counts[idx] += 1;
        }
        for c in counts {
            let frac = c as f64 / 30_000.0;
            assert!((frac - 1.0 / 3.0).abs() < 0.02, "unfair distribution: {counts:?}");
        }
    }

    #[test]
    fn quarantine_excludes_entry_until_check_max_skips() {
        let mut pool = ApiPool::new(&[cfg("a"), cfg("b")], 5, 10, 10);
        let bad = ApiHost {
            method: "http://".to_string(),
            host: "a".to_string(),
        };
        for _ in 0..5 {
            pool.record_error(&bad);
        }
        assert_eq!(pool.entries()[0].errors, 5);

        // While quarantined, every selection must resolve to "b" (or fail
        // outright if the single eligible entry isn't drawn within budget,
        // which practically never happens with 10 draws and 1 live entry).
        for _ in 0..9 {
            let host = pool.select().unwrap();
            assert_eq!(host.host, "b");
        }
        // The 9 selection calls above drove 9 decay-check increments on "a"
        // (one per `select` call, regardless of whether "a" was drawn this
        // time) — one short of CHECK_MAX(10), so it must still be quarantined.
        assert_eq!(pool.entries()[0].check_count, 9);
        assert_eq!(pool.entries()[0].errors, 5);

        // The 10th selection call decays the counter: errors drops to 4 and
        // "a" becomes eligible again.
        pool.select();
        assert_eq!(pool.entries()[0].check_count, 0);
        assert_eq!(pool.entries()[0].errors, 4);
    }

    #[test]
    fn record_success_decrements_errors_with_floor_zero() {
        let mut pool = ApiPool::new(&[cfg("a")], 5, 10, 10);
        let host = ApiHost {
            method: "http://".to_string(),
            host: "a".to_string(),
        };
        pool.record_success(&host, Some("v1.0".to_string()));
        assert_eq!(pool.entries()[0].errors, 0);
        assert_eq!(pool.entries()[0].version_found.as_deref(), Some("v1.0"));
    }

    #[test]
    fn empty_pool_selection_fails() {
        let mut pool = ApiPool::new(&[], 5, 10, 10);
        assert!(pool.select().is_none());
    }
}
