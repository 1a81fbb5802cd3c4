//! Persisted session store.
//!
//! Durable record of "the last outstanding request", written at the start of
//! a connect and consulted after a page reload to decide whether resumption
//! is possible. Wraps the injected [`KvStore`] capability; every persistence
//! failure is swallowed here (logged, never surfaced), because losing
//! durability must never break a live session.

use std::{sync::OnceLock, time::Duration};

use airelay_core::{KvError, KvStore};
use serde::{Deserialize, Serialize};

/// Suffix appended to the configured namespace to form the record key.
const RECORD_KEY_SUFFIX: &str = "pending_request";

/// Key used for the availability probe.
const PROBE_KEY_SUFFIX: &str = "__probe";

/// The durable request record.
///
/// Field names follow the storage wire shape shared with other consumers of
/// the same record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedRequest {
    /// Channel the request was routed through.
    pub channel_id: String,

    /// Credential used for the request. May be single-use depending on the
    /// deployment; [`load`] does not judge reusability.
    ///
    /// [`load`]: SessionStore::load
    pub credential: String,

    /// Wall-clock write time, milliseconds since the Unix epoch.
    pub timestamp_ms: u64,

    /// Explicit transport address override, when one was used.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transport_address: Option<String>,

    /// Explicit channel name override, when one was used.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel_name: Option<String>,
}

/// Key-value backed store for the persisted request record.
pub struct SessionStore<K: KvStore> {
    kv: K,
    namespace: String,
    available: OnceLock<bool>,
}

impl<K: KvStore> SessionStore<K> {
    /// Create a store over `kv`, namespacing all keys with `namespace`.
    pub fn new(kv: K, namespace: impl Into<String>) -> Self {
        Self { kv, namespace: namespace.into(), available: OnceLock::new() }
    }

    /// Whether the backing store works at all.
    ///
    /// Probes with a throwaway write/delete on first call and caches the
    /// answer for the lifetime of this store instance. Any probe failure is
    /// swallowed.
    pub fn is_available(&self) -> bool {
        *self.available.get_or_init(|| {
            let key = format!("{}{PROBE_KEY_SUFFIX}", self.namespace);
            match self.kv.set(&key, "1").and_then(|()| self.kv.remove(&key)) {
                Ok(()) => true,
                Err(e) => {
                    tracing::debug!(error = %e, "persisted store unavailable");
                    false
                },
            }
        })
    }

    /// Write a record for the given request with the current timestamp.
    ///
    /// No-op when the store is unavailable; write failures (e.g. quota
    /// exceeded) are swallowed.
    pub fn save(
        &self,
        channel_id: &str,
        credential: &str,
        transport_address: Option<&str>,
        channel_name: Option<&str>,
        now_ms: u64,
    ) {
        if !self.is_available() {
            return;
        }

        let record = PersistedRequest {
            channel_id: channel_id.to_owned(),
            credential: credential.to_owned(),
            timestamp_ms: now_ms,
            transport_address: transport_address.map(ToOwned::to_owned),
            channel_name: channel_name.map(ToOwned::to_owned),
        };

        let serialized = match serde_json::to_string(&record) {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(error = %e, "failed to serialize persisted request");
                return;
            },
        };

        if let Err(e) = self.kv.set(&self.record_key(), &serialized) {
            match e {
                KvError::QuotaExceeded | KvError::Unavailable => {
                    tracing::debug!(error = %e, "persisted request write dropped");
                },
                KvError::Backend(_) => {
                    tracing::error!(error = %e, "unexpected persisted request write failure");
                },
            }
        }
    }

    /// Load the record, evicting it when stale.
    ///
    /// Returns `None` when the store is unavailable, the record is absent or
    /// unparsable, or the record is older than `max_age` (in which case the
    /// stale record is also cleared as a side effect).
    pub fn load(&self, now_ms: u64, max_age: Duration) -> Option<PersistedRequest> {
        if !self.is_available() {
            return None;
        }

        let raw = match self.kv.get(&self.record_key()) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                tracing::debug!(error = %e, "persisted request read failed");
                return None;
            },
        };

        let record: PersistedRequest = match serde_json::from_str(&raw) {
            Ok(record) => record,
            Err(e) => {
                tracing::debug!(error = %e, "persisted request unparsable, discarding");
                self.clear();
                return None;
            },
        };

        let age_ms = now_ms.saturating_sub(record.timestamp_ms);
        if age_ms > max_age.as_millis() as u64 {
            tracing::debug!(age_ms, "persisted request stale, discarding");
            self.clear();
            return None;
        }

        Some(record)
    }

    /// Remove the record. Idempotent; failures are swallowed.
    pub fn clear(&self) {
        if let Err(e) = self.kv.remove(&self.record_key()) {
            tracing::debug!(error = %e, "persisted request clear failed");
        }
    }

    fn record_key(&self) -> String {
        format!("{}{RECORD_KEY_SUFFIX}", self.namespace)
    }
}

#[cfg(test)]
mod tests {
    use airelay_core::MemoryKv;

    use super::*;

    /// Store whose writes always fail; reads succeed.
    #[derive(Clone)]
    struct ReadOnlyKv(MemoryKv);

    impl KvStore for ReadOnlyKv {
        fn get(&self, key: &str) -> Result<Option<String>, KvError> {
            self.0.get(key)
        }

        fn set(&self, _key: &str, _value: &str) -> Result<(), KvError> {
            Err(KvError::QuotaExceeded)
        }

        fn remove(&self, key: &str) -> Result<(), KvError> {
            self.0.remove(key)
        }
    }

    #[test]
    fn save_then_load_round_trips() {
        let kv = MemoryKv::new();
        let store = SessionStore::new(kv, "t_");

        store.save("chan-1", "tok", Some("wss://x"), None, 10_000);

        let record = store.load(10_500, Duration::from_secs(300)).unwrap();
        assert_eq!(record.channel_id, "chan-1");
        assert_eq!(record.credential, "tok");
        assert_eq!(record.timestamp_ms, 10_000);
        assert_eq!(record.transport_address.as_deref(), Some("wss://x"));
        assert_eq!(record.channel_name, None);
    }

    #[test]
    fn load_evicts_stale_record() {
        let kv = MemoryKv::new();
        let store = SessionStore::new(kv.clone(), "t_");

        store.save("chan-1", "tok", None, None, 0);

        // One past the window: evicted, and the eviction is durable.
        assert!(store.load(300_001, Duration::from_millis(300_000)).is_none());
        assert!(kv.get("t_pending_request").unwrap().is_none());
    }

    #[test]
    fn load_at_exact_window_boundary_survives() {
        let kv = MemoryKv::new();
        let store = SessionStore::new(kv, "t_");

        store.save("chan-1", "tok", None, None, 0);

        assert!(store.load(300_000, Duration::from_millis(300_000)).is_some());
    }

    #[test]
    fn corrupt_record_is_discarded() {
        let kv = MemoryKv::new();
        kv.set("t_pending_request", "{not json").unwrap();
        let store = SessionStore::new(kv.clone(), "t_");

        assert!(store.load(0, Duration::from_secs(300)).is_none());
        assert!(kv.get("t_pending_request").unwrap().is_none());
    }

    #[test]
    fn unavailable_backend_makes_everything_a_noop() {
        #[derive(Clone)]
        struct DeadKv;

        impl KvStore for DeadKv {
            fn get(&self, _key: &str) -> Result<Option<String>, KvError> {
                Err(KvError::Unavailable)
            }
            fn set(&self, _key: &str, _value: &str) -> Result<(), KvError> {
                Err(KvError::Unavailable)
            }
            fn remove(&self, _key: &str) -> Result<(), KvError> {
                Err(KvError::Unavailable)
            }
        }

        let store = SessionStore::new(DeadKv, "t_");

        assert!(!store.is_available());
        store.save("c", "t", None, None, 0);
        assert!(store.load(0, Duration::from_secs(300)).is_none());
        store.clear();
    }

    #[test]
    fn quota_exceeded_write_is_swallowed() {
        let store = SessionStore::new(ReadOnlyKv(MemoryKv::new()), "t_");

        // Probe fails (writes rejected), so the store reports unavailable
        // and save degrades to a no-op without panicking.
        store.save("c", "t", None, None, 0);
        assert!(store.load(0, Duration::from_secs(300)).is_none());
    }

    #[test]
    fn clear_is_idempotent() {
        let store = SessionStore::new(MemoryKv::new(), "t_");

        store.save("c", "t", None, None, 0);
        store.clear();
        store.clear();

        assert!(store.load(0, Duration::from_secs(300)).is_none());
    }

    #[test]
    fn namespaces_isolate_records() {
        let kv = MemoryKv::new();
        let a = SessionStore::new(kv.clone(), "a_");
        let b = SessionStore::new(kv, "b_");

        a.save("chan-a", "tok", None, None, 0);

        assert!(a.load(0, Duration::from_secs(300)).is_some());
        assert!(b.load(0, Duration::from_secs(300)).is_none());
    }
}
