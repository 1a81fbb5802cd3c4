//! Key-value storage capability.
//!
//! The session controller persists its "last outstanding request" record
//! through this trait instead of reaching for ambient browser storage, so the
//! state machine is testable without a host environment and alternative
//! backing stores are drop-in.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use thiserror::Error;

/// Errors from a key-value backend.
///
/// Callers in this workspace treat every variant as non-fatal: persistence
/// failures are swallowed and logged, never surfaced to application code.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum KvError {
    /// The backing store cannot be used at all (e.g. storage disabled by the
    /// host).
    #[error("storage backend unavailable")]
    Unavailable,

    /// A write was rejected for capacity reasons (quota exceeded).
    #[error("storage quota exceeded")]
    QuotaExceeded,

    /// Any other backend failure.
    #[error("storage operation failed: {0}")]
    Backend(String),
}

/// Injected key-value storage capability.
///
/// Must be Clone (shared between the controller and test assertions),
/// Send + Sync, and synchronous - reads and writes block the calling turn.
/// No transactional guarantee beyond last-write-wins; concurrent consumers
/// sharing a namespace may race (documented limitation, not solved here).
pub trait KvStore: Clone + Send + Sync + 'static {
    /// Read the value stored under `key`. `None` if absent.
    fn get(&self, key: &str) -> Result<Option<String>, KvError>;

    /// Store `value` under `key`, overwriting any previous value.
    fn set(&self, key: &str, value: &str) -> Result<(), KvError>;

    /// Remove `key`. Removing an absent key is not an error.
    fn remove(&self, key: &str) -> Result<(), KvError>;
}

/// In-memory key-value store for testing and embedded use.
///
/// All state is behind Arc<Mutex<>> so clones access the same underlying
/// map, mirroring how a shared host store behaves.
#[derive(Clone, Default)]
pub struct MemoryKv {
    inner: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryKv {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys. Useful in tests.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned. Acceptable for test code.
    #[allow(clippy::expect_used)]
    pub fn len(&self) -> usize {
        self.inner.lock().expect("kv mutex poisoned").len()
    }

    /// True when no keys are stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KvStore for MemoryKv {
    #[allow(clippy::expect_used)]
    fn get(&self, key: &str) -> Result<Option<String>, KvError> {
        Ok(self.inner.lock().expect("kv mutex poisoned").get(key).cloned())
    }

    #[allow(clippy::expect_used)]
    fn set(&self, key: &str, value: &str) -> Result<(), KvError> {
        self.inner.lock().expect("kv mutex poisoned").insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    #[allow(clippy::expect_used)]
    fn remove(&self, key: &str) -> Result<(), KvError> {
        self.inner.lock().expect("kv mutex poisoned").remove(key);
        Ok(())
    }
}
