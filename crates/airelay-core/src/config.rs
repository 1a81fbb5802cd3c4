//! Session configuration.
//!
//! Immutable after construction. All fields have defaults; callers overlay
//! only the fields they care about with struct-update syntax:
//!
//! ```
//! use airelay_core::SessionConfig;
//!
//! let config = SessionConfig { debug: true, ..SessionConfig::default() };
//! assert_eq!(config.heartbeat_interval, SessionConfig::default().heartbeat_interval);
//! ```

use std::time::Duration;

/// Default real-time transport address.
pub const DEFAULT_TRANSPORT_URL: &str = "wss://realtime.airelay.io/socket";

/// Default storage key namespace.
pub const DEFAULT_STORAGE_PREFIX: &str = "airelay_";

/// Default heartbeat cadence.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_millis(30_000);

/// Default request staleness window, used both as the persisted-record max
/// age and as the documented request timeout.
pub const DEFAULT_STALENESS_WINDOW: Duration = Duration::from_millis(300_000);

/// Configuration for one session controller instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Where the real-time transport connects unless a connect request
    /// overrides it.
    pub transport_url: String,

    /// HTTP base address for backend-assisted reconnection. `None` disables
    /// that path.
    pub assist_base_url: Option<String>,

    /// Gates informational logging; error logs are always emitted.
    pub debug: bool,

    /// Enables the persisted session store.
    pub persist: bool,

    /// Namespace prefix isolating concurrent sessions sharing one store.
    pub storage_prefix: String,

    /// Heartbeat cadence once a channel join succeeds.
    pub heartbeat_interval: Duration,

    /// Maximum age of a persisted request record before it is considered
    /// stale and evicted.
    pub staleness_window: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            transport_url: DEFAULT_TRANSPORT_URL.to_owned(),
            assist_base_url: None,
            debug: false,
            persist: true,
            storage_prefix: DEFAULT_STORAGE_PREFIX.to_owned(),
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            staleness_window: DEFAULT_STALENESS_WINDOW,
        }
    }
}
