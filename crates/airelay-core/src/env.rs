//! Environment abstraction for deterministic testing.
//!
//! Decouples session logic from system time. Heartbeat cadence uses the
//! monotonic clock; persisted-record staleness uses the wall clock (records
//! outlive the process, so a monotonic instant is meaningless there). A
//! backgrounded host may make either clock jump forward - accepted behavior.

use std::time::Duration;

/// Abstract environment providing time to the session state machine.
///
/// Production uses [`SystemEnv`]; tests use [`ManualEnv`] with manually
/// advanced clocks so heartbeat and staleness logic run without wall-clock
/// waits.
pub trait Environment: Clone + Send + Sync + 'static {
    /// The specific instant type used by this environment.
    type Instant: Copy + Ord + Send + Sync + std::ops::Sub<Output = Duration>;

    /// Current monotonic time.
    ///
    /// # Invariants
    ///
    /// - Returned values never decrease within a single execution context.
    fn now(&self) -> Self::Instant;

    /// Current wall-clock time as milliseconds since the Unix epoch.
    ///
    /// Used for persisted-record timestamps and credential expiry checks,
    /// both of which must survive process restarts.
    fn wall_clock_ms(&self) -> u64;

    /// Sleeps for the specified duration.
    ///
    /// The only async method in the trait; intended for driver code, not
    /// session logic.
    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send;
}

/// Production environment using real system clocks.
///
/// Uses `std::time::Instant::now()` for monotonic time, `SystemTime` for the
/// wall clock, and `tokio::time::sleep` for async sleeping.
///
/// # Panics
///
/// `wall_clock_ms` panics if the system clock reports a time before the Unix
/// epoch, which indicates a broken host.
#[derive(Clone, Default)]
pub struct SystemEnv;

impl SystemEnv {
    /// Create a new system environment.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Environment for SystemEnv {
    type Instant = std::time::Instant;

    fn now(&self) -> Self::Instant {
        std::time::Instant::now()
    }

    #[allow(clippy::expect_used)]
    fn wall_clock_ms(&self) -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("invariant: system clock is after Unix epoch (1970-01-01)")
            .as_millis() as u64
    }

    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }
}

/// Virtual instant for [`ManualEnv`], measured in milliseconds from an
/// arbitrary origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ManualInstant(u64);

impl std::ops::Sub for ManualInstant {
    type Output = Duration;

    fn sub(self, rhs: Self) -> Duration {
        Duration::from_millis(self.0.saturating_sub(rhs.0))
    }
}

/// Test environment with manually advanced clocks.
///
/// Both clocks start at fixed origins and only move when [`advance`] or
/// [`set_wall_clock_ms`] is called, so timing-dependent logic is fully
/// deterministic. Clones share the same underlying clocks.
///
/// [`advance`]: ManualEnv::advance
/// [`set_wall_clock_ms`]: ManualEnv::set_wall_clock_ms
#[derive(Clone, Default)]
pub struct ManualEnv {
    inner: std::sync::Arc<std::sync::Mutex<ManualClocks>>,
}

#[derive(Default)]
struct ManualClocks {
    mono_ms: u64,
    wall_ms: u64,
}

impl ManualEnv {
    /// Create a new manual environment with both clocks at zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance both clocks by the given duration.
    #[allow(clippy::expect_used)]
    pub fn advance(&self, duration: Duration) {
        let mut clocks = self.inner.lock().expect("clock mutex poisoned");
        let ms = duration.as_millis() as u64;
        clocks.mono_ms += ms;
        clocks.wall_ms += ms;
    }

    /// Set the wall clock to an absolute value, leaving monotonic time alone.
    ///
    /// Models a host whose wall clock is far from the test origin (e.g. a
    /// persisted record written "five minutes ago").
    #[allow(clippy::expect_used)]
    pub fn set_wall_clock_ms(&self, ms: u64) {
        self.inner.lock().expect("clock mutex poisoned").wall_ms = ms;
    }
}

impl Environment for ManualEnv {
    type Instant = ManualInstant;

    #[allow(clippy::expect_used)]
    fn now(&self) -> Self::Instant {
        ManualInstant(self.inner.lock().expect("clock mutex poisoned").mono_ms)
    }

    #[allow(clippy::expect_used)]
    fn wall_clock_ms(&self) -> u64 {
        self.inner.lock().expect("clock mutex poisoned").wall_ms
    }

    fn sleep(&self, _duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        std::future::ready(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_env_time_advances() {
        let env = SystemEnv::new();

        let t1 = env.now();
        std::thread::sleep(Duration::from_millis(10));
        let t2 = env.now();

        assert!(t2 > t1, "Time should advance");
    }

    #[test]
    fn manual_env_starts_at_zero_and_advances() {
        let env = ManualEnv::new();
        let t0 = env.now();

        env.advance(Duration::from_secs(30));
        let t1 = env.now();

        assert_eq!(t1 - t0, Duration::from_secs(30));
        assert_eq!(env.wall_clock_ms(), 30_000);
    }

    #[test]
    fn manual_env_clones_share_clocks() {
        let env = ManualEnv::new();
        let clone = env.clone();

        env.advance(Duration::from_millis(500));

        assert_eq!(clone.wall_clock_ms(), 500);
    }

    #[test]
    fn manual_wall_clock_is_settable_independently() {
        let env = ManualEnv::new();
        let before = env.now();

        env.set_wall_clock_ms(1_700_000_000_000);

        assert_eq!(env.wall_clock_ms(), 1_700_000_000_000);
        assert_eq!(env.now(), before);
    }
}
