//! Wall-clock access for cache expiry decisions.
//!
//! Every TTL comparison in the cache tiers goes through a [`Clock`] so tests
//! can move time forward without sleeping. Pacing and rate-limit waits use
//! `tokio::time` instead and are tested with paused runtime time.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Source of "now" in Unix milliseconds.
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// Returns the current time as milliseconds since the Unix epoch.
    fn now_millis(&self) -> u64;
}

/// Clock backed by `SystemTime::now()`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    #[allow(clippy::cast_possible_truncation)]
    fn now_millis(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

/// Manually advanced clock for tests and deterministic replays.
#[derive(Debug, Default)]
pub struct ManualClock {
    now_ms: AtomicU64,
}

impl ManualClock {
    /// Creates a clock frozen at `start_ms`.
    #[must_use]
    pub fn new(start_ms: u64) -> Self {
        Self {
            now_ms: AtomicU64::new(start_ms),
        }
    }

    /// Moves the clock forward.
    #[allow(clippy::cast_possible_truncation)]
    pub fn advance(&self, by: Duration) {
        self.now_ms
            .fetch_add(by.as_millis() as u64, Ordering::SeqCst);
    }

    /// Sets the clock to an absolute instant.
    pub fn set(&self, now_ms: u64) {
        self.now_ms.store(now_ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> u64 {
        self.now_ms.load(Ordering::SeqCst)
    }
}

/// Returns true when `captured_at_ms` is older than `ttl` relative to `now_ms`.
///
/// Timestamps from the future (clock skew between writers) count as fresh.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn is_expired(captured_at_ms: u64, now_ms: u64, ttl: Duration) -> bool {
    now_ms.saturating_sub(captured_at_ms) > ttl.as_millis() as u64
}
