//! Global request spacing for the upstream bibliographic API.
//!
//! The upstream publishes a per-second quota that applies to the caller as a
//! whole, not to individual operations. A single [`RateLimiter`] is therefore
//! shared by every component that talks to the upstream (search, summaries,
//! abstract enrichment, identifier conversion).
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use std::time::Duration;
//! use litgate_core::upstream::RateLimiter;
//!
//! # async fn example() {
//! let limiter = Arc::new(RateLimiter::new(Duration::from_millis(334)));
//!
//! // First call proceeds immediately
//! limiter.acquire().await;
//!
//! // Second call waits until 334ms have passed since the first dispatch
//! limiter.acquire().await;
//! # }
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, instrument, warn};

/// Minimum spacing without an access token (3 requests per second).
pub const ANONYMOUS_MIN_INTERVAL: Duration = Duration::from_millis(334);

/// Minimum spacing with an access token (10 requests per second).
pub const KEYED_MIN_INTERVAL: Duration = Duration::from_millis(100);

/// Warning threshold for cumulative throttling delay (30 seconds).
const CUMULATIVE_DELAY_WARNING_THRESHOLD: Duration = Duration::from_secs(30);

/// Process-wide limiter enforcing a minimum interval between upstream dispatches.
///
/// The last dispatch time lives behind a `tokio::sync::Mutex` that is held
/// across the wait, so check-and-set is atomic even on the multi-threaded
/// runtime: concurrent callers queue on the lock in arrival order and each
/// one observes the dispatch time recorded by its predecessor.
#[derive(Debug)]
pub struct RateLimiter {
    /// Minimum time between two dispatches.
    min_interval: Duration,

    /// Whether throttling is disabled (tests, offline replays).
    disabled: bool,

    /// Time of the last dispatch; `None` until the first call.
    last_dispatch: Mutex<Option<Instant>>,

    /// Total delay imposed so far, in milliseconds.
    cumulative_delay_ms: AtomicU64,

    /// Number of dispatches recorded.
    dispatches: AtomicU64,
}

impl RateLimiter {
    /// Creates a limiter with the given minimum interval.
    #[must_use]
    #[instrument(skip_all, fields(interval_ms = min_interval.as_millis()))]
    pub fn new(min_interval: Duration) -> Self {
        debug!("creating upstream rate limiter");
        Self {
            min_interval,
            disabled: false,
            last_dispatch: Mutex::new(None),
            cumulative_delay_ms: AtomicU64::new(0),
            dispatches: AtomicU64::new(0),
        }
    }

    /// Creates a limiter sized for the upstream quota tier.
    #[must_use]
    pub fn for_quota(has_api_key: bool) -> Self {
        if has_api_key {
            Self::new(KEYED_MIN_INTERVAL)
        } else {
            Self::new(ANONYMOUS_MIN_INTERVAL)
        }
    }

    /// Creates a limiter that never waits.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            min_interval: Duration::ZERO,
            disabled: true,
            last_dispatch: Mutex::new(None),
            cumulative_delay_ms: AtomicU64::new(0),
            dispatches: AtomicU64::new(0),
        }
    }

    /// Returns whether throttling is disabled.
    #[must_use]
    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    /// Returns the configured minimum interval.
    #[must_use]
    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Number of dispatches recorded since construction.
    #[must_use]
    pub fn dispatch_count(&self) -> u64 {
        self.dispatches.load(Ordering::SeqCst)
    }

    /// Total throttling delay imposed since construction.
    #[must_use]
    pub fn cumulative_delay(&self) -> Duration {
        Duration::from_millis(self.cumulative_delay_ms.load(Ordering::SeqCst))
    }

    /// Waits until `min_interval` has elapsed since the previous dispatch,
    /// then records the new dispatch time.
    ///
    /// Never fails; under contention it only waits longer.
    #[instrument(level = "trace", skip(self))]
    pub async fn acquire(&self) {
        self.dispatches.fetch_add(1, Ordering::SeqCst);
        if self.disabled {
            return;
        }

        let mut last_dispatch = self.last_dispatch.lock().await;

        if let Some(previous) = *last_dispatch {
            let elapsed = previous.elapsed();
            if elapsed < self.min_interval {
                let delay = self.min_interval.saturating_sub(elapsed);
                let cumulative = self.add_cumulative_delay(delay);

                debug!(
                    delay_ms = delay.as_millis(),
                    cumulative_ms = cumulative.as_millis(),
                    "throttling upstream request"
                );

                if cumulative >= CUMULATIVE_DELAY_WARNING_THRESHOLD
                    && cumulative.saturating_sub(delay) < CUMULATIVE_DELAY_WARNING_THRESHOLD
                {
                    warn!(
                        cumulative_delay_secs = cumulative.as_secs(),
                        "excessive upstream throttling - consider configuring an API key"
                    );
                }

                tokio::time::sleep(delay).await;
            }
        }

        *last_dispatch = Some(Instant::now());
    }

    #[allow(clippy::cast_possible_truncation)]
    fn add_cumulative_delay(&self, delay: Duration) -> Duration {
        let delay_ms = delay.as_millis() as u64;
        let total = self
            .cumulative_delay_ms
            .fetch_add(delay_ms, Ordering::SeqCst)
            + delay_ms;
        Duration::from_millis(total)
    }
}
