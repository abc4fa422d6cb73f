//! Delays inserted around batch downloads.
//!
//! Production uses bounded random jitter so sequential downloads do not look
//! machine-timed; tests substitute [`NoPacing`] or a seeded [`RandomPacing`].

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio_util::sync::CancellationToken;

use super::constants::{INTER_ITEM_DELAY_MS, PRE_DOWNLOAD_DELAY_MS};

/// Produces the delay before each attempt and between attempts.
pub trait PacingPolicy: Send + Sync {
    /// Delay before attempt number `index` (zero-based among attempted items).
    fn pre_download_delay(&self, index: usize) -> Duration;

    /// Delay separating attempt `index` from the previous one (`index >= 1`).
    fn inter_item_delay(&self, index: usize) -> Duration;
}

/// Uniform random delays within fixed bounds.
#[derive(Debug)]
pub struct RandomPacing {
    pre_ms: (u64, u64),
    inter_ms: (u64, u64),
    rng: Mutex<StdRng>,
}

impl RandomPacing {
    /// Standard bounds with an entropy-seeded generator.
    #[must_use]
    pub fn new() -> Self {
        Self::with_bounds(PRE_DOWNLOAD_DELAY_MS, INTER_ITEM_DELAY_MS, StdRng::from_entropy())
    }

    /// Standard bounds with a fixed seed.
    #[must_use]
    pub fn seeded(seed: u64) -> Self {
        Self::with_bounds(
            PRE_DOWNLOAD_DELAY_MS,
            INTER_ITEM_DELAY_MS,
            StdRng::seed_from_u64(seed),
        )
    }

    /// Custom bounds in milliseconds (inclusive). Reversed bounds are swapped.
    #[must_use]
    pub fn with_bounds(pre_ms: (u64, u64), inter_ms: (u64, u64), rng: StdRng) -> Self {
        Self {
            pre_ms: ordered(pre_ms),
            inter_ms: ordered(inter_ms),
            rng: Mutex::new(rng),
        }
    }

    /// Lower bound of the inter-item delay.
    #[must_use]
    pub fn min_inter_item_delay(&self) -> Duration {
        Duration::from_millis(self.inter_ms.0)
    }

    fn sample(&self, (low, high): (u64, u64)) -> Duration {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        Duration::from_millis(rng.gen_range(low..=high))
    }
}

impl Default for RandomPacing {
    fn default() -> Self {
        Self::new()
    }
}

impl PacingPolicy for RandomPacing {
    fn pre_download_delay(&self, _index: usize) -> Duration {
        self.sample(self.pre_ms)
    }

    fn inter_item_delay(&self, _index: usize) -> Duration {
        self.sample(self.inter_ms)
    }
}

fn ordered((a, b): (u64, u64)) -> (u64, u64) {
    if a <= b { (a, b) } else { (b, a) }
}

/// No delays.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoPacing;

impl PacingPolicy for NoPacing {
    fn pre_download_delay(&self, _index: usize) -> Duration {
        Duration::ZERO
    }

    fn inter_item_delay(&self, _index: usize) -> Duration {
        Duration::ZERO
    }
}

/// Sleeps for `delay` unless `cancel` fires first. Returns false when cancelled.
pub async fn pause(delay: Duration, cancel: &CancellationToken) -> bool {
    if delay.is_zero() {
        return !cancel.is_cancelled();
    }
    tokio::select! {
        biased;
        () = cancel.cancelled() => false,
        () = tokio::time::sleep(delay) => true,
    }
}
