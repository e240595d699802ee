use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use governor::clock::DefaultClock;
use governor::state::direct::NotKeyed;
use governor::state::InMemoryState;
use governor::{Quota, RateLimiter};

type DirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Minimum-interval gate for public endpoints with IP-level throttles.
///
/// Pacing is cooperative: callers await their slot without holding any lock,
/// so paced providers never delay calls to other providers.
#[derive(Clone)]
pub struct Pacer {
    limiter: Arc<DirectRateLimiter>,
}

impl Pacer {
    pub fn new(min_interval: Duration) -> Self {
        let interval = min_interval.max(Duration::from_millis(1));
        let quota = Quota::with_period(interval)
            .expect("pacing interval is non-zero")
            .allow_burst(NonZeroU32::MIN);

        Self {
            limiter: Arc::new(RateLimiter::direct(quota)),
        }
    }

    /// Waits until the next request slot opens.
    pub async fn pace(&self) {
        self.limiter.until_ready().await;
    }

    /// Non-blocking probe used by status snapshots.
    pub fn slot_available(&self) -> bool {
        self.limiter.check().is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[tokio::test]
    async fn spaces_consecutive_calls_by_the_interval() {
        let pacer = Pacer::new(Duration::from_millis(30));
        let started = Instant::now();

        pacer.pace().await;
        pacer.pace().await;
        pacer.pace().await;

        assert!(started.elapsed() >= Duration::from_millis(55));
    }

    #[test]
    fn first_slot_is_immediately_available() {
        let pacer = Pacer::new(Duration::from_millis(200));
        assert!(pacer.slot_available());
        assert!(!pacer.slot_available());
    }
}
