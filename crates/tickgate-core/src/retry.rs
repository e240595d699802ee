//! Same-provider retry with exponential backoff and jitter.
//!
//! The dispatcher wraps a single provider attempt in this policy; it is
//! independent of the cross-provider cascade and disabled by default.

use std::time::Duration;

/// Backoff strategy between same-provider retries.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Backoff {
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Cap applied after exponential growth.
    pub max_delay: Duration,
    /// Multiplicative factor per retry.
    pub factor: f64,
    /// Apply +/- 50% random jitter to each delay.
    pub jitter: bool,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(3),
            factor: 2.0,
            jitter: true,
        }
    }
}

impl Backoff {
    /// Delay for the given 0-based retry attempt.
    pub fn delay(&self, attempt: u32) -> Duration {
        let scale = self.factor.powi(attempt as i32);
        let seconds = self.initial_delay.as_secs_f64() * scale;
        let capped = seconds.min(self.max_delay.as_secs_f64());
        let mut delay = Duration::from_secs_f64(capped);

        if self.jitter {
            let jitter_ms = (delay.as_millis() as f64 * 0.5) as u64;
            if jitter_ms > 0 {
                let offset = fastrand::u64(0..=jitter_ms * 2) as i64 - jitter_ms as i64;
                let total = delay.as_millis() as i64 + offset;
                delay = Duration::from_millis(total.max(0) as u64);
            }
        }

        delay
    }
}

/// Configuration for the `RETRY_*` environment knobs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryConfig {
    pub enabled: bool,
    /// Total tries per provider key, including the first.
    pub max_attempts: u32,
    pub backoff: Backoff,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_attempts: 3,
            backoff: Backoff::default(),
        }
    }
}

impl RetryConfig {
    /// Whether another in-place try is allowed after `tries` completed ones.
    pub fn allows_retry(&self, tries: u32) -> bool {
        self.enabled && tries < self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delays_grow_exponentially_and_cap() {
        let backoff = Backoff {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(500),
            factor: 2.0,
            jitter: false,
        };

        assert_eq!(backoff.delay(0), Duration::from_millis(100));
        assert_eq!(backoff.delay(1), Duration::from_millis(200));
        assert_eq!(backoff.delay(2), Duration::from_millis(400));
        assert_eq!(backoff.delay(3), Duration::from_millis(500));
    }

    #[test]
    fn jitter_stays_within_half_band() {
        let backoff = Backoff {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(1),
            factor: 2.0,
            jitter: true,
        };

        for _ in 0..32 {
            let delay = backoff.delay(1).as_millis() as f64;
            assert!((99.0..=301.0).contains(&delay), "delay {delay} out of band");
        }
    }

    #[test]
    fn disabled_config_never_allows_retries() {
        let config = RetryConfig::default();
        assert!(!config.allows_retry(1));

        let enabled = RetryConfig {
            enabled: true,
            ..RetryConfig::default()
        };
        assert!(enabled.allows_retry(1));
        assert!(enabled.allows_retry(2));
        assert!(!enabled.allows_retry(3));
    }
}
