use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Runtime circuit state for one provider's upstream calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

/// Circuit breaker thresholds and timers, tunable via `CIRCUIT_BREAKER_*`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    pub enabled: bool,
    pub failure_threshold: u32,
    pub open_timeout: Duration,
    pub half_open_max_probes: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            failure_threshold: 5,
            open_timeout: Duration::from_secs(60),
            half_open_max_probes: 1,
        }
    }
}

/// Point-in-time breaker view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitSnapshot {
    pub state: CircuitState,
    pub failure_count: u32,
    pub since_last_change: Duration,
}

#[derive(Debug)]
struct CircuitInner {
    state: CircuitState,
    failure_count: u32,
    last_failure: Option<Instant>,
    last_transition: Instant,
    half_open_probes: u32,
}

/// Thread-safe per-provider circuit breaker.
///
/// The lock is held only to read or transition state, never across an
/// upstream call.
#[derive(Debug)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    inner: Mutex<CircuitInner>,
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(CircuitInner {
                state: CircuitState::Closed,
                failure_count: 0,
                last_failure: None,
                last_transition: Instant::now(),
                half_open_probes: 0,
            }),
        }
    }

    /// Whether a call may go out right now.
    ///
    /// An open circuit whose timeout has elapsed since the last failure
    /// transitions to half-open and permits a bounded number of probes.
    pub fn allow_request(&self) -> bool {
        if !self.config.enabled {
            return true;
        }

        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed => true,
            CircuitState::HalfOpen => {
                if inner.half_open_probes < self.config.half_open_max_probes {
                    inner.half_open_probes += 1;
                    true
                } else {
                    false
                }
            }
            CircuitState::Open => {
                let elapsed = inner
                    .last_failure
                    .map(|at| at.elapsed() >= self.config.open_timeout)
                    .unwrap_or(true);

                if elapsed {
                    inner.state = CircuitState::HalfOpen;
                    inner.last_transition = Instant::now();
                    inner.half_open_probes = 1;
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn record_success(&self) {
        if !self.config.enabled {
            return;
        }

        let mut inner = self.lock();
        if inner.state != CircuitState::Closed {
            inner.last_transition = Instant::now();
        }
        inner.state = CircuitState::Closed;
        inner.failure_count = 0;
        inner.half_open_probes = 0;
    }

    pub fn record_failure(&self) {
        if !self.config.enabled {
            return;
        }

        let mut inner = self.lock();
        inner.failure_count = inner.failure_count.saturating_add(1);
        inner.last_failure = Some(Instant::now());

        let tripped = inner.state == CircuitState::HalfOpen
            || inner.failure_count >= self.config.failure_threshold;
        if tripped && inner.state != CircuitState::Open {
            inner.state = CircuitState::Open;
            inner.last_transition = Instant::now();
            inner.half_open_probes = 0;
        }
    }

    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    pub fn failure_count(&self) -> u32 {
        self.lock().failure_count
    }

    /// Point-in-time view for diagnostics and status output.
    pub fn snapshot(&self) -> CircuitSnapshot {
        let inner = self.lock();
        CircuitSnapshot {
            state: inner.state,
            failure_count: inner.failure_count,
            since_last_change: inner.last_transition.elapsed(),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CircuitInner> {
        self.inner.lock().expect("circuit breaker lock is not poisoned")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(threshold: u32, timeout: Duration) -> CircuitBreaker {
        CircuitBreaker::new(CircuitBreakerConfig {
            enabled: true,
            failure_threshold: threshold,
            open_timeout: timeout,
            half_open_max_probes: 1,
        })
    }

    #[test]
    fn opens_after_exactly_threshold_failures() {
        let breaker = breaker(3, Duration::from_secs(60));

        breaker.record_failure();
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Closed);

        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(!breaker.allow_request());
    }

    #[test]
    fn success_in_closed_resets_the_failure_count() {
        let breaker = breaker(3, Duration::from_secs(60));

        breaker.record_failure();
        breaker.record_failure();
        breaker.record_success();
        assert_eq!(breaker.failure_count(), 0);
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn half_open_after_timeout_then_closes_on_success() {
        let breaker = breaker(1, Duration::from_millis(5));

        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);

        std::thread::sleep(Duration::from_millis(10));
        assert!(breaker.allow_request());
        assert_eq!(breaker.state(), CircuitState::HalfOpen);

        breaker.record_success();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.failure_count(), 0);
    }

    #[test]
    fn half_open_failure_reopens() {
        let breaker = breaker(1, Duration::from_millis(5));

        breaker.record_failure();
        std::thread::sleep(Duration::from_millis(10));
        assert!(breaker.allow_request());

        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(!breaker.allow_request());
    }

    #[test]
    fn half_open_probe_budget_is_bounded() {
        let breaker = breaker(1, Duration::from_millis(5));

        breaker.record_failure();
        std::thread::sleep(Duration::from_millis(10));

        assert!(breaker.allow_request());
        assert!(!breaker.allow_request());
    }

    #[test]
    fn snapshot_tracks_state_changes() {
        let breaker = breaker(1, Duration::from_secs(60));

        let before = breaker.snapshot();
        assert_eq!(before.state, CircuitState::Closed);
        assert_eq!(before.failure_count, 0);

        breaker.record_failure();
        let after = breaker.snapshot();
        assert_eq!(after.state, CircuitState::Open);
        assert_eq!(after.failure_count, 1);
        assert!(after.since_last_change <= before.since_last_change + Duration::from_secs(1));
    }

    #[test]
    fn disabled_breaker_never_blocks() {
        let breaker = CircuitBreaker::new(CircuitBreakerConfig {
            enabled: false,
            failure_threshold: 1,
            open_timeout: Duration::from_secs(60),
            half_open_max_probes: 1,
        });

        breaker.record_failure();
        breaker.record_failure();
        assert!(breaker.allow_request());
        assert_eq!(breaker.state(), CircuitState::Closed);
    }
}
