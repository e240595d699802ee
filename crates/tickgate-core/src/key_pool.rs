use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Credential handed to an adapter for one upstream attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiKey {
    pub credential: String,
    pub index: usize,
}

/// Point-in-time view of one key slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyStatus {
    pub index: usize,
    pub usage_count: u64,
    pub in_cooldown: bool,
    pub idle: Option<Duration>,
    pub since_rate_limit: Option<Duration>,
}

#[derive(Debug)]
struct KeySlot {
    credential: String,
    usage_count: u64,
    last_used: Option<Instant>,
    cooldown_until: Option<Instant>,
    last_rate_limit: Option<Instant>,
}

impl KeySlot {
    fn new(credential: String) -> Self {
        Self {
            credential,
            usage_count: 0,
            last_used: None,
            cooldown_until: None,
            last_rate_limit: None,
        }
    }

    /// Clears an expired cooldown and reports whether the key is cooling.
    fn sweep(&mut self, now: Instant) -> bool {
        if let Some(until) = self.cooldown_until {
            if now < until {
                return true;
            }
            self.cooldown_until = None;
        }
        false
    }
}

#[derive(Debug)]
struct PoolInner {
    keys: Vec<KeySlot>,
    current: usize,
}

/// Ordered credential pool for one provider.
///
/// Rate-limited keys cool down for `reset_window`; expired cooldowns are
/// cleared lazily on any access. Key-less providers get a pool of one
/// synthetic empty credential that never enters cooldown.
#[derive(Debug)]
pub struct KeyPool {
    inner: Mutex<PoolInner>,
    reset_window: Duration,
    rotation_enabled: bool,
    keyless: bool,
}

impl KeyPool {
    /// Parse a comma-separated credential list from the environment.
    ///
    /// Empty and whitespace-only entries are dropped; an empty result means
    /// the provider is unavailable.
    pub fn from_credentials(raw: &str, reset_window: Duration, rotation_enabled: bool) -> Option<Self> {
        let keys: Vec<KeySlot> = raw
            .split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(|entry| KeySlot::new(entry.to_owned()))
            .collect();

        if keys.is_empty() {
            return None;
        }

        Some(Self {
            inner: Mutex::new(PoolInner { keys, current: 0 }),
            reset_window,
            rotation_enabled,
            keyless: false,
        })
    }

    /// Pool for providers that serve public endpoints without credentials.
    pub fn keyless() -> Self {
        Self {
            inner: Mutex::new(PoolInner {
                keys: vec![KeySlot::new(String::new())],
                current: 0,
            }),
            reset_window: Duration::ZERO,
            rotation_enabled: false,
            keyless: true,
        }
    }

    pub fn len(&self) -> usize {
        self.lock().keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the current key, or scans forward for one that is not cooling.
    pub fn acquire(&self) -> Option<ApiKey> {
        let now = Instant::now();
        let mut inner = self.lock();
        let n = inner.keys.len();

        let current = inner.current;
        if !inner.keys[current].sweep(now) {
            return Some(api_key(&inner, current));
        }

        for step in 1..=2 * n {
            let index = (current + step) % n;
            if !inner.keys[index].sweep(now) {
                inner.current = index;
                return Some(api_key(&inner, index));
            }
        }

        None
    }

    /// Puts a key into cooldown after an upstream rate limit.
    pub fn mark_rate_limited(&self, index: usize) {
        if self.keyless || !self.rotation_enabled {
            return;
        }

        let now = Instant::now();
        let mut inner = self.lock();
        if let Some(slot) = inner.keys.get_mut(index) {
            slot.cooldown_until = Some(now + self.reset_window);
            slot.last_rate_limit = Some(now);
        }
    }

    pub fn record_success(&self, index: usize) {
        let mut inner = self.lock();
        if let Some(slot) = inner.keys.get_mut(index) {
            slot.usage_count += 1;
            slot.last_used = Some(Instant::now());
        }
    }

    /// Advances past the next available key; reports whether one exists.
    pub fn rotate(&self) -> bool {
        if !self.rotation_enabled {
            return false;
        }

        let now = Instant::now();
        let mut inner = self.lock();
        let n = inner.keys.len();
        let current = inner.current;

        for step in 1..=n {
            let index = (current + step) % n;
            if !inner.keys[index].sweep(now) {
                inner.current = index;
                return true;
            }
        }

        false
    }

    /// Point-in-time view of every slot, for diagnostics and status output.
    pub fn status(&self) -> Vec<KeyStatus> {
        let now = Instant::now();
        let mut inner = self.lock();
        inner
            .keys
            .iter_mut()
            .enumerate()
            .map(|(index, slot)| {
                let in_cooldown = slot.sweep(now);
                KeyStatus {
                    index,
                    usage_count: slot.usage_count,
                    in_cooldown,
                    idle: slot.last_used.map(|at| now.duration_since(at)),
                    since_rate_limit: slot.last_rate_limit.map(|at| now.duration_since(at)),
                }
            })
            .collect()
    }

    pub fn is_cooling(&self, index: usize) -> bool {
        let now = Instant::now();
        let mut inner = self.lock();
        inner
            .keys
            .get_mut(index)
            .map(|slot| slot.sweep(now))
            .unwrap_or(false)
    }

    pub fn usage_count(&self, index: usize) -> u64 {
        self.lock().keys.get(index).map(|slot| slot.usage_count).unwrap_or(0)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, PoolInner> {
        self.inner.lock().expect("key pool lock is not poisoned")
    }
}

fn api_key(inner: &PoolInner, index: usize) -> ApiKey {
    ApiKey {
        credential: inner.keys[index].credential.clone(),
        index,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(raw: &str, window: Duration) -> KeyPool {
        KeyPool::from_credentials(raw, window, true).expect("pool should parse")
    }

    #[test]
    fn env_parsing_drops_blank_entries() {
        let pool = pool(" k1, ,k2,, k3 ", Duration::from_secs(60));
        assert_eq!(pool.len(), 3);
        assert_eq!(pool.acquire().expect("key available").credential, "k1");
    }

    #[test]
    fn empty_credential_list_means_unavailable() {
        assert!(KeyPool::from_credentials(" , ", Duration::from_secs(60), true).is_none());
    }

    #[test]
    fn rate_limited_key_is_skipped_until_cooldown_expires() {
        let pool = pool("k1,k2", Duration::from_millis(20));

        pool.mark_rate_limited(0);
        assert!(pool.is_cooling(0));
        let key = pool.acquire().expect("second key available");
        assert_eq!(key.index, 1);

        std::thread::sleep(Duration::from_millis(25));
        assert!(!pool.is_cooling(0));
    }

    #[test]
    fn acquire_returns_none_when_every_key_is_cooling() {
        let pool = pool("k1,k2,k3", Duration::from_secs(60));
        for index in 0..3 {
            pool.mark_rate_limited(index);
        }
        assert!(pool.acquire().is_none());
    }

    #[test]
    fn rotate_reports_whether_another_key_is_available() {
        let pool = pool("k1,k2", Duration::from_secs(60));

        pool.mark_rate_limited(0);
        assert!(pool.rotate());
        assert_eq!(pool.acquire().expect("k2 available").index, 1);

        pool.mark_rate_limited(1);
        assert!(!pool.rotate());
    }

    #[test]
    fn single_key_pools_do_not_rotate() {
        let pool = pool("only", Duration::from_secs(60));
        pool.mark_rate_limited(0);
        assert!(!pool.rotate());
        assert!(pool.acquire().is_none());
    }

    #[test]
    fn keyless_pools_never_rate_limit() {
        let pool = KeyPool::keyless();
        pool.mark_rate_limited(0);
        let key = pool.acquire().expect("synthetic key always available");
        assert_eq!(key.credential, "");
        assert_eq!(key.index, 0);
    }

    #[test]
    fn success_updates_usage_counters_only() {
        let pool = pool("k1,k2", Duration::from_secs(60));
        pool.record_success(0);
        pool.record_success(0);
        assert_eq!(pool.usage_count(0), 2);
        assert_eq!(pool.acquire().expect("still current").index, 0);
    }

    #[test]
    fn status_reflects_use_and_cooldowns() {
        let pool = pool("k1,k2", Duration::from_secs(60));
        pool.record_success(0);
        pool.mark_rate_limited(1);

        let status = pool.status();
        assert_eq!(status.len(), 2);
        assert_eq!(status[0].usage_count, 1);
        assert!(status[0].idle.is_some());
        assert!(!status[0].in_cooldown);
        assert!(status[1].in_cooldown);
        assert!(status[1].since_rate_limit.is_some());
    }
}
