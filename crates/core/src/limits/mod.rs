//! Sliding-window rate limiting.
//!
//! One limiter instance serves every (identity, bucket) pair in the
//! process: inbound login and API buckets as well as outbound
//! per-provider quota buckets. The check-and-record step is a single
//! atomic operation under the bucket map lock, so two racing requests
//! can never both slip under the limit.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use log::warn;

/// A named rate-limit policy. Policies are parameters supplied by the
/// caller, never baked into the limiter.
#[derive(Clone, Copy, Debug)]
pub struct RatePolicy {
    /// Maximum admitted requests per window.
    pub limit: usize,
    /// Length of the sliding window.
    pub window: Duration,
}

impl RatePolicy {
    pub const fn new(limit: usize, window_secs: u64) -> Self {
        Self {
            limit,
            window: Duration::from_secs(window_secs),
        }
    }

    /// Policy expressed as requests per minute.
    pub const fn per_minute(limit: usize) -> Self {
        Self::new(limit, 60)
    }
}

/// Outcome of a rate-limit check.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RateDecision {
    /// Whether the request was admitted (and recorded).
    pub allowed: bool,
    /// Seconds until the oldest counted request leaves the window;
    /// zero when admitted.
    pub retry_after_secs: u64,
}

impl RateDecision {
    fn admitted() -> Self {
        Self {
            allowed: true,
            retry_after_secs: 0,
        }
    }
}

struct Bucket {
    /// Window the bucket was created with; used when sweeping.
    window: Duration,
    /// Admission instants still inside the window, oldest first.
    hits: VecDeque<Instant>,
}

impl Bucket {
    fn new(window: Duration) -> Self {
        Self {
            window,
            hits: VecDeque::new(),
        }
    }

    fn prune(&mut self, now: Instant) {
        while self
            .hits
            .front()
            .is_some_and(|ts| now.duration_since(*ts) >= self.window)
        {
            self.hits.pop_front();
        }
    }
}

/// Sliding-window log rate limiter.
///
/// Thread-safe and shared as a singleton across request handlers and
/// scheduler jobs. The limiter never errors - it always returns a
/// decision.
#[derive(Default)]
pub struct RateLimiter {
    buckets: Mutex<HashMap<String, Bucket>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock the bucket map, recovering from poison if necessary.
    ///
    /// Worst case after recovery is a slightly inaccurate window,
    /// which beats panicking in a request handler.
    fn lock_buckets(&self) -> MutexGuard<'_, HashMap<String, Bucket>> {
        self.buckets.lock().unwrap_or_else(|poisoned| {
            warn!("Rate limiter mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Check-and-record for one bucket.
    ///
    /// Prunes timestamps older than the policy window, then either
    /// denies with the seconds until the oldest remaining admission
    /// expires, or records `now` and admits.
    pub fn allow(&self, bucket_key: &str, policy: RatePolicy) -> RateDecision {
        let now = Instant::now();
        let mut buckets = self.lock_buckets();
        let bucket = buckets
            .entry(bucket_key.to_string())
            .or_insert_with(|| Bucket::new(policy.window));
        bucket.window = policy.window;
        bucket.prune(now);

        if bucket.hits.len() >= policy.limit {
            let oldest = bucket.hits.front().copied().unwrap_or(now);
            let remaining = policy.window.saturating_sub(now.duration_since(oldest));
            return RateDecision {
                allowed: false,
                retry_after_secs: ceil_secs(remaining).max(1),
            };
        }

        bucket.hits.push_back(now);
        RateDecision::admitted()
    }

    /// Login attempts for one identity (IP or user id).
    pub fn allow_login(&self, identity: &str, policy: RatePolicy) -> RateDecision {
        self.allow(&format!("login:{}", identity), policy)
    }

    /// General API requests for one identity.
    pub fn allow_api(&self, identity: &str, policy: RatePolicy) -> RateDecision {
        self.allow(&format!("api:{}", identity), policy)
    }

    /// Outbound calls to one upstream provider.
    pub fn allow_provider(&self, provider: &str, policy: RatePolicy) -> RateDecision {
        self.allow(&format!("provider:{}", provider), policy)
    }

    /// Drop buckets with no admissions left inside their window.
    /// Returns the number removed. Invoked periodically to bound
    /// memory.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut buckets = self.lock_buckets();
        let before = buckets.len();
        buckets.retain(|_, bucket| {
            bucket.prune(now);
            !bucket.hits.is_empty()
        });
        before - buckets.len()
    }

    /// Number of live buckets (for monitoring).
    pub fn bucket_count(&self) -> usize {
        self.lock_buckets().len()
    }
}

/// Round a duration up to whole seconds.
fn ceil_secs(d: Duration) -> u64 {
    d.as_secs() + u64::from(d.subsec_nanos() > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admits_exactly_limit() {
        let limiter = RateLimiter::new();
        let policy = RatePolicy::new(5, 900);

        for _ in 0..5 {
            assert!(limiter.allow("login:10.0.0.1", policy).allowed);
        }

        let decision = limiter.allow("login:10.0.0.1", policy);
        assert!(!decision.allowed);
        assert!(decision.retry_after_secs > 0);
        assert!(decision.retry_after_secs <= 900);
    }

    #[test]
    fn test_denied_request_is_not_recorded() {
        let limiter = RateLimiter::new();
        let policy = RatePolicy::new(1, 900);

        assert!(limiter.allow("api:user-1", policy).allowed);
        assert!(!limiter.allow("api:user-1", policy).allowed);
        assert!(!limiter.allow("api:user-1", policy).allowed);

        // Still exactly one recorded admission
        let buckets = limiter.lock_buckets();
        assert_eq!(buckets["api:user-1"].hits.len(), 1);
    }

    #[test]
    fn test_window_passes_and_admits_again() {
        let limiter = RateLimiter::new();
        let policy = RatePolicy::new(2, 1);

        assert!(limiter.allow("api:user-1", policy).allowed);
        assert!(limiter.allow("api:user-1", policy).allowed);
        assert!(!limiter.allow("api:user-1", policy).allowed);

        std::thread::sleep(Duration::from_millis(1100));
        assert!(limiter.allow("api:user-1", policy).allowed);
    }

    #[test]
    fn test_buckets_are_isolated() {
        let limiter = RateLimiter::new();
        let policy = RatePolicy::new(1, 900);

        assert!(limiter.allow_login("10.0.0.1", policy).allowed);
        assert!(!limiter.allow_login("10.0.0.1", policy).allowed);

        // A different identity and a different limiter class both
        // have their own windows
        assert!(limiter.allow_login("10.0.0.2", policy).allowed);
        assert!(limiter.allow_api("10.0.0.1", policy).allowed);
    }

    #[test]
    fn test_sweep_drops_expired_buckets() {
        let limiter = RateLimiter::new();
        let short = RatePolicy::new(5, 1);
        let long = RatePolicy::new(5, 900);

        limiter.allow("provider:YAHOO", short);
        limiter.allow("login:10.0.0.1", long);
        assert_eq!(limiter.bucket_count(), 2);

        std::thread::sleep(Duration::from_millis(1100));
        assert_eq!(limiter.sweep(), 1);
        assert_eq!(limiter.bucket_count(), 1);
    }

    #[test]
    fn test_ceil_secs() {
        assert_eq!(ceil_secs(Duration::from_secs(3)), 3);
        assert_eq!(ceil_secs(Duration::from_millis(3200)), 4);
        assert_eq!(ceil_secs(Duration::ZERO), 0);
    }
}
