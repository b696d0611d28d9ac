//! In-memory fixed-window partition store.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use governor::clock::{Clock, DefaultClock, Reference};
use tokio::sync::Mutex;

use todo_core::domain::{Admission, RateLimitProfile};
use todo_core::ports::{RateLimitError, RateLimiter};

/// In-memory rate limiter configuration.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// A partition whose window has elapsed and that has seen no traffic for
    /// this long is dropped by [`RateLimiter::purge_idle`].
    pub idle_eviction: Duration,
    /// Upper bound on live partitions. `None` leaves the table unbounded.
    pub max_partitions: Option<usize>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            idle_eviction: Duration::from_secs(15 * 60),
            max_partitions: None,
        }
    }
}

impl RateLimitConfig {
    pub fn from_env() -> Self {
        Self {
            idle_eviction: Duration::from_secs(
                std::env::var("RATE_LIMIT_IDLE_EVICTION_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(15 * 60),
            ),
            max_partitions: std::env::var("RATE_LIMIT_MAX_PARTITIONS")
                .ok()
                .and_then(|s| s.parse().ok()),
        }
    }
}

/// Fixed-window counter of one partition.
#[derive(Debug)]
struct Window<I> {
    start: I,
    count: u32,
    limit: u32,
    length: Duration,
    last_seen: I,
}

impl<I: Reference> Window<I> {
    fn open(now: I, profile: &RateLimitProfile) -> Self {
        Self {
            start: now,
            count: 0,
            limit: profile.permit_limit(),
            length: profile.window(),
            last_seen: now,
        }
    }

    fn elapsed(&self, now: I) -> Duration {
        Duration::from(now.duration_since(self.start))
    }

    fn is_expired(&self, now: I) -> bool {
        self.elapsed(now) >= self.length
    }

    fn idle_for(&self, now: I) -> Duration {
        Duration::from(now.duration_since(self.last_seen))
    }

    /// A new profile only takes effect when the window rolls over.
    fn admit(&mut self, now: I, profile: &RateLimitProfile) -> Admission {
        if self.is_expired(now) {
            *self = Self::open(now, profile);
        }
        self.last_seen = now;

        let reset_after = self.length.saturating_sub(self.elapsed(now));
        if self.count < self.limit {
            self.count += 1;
            Admission::Admitted {
                remaining: self.limit - self.count,
                reset_after,
            }
        } else {
            Admission::Rejected {
                retry_after: reset_after,
            }
        }
    }
}

type Partition<I> = Arc<Mutex<Window<I>>>;

/// Per-key fixed-window rate limiter.
///
/// The partition table is a sharded `DashMap`; a shard lock is only held to
/// find or insert a partition. Check-and-increment runs under the partition's
/// own mutex, so requests for different keys never wait on each other.
/// Limits are per-process, not shared across instances.
pub struct InMemoryRateLimiter<C: Clock = DefaultClock> {
    partitions: DashMap<String, Partition<C::Instant>>,
    clock: C,
    config: RateLimitConfig,
}

impl InMemoryRateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self::with_clock(config, DefaultClock::default())
    }

    pub fn from_env() -> Self {
        Self::new(RateLimitConfig::from_env())
    }
}

impl<C: Clock> InMemoryRateLimiter<C> {
    pub fn with_clock(config: RateLimitConfig, clock: C) -> Self {
        Self {
            partitions: DashMap::new(),
            clock,
            config,
        }
    }

    pub fn partition_count(&self) -> usize {
        self.partitions.len()
    }

    fn partition(&self, key: &str, profile: &RateLimitProfile) -> Partition<C::Instant> {
        if let Some(existing) = self.partitions.get(key) {
            return existing.value().clone();
        }

        if let Some(max) = self.config.max_partitions {
            if self.partitions.len() >= max {
                self.make_room(max);
            }
        }

        self.partitions
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(Window::open(self.clock.now(), profile))))
            .value()
            .clone()
    }

    /// Held by a request outside the table. Such partitions are never evicted.
    fn is_in_flight(partition: &Partition<C::Instant>) -> bool {
        Arc::strong_count(partition) > 1
    }

    fn make_room(&self, max: usize) {
        let purged = self.remove_idle(self.clock.now());
        if purged > 0 && self.partitions.len() < max {
            return;
        }

        let victim = self
            .partitions
            .iter()
            .filter(|entry| !Self::is_in_flight(entry.value()))
            .filter_map(|entry| {
                let window = entry.value().try_lock().ok()?;
                Some((entry.key().clone(), window.last_seen))
            })
            .min_by_key(|(_, last_seen)| *last_seen)
            .map(|(key, _)| key);

        let Some(key) = victim else {
            return;
        };

        // Re-checked under the shard write lock: a request may have picked the
        // partition up since the scan.
        if self
            .partitions
            .remove_if(&key, |_, partition| !Self::is_in_flight(partition))
            .is_some()
        {
            tracing::warn!(
                partition = %key,
                max_partitions = max,
                "Partition table full, evicted least recently seen partition"
            );
        }
    }

    /// In-flight partitions always survive.
    fn remove_idle(&self, now: C::Instant) -> usize {
        let idle_eviction = self.config.idle_eviction;
        let mut removed = 0;

        self.partitions.retain(|_, partition| {
            if Self::is_in_flight(partition) {
                return true;
            }
            match partition.try_lock() {
                Ok(window) => {
                    let keep = !window.is_expired(now) || window.idle_for(now) < idle_eviction;
                    if !keep {
                        removed += 1;
                    }
                    keep
                }
                Err(_) => true,
            }
        });

        removed
    }
}

#[async_trait]
impl<C> RateLimiter for InMemoryRateLimiter<C>
where
    C: Clock + Send + Sync + 'static,
{
    async fn check(
        &self,
        key: &str,
        profile: &RateLimitProfile,
    ) -> Result<Admission, RateLimitError> {
        let partition = self.partition(key, profile);
        let mut window = partition.lock().await;
        Ok(window.admit(self.clock.now(), profile))
    }

    async fn purge_idle(&self) -> Result<usize, RateLimitError> {
        let removed = self.remove_idle(self.clock.now());
        if removed > 0 {
            tracing::debug!(
                removed,
                remaining = self.partitions.len(),
                "Purged idle rate limit partitions"
            );
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use governor::clock::FakeRelativeClock;

    fn profile(permit_limit: u32, window_minutes: u32) -> RateLimitProfile {
        RateLimitProfile::new(permit_limit, window_minutes).unwrap()
    }

    fn fake_limiter(config: RateLimitConfig) -> (InMemoryRateLimiter<FakeRelativeClock>, FakeRelativeClock) {
        let clock = FakeRelativeClock::default();
        (InMemoryRateLimiter::with_clock(config, clock.clone()), clock)
    }

    #[tokio::test]
    async fn test_window_rollover() {
        let (limiter, clock) = fake_limiter(RateLimitConfig::default());
        let quota = profile(2, 1);

        assert!(limiter.check("user:k", &quota).await.unwrap().is_admitted());
        assert!(limiter.check("user:k", &quota).await.unwrap().is_admitted());
        assert!(!limiter.check("user:k", &quota).await.unwrap().is_admitted());

        clock.advance(Duration::from_secs(61));

        assert!(limiter.check("user:k", &quota).await.unwrap().is_admitted());
    }

    #[tokio::test]
    async fn test_window_boundary_is_exact() {
        let (limiter, clock) = fake_limiter(RateLimitConfig::default());
        let quota = profile(1, 1);

        assert!(limiter.check("k", &quota).await.unwrap().is_admitted());
        clock.advance(Duration::from_secs(59));
        assert!(!limiter.check("k", &quota).await.unwrap().is_admitted());
        clock.advance(Duration::from_secs(1));
        assert!(limiter.check("k", &quota).await.unwrap().is_admitted());
    }

    #[tokio::test]
    async fn test_remaining_and_retry_after() {
        let (limiter, clock) = fake_limiter(RateLimitConfig::default());
        let quota = profile(2, 1);

        let first = limiter.check("k", &quota).await.unwrap();
        assert_eq!(
            first,
            Admission::Admitted {
                remaining: 1,
                reset_after: Duration::from_secs(60)
            }
        );

        clock.advance(Duration::from_secs(20));
        limiter.check("k", &quota).await.unwrap();
        let rejected = limiter.check("k", &quota).await.unwrap();
        assert_eq!(
            rejected,
            Admission::Rejected {
                retry_after: Duration::from_secs(40)
            }
        );
    }

    #[tokio::test]
    async fn test_partitions_are_independent() {
        let (limiter, _clock) = fake_limiter(RateLimitConfig::default());
        let quota = profile(1, 5);

        assert!(limiter.check("anonymous", &quota).await.unwrap().is_admitted());
        assert!(!limiter.check("anonymous", &quota).await.unwrap().is_admitted());

        assert!(limiter.check("user:a", &quota).await.unwrap().is_admitted());
        assert!(limiter.check("user:b", &quota).await.unwrap().is_admitted());
        assert_eq!(limiter.partition_count(), 3);
    }

    #[tokio::test]
    async fn test_new_profile_applies_after_rollover() {
        let (limiter, clock) = fake_limiter(RateLimitConfig::default());

        assert!(limiter.check("k", &profile(1, 1)).await.unwrap().is_admitted());
        // limit raised mid-window: still the old window
        assert!(!limiter.check("k", &profile(5, 1)).await.unwrap().is_admitted());

        clock.advance(Duration::from_secs(60));
        for _ in 0..5 {
            assert!(limiter.check("k", &profile(5, 1)).await.unwrap().is_admitted());
        }
        assert!(!limiter.check("k", &profile(5, 1)).await.unwrap().is_admitted());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_checks_never_exceed_limit() {
        let limiter = Arc::new(InMemoryRateLimiter::new(RateLimitConfig::default()));
        let quota = profile(10, 5);

        let handles: Vec<_> = (0..64)
            .map(|_| {
                let limiter = limiter.clone();
                tokio::spawn(async move { limiter.check("user:hot", &quota).await.unwrap() })
            })
            .collect();

        let mut admitted = 0;
        for handle in handles {
            if handle.await.unwrap().is_admitted() {
                admitted += 1;
            }
        }

        assert_eq!(admitted, 10);
    }

    #[tokio::test]
    async fn test_purge_idle_keeps_open_windows() {
        let (limiter, clock) = fake_limiter(RateLimitConfig {
            idle_eviction: Duration::from_secs(120),
            max_partitions: None,
        });

        limiter.check("old", &profile(1, 1)).await.unwrap();
        limiter.check("long", &profile(1, 10)).await.unwrap();

        clock.advance(Duration::from_secs(60));
        assert_eq!(limiter.purge_idle().await.unwrap(), 0);

        clock.advance(Duration::from_secs(90));
        assert_eq!(limiter.purge_idle().await.unwrap(), 1);
        assert_eq!(limiter.partition_count(), 1);
    }

    #[tokio::test]
    async fn test_max_partitions_evicts_least_recent() {
        let (limiter, clock) = fake_limiter(RateLimitConfig {
            idle_eviction: Duration::from_secs(3600),
            max_partitions: Some(2),
        });
        let quota = profile(5, 5);

        limiter.check("a", &quota).await.unwrap();
        clock.advance(Duration::from_secs(1));
        limiter.check("b", &quota).await.unwrap();
        clock.advance(Duration::from_secs(1));
        limiter.check("a", &quota).await.unwrap();
        clock.advance(Duration::from_secs(1));
        limiter.check("c", &quota).await.unwrap();

        assert_eq!(limiter.partition_count(), 2);
        assert!(limiter.partitions.contains_key("a"));
        assert!(limiter.partitions.contains_key("c"));
    }

    #[tokio::test]
    async fn test_purge_skips_partition_held_by_request() {
        let (limiter, clock) = fake_limiter(RateLimitConfig {
            idle_eviction: Duration::ZERO,
            max_partitions: None,
        });
        let quota = profile(1, 1);

        limiter.check("k", &quota).await.unwrap();
        clock.advance(Duration::from_secs(61));

        // a request has found the partition but not locked it yet
        let held = limiter.partition("k", &quota);
        assert_eq!(limiter.purge_idle().await.unwrap(), 0);

        let first = held.lock().await.admit(clock.now(), &quota);
        drop(held);
        let second = limiter.check("k", &quota).await.unwrap();

        assert!(first.is_admitted());
        assert!(!second.is_admitted());
    }

    #[tokio::test]
    async fn test_eviction_skips_partition_held_by_request() {
        let (limiter, clock) = fake_limiter(RateLimitConfig {
            idle_eviction: Duration::from_secs(3600),
            max_partitions: Some(1),
        });
        let quota = profile(1, 5);

        let held = limiter.partition("k", &quota);
        limiter.check("other", &quota).await.unwrap();
        assert!(limiter.partitions.contains_key("k"));

        let first = held.lock().await.admit(clock.now(), &quota);
        drop(held);
        let second = limiter.check("k", &quota).await.unwrap();

        assert!(first.is_admitted());
        assert!(!second.is_admitted());
    }
}
