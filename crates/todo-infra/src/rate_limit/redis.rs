//! Redis fixed-window rate limiter, shared by every API instance.

use std::time::Duration;

use async_trait::async_trait;
use redis::Script;
use redis::aio::ConnectionManager;

use todo_core::domain::{Admission, RateLimitProfile};
use todo_core::ports::{RateLimitError, RateLimiter};

use crate::cache::RedisConfig;

/// Check-and-increment in one atomic step.
///
/// Each partition is a hash holding its count and the limit it was opened
/// with; a changed profile only applies once the key expires. A full window is
/// not incremented, so the stored count never passes the limit.
/// Returns `{admitted (0|1), pttl_ms, count, limit}`.
const FIXED_WINDOW_SCRIPT: &str = r#"
local key = KEYS[1]
local window_ms = tonumber(ARGV[2])

local current = tonumber(redis.call('HGET', key, 'count') or '0')
local limit = tonumber(redis.call('HGET', key, 'limit') or ARGV[1])
if current >= limit then
    return {0, redis.call('PTTL', key), current, limit}
end

current = redis.call('HINCRBY', key, 'count', 1)
if current == 1 then
    redis.call('HSET', key, 'limit', limit)
    redis.call('PEXPIRE', key, window_ms)
end

return {1, redis.call('PTTL', key), current, limit}
"#;

/// Redis rate limiter configuration.
#[derive(Debug, Clone)]
pub struct RedisRateLimitConfig {
    /// Redis connection config
    pub redis: RedisConfig,
    /// Key prefix for partition keys
    pub key_prefix: String,
}

impl RedisRateLimitConfig {
    pub fn new(redis: RedisConfig) -> Self {
        Self {
            redis,
            key_prefix: std::env::var("RATE_LIMIT_KEY_PREFIX")
                .unwrap_or_else(|_| "ratelimit".to_string()),
        }
    }
}

/// Redis-backed fixed-window limiter. Each partition is one key that expires
/// with its window, so no purge pass is needed.
pub struct RedisRateLimiter {
    conn: ConnectionManager,
    config: RedisRateLimitConfig,
    script: Script,
}

impl RedisRateLimiter {
    pub async fn new(config: RedisRateLimitConfig) -> Result<Self, RateLimitError> {
        let conn = config
            .redis
            .connect()
            .await
            .map_err(RateLimitError::Backend)?;

        tracing::info!(url = %config.redis.url, "Connected to Redis rate limiter");

        Ok(Self {
            conn,
            config,
            script: Script::new(FIXED_WINDOW_SCRIPT),
        })
    }

    fn make_key(&self, key: &str) -> String {
        format!("{}:{}", self.config.key_prefix, key)
    }
}

#[async_trait]
impl RateLimiter for RedisRateLimiter {
    async fn check(
        &self,
        key: &str,
        profile: &RateLimitProfile,
    ) -> Result<Admission, RateLimitError> {
        let redis_key = self.make_key(key);
        let mut conn = self.conn.clone();
        let window_ms = profile.window().as_millis() as u64;

        let result: Vec<i64> = self
            .script
            .key(&redis_key)
            .arg(profile.permit_limit())
            .arg(window_ms)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| RateLimitError::Backend(e.to_string()))?;

        let admitted = result.first().copied().unwrap_or(0) == 1;
        // PTTL is negative when the key has no expiry; treat as a full window
        let ttl_ms = match result.get(1).copied() {
            Some(ms) if ms > 0 => ms as u64,
            _ => window_ms,
        };
        let count = result.get(2).copied().unwrap_or(0).max(0) as u32;
        let limit = result
            .get(3)
            .and_then(|&limit| u32::try_from(limit).ok())
            .unwrap_or(profile.permit_limit());
        let reset_after = Duration::from_millis(ttl_ms);

        if admitted {
            Ok(Admission::Admitted {
                remaining: limit.saturating_sub(count),
                reset_after,
            })
        } else {
            Ok(Admission::Rejected {
                retry_after: reset_after,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn get_test_ratelimiter() -> Option<RedisRateLimiter> {
        let config = RedisRateLimitConfig {
            redis: RedisConfig {
                url: std::env::var("REDIS_URL")
                    .unwrap_or_else(|_| "redis://localhost:6389".to_string()),
                connect_timeout: Duration::from_secs(1),
                fallback_to_memory: false,
            },
            key_prefix: format!("test_ratelimit_{}", uuid::Uuid::new_v4()),
        };

        RedisRateLimiter::new(config).await.ok()
    }

    #[tokio::test]
    async fn test_redis_fixed_window() {
        let Some(limiter) = get_test_ratelimiter().await else {
            return;
        };
        let quota = RateLimitProfile::new(2, 1).unwrap();

        let first = limiter.check("user:alice", &quota).await.unwrap();
        assert!(matches!(first, Admission::Admitted { remaining: 1, .. }));

        let second = limiter.check("user:alice", &quota).await.unwrap();
        assert!(matches!(second, Admission::Admitted { remaining: 0, .. }));

        let third = limiter.check("user:alice", &quota).await.unwrap();
        assert!(!third.is_admitted());

        // other partitions are untouched
        assert!(
            limiter
                .check("user:bob", &quota)
                .await
                .unwrap()
                .is_admitted()
        );
    }

    #[tokio::test]
    async fn test_redis_new_profile_waits_for_next_window() {
        let Some(limiter) = get_test_ratelimiter().await else {
            return;
        };

        let first = limiter
            .check("user:carol", &RateLimitProfile::new(1, 1).unwrap())
            .await
            .unwrap();
        assert!(first.is_admitted());

        // limit raised mid-window: the open window keeps its limit of 1
        let second = limiter
            .check("user:carol", &RateLimitProfile::new(5, 1).unwrap())
            .await
            .unwrap();
        assert!(!second.is_admitted());
    }
}
