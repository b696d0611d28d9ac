//! Redis cache implementation, shared by every API instance.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};

use todo_core::ports::{Cache, CacheError};

/// Redis connection configuration.
#[derive(Debug, Clone)]
pub struct RedisConfig {
    /// Redis URL (e.g., redis://localhost:6379)
    pub url: String,
    /// Connection timeout
    pub connect_timeout: Duration,
    /// Whether to fall back to in-memory backends if Redis is unavailable at startup
    pub fallback_to_memory: bool,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
            connect_timeout: Duration::from_secs(5),
            fallback_to_memory: true,
        }
    }
}

impl RedisConfig {
    /// Load configuration from environment variables. `None` when `REDIS_URL` is unset.
    pub fn from_env() -> Option<Self> {
        let url = std::env::var("REDIS_URL").ok()?;

        Some(Self {
            url,
            connect_timeout: Duration::from_secs(
                std::env::var("REDIS_CONNECT_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(5),
            ),
            fallback_to_memory: std::env::var("REDIS_FALLBACK_TO_MEMORY")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(true),
        })
    }

    /// Open a managed connection, bounded by `connect_timeout`.
    pub(crate) async fn connect(&self) -> Result<ConnectionManager, String> {
        let client = Client::open(self.url.as_str()).map_err(|e| e.to_string())?;

        tokio::time::timeout(self.connect_timeout, ConnectionManager::new(client))
            .await
            .map_err(|_| "Connection timed out".to_string())?
            .map_err(|e| e.to_string())
    }
}

/// Redis-backed cache.
///
/// Uses a connection manager for automatic reconnection.
pub struct RedisCache {
    conn: ConnectionManager,
}

impl RedisCache {
    pub async fn new(config: &RedisConfig) -> Result<Self, CacheError> {
        let conn = config.connect().await.map_err(CacheError::Connection)?;

        tracing::info!(url = %config.url, "Connected to Redis cache");

        Ok(Self { conn })
    }
}

#[async_trait]
impl Cache for RedisCache {
    async fn get(&self, key: &str) -> Option<String> {
        let mut conn = self.conn.clone();
        match conn.get::<_, Option<String>>(key).await {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Redis GET failed");
                None
            }
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();

        match ttl {
            Some(duration) => {
                conn.set_ex::<_, _, ()>(key, value, duration.as_secs().max(1))
                    .await
                    .map_err(|e| CacheError::Operation(e.to_string()))?;
            }
            None => {
                conn.set::<_, _, ()>(key, value)
                    .await
                    .map_err(|e| CacheError::Operation(e.to_string()))?;
            }
        }

        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(key)
            .await
            .map_err(|e| CacheError::Operation(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn get_test_cache() -> Option<RedisCache> {
        let config = RedisConfig {
            url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6389".to_string()),
            connect_timeout: Duration::from_secs(1),
            fallback_to_memory: false,
        };

        RedisCache::new(&config).await.ok()
    }

    #[tokio::test]
    async fn test_redis_cache_set_get_delete() {
        let Some(cache) = get_test_cache().await else {
            return;
        };

        cache
            .set("test_quota:alice", r#"{"permit_limit":3}"#, None)
            .await
            .unwrap();
        assert_eq!(
            cache.get("test_quota:alice").await.as_deref(),
            Some(r#"{"permit_limit":3}"#)
        );

        cache.delete("test_quota:alice").await.unwrap();
        assert_eq!(cache.get("test_quota:alice").await, None);
    }

    #[tokio::test]
    async fn test_redis_cache_ttl() {
        let Some(cache) = get_test_cache().await else {
            return;
        };

        cache
            .set("test_quota:ttl", "v", Some(Duration::from_secs(1)))
            .await
            .unwrap();
        assert!(cache.get("test_quota:ttl").await.is_some());

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(cache.get("test_quota:ttl").await, None);
    }
}
