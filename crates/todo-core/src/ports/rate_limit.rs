//! Rate limiting port.

use async_trait::async_trait;

use crate::domain::{Admission, RateLimitProfile};

/// Partition store behind the admission controller.
///
/// Implementations keep one fixed-window counter per partition key and must
/// make check-and-increment atomic per key, without serialising unrelated keys.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Admit or reject one request for `key` under `profile`, updating the counter.
    async fn check(&self, key: &str, profile: &RateLimitProfile)
    -> Result<Admission, RateLimitError>;

    /// Drop partitions that no longer hold an open window. Returns how many were removed.
    ///
    /// Backends that expire keys on their own keep the default.
    async fn purge_idle(&self) -> Result<usize, RateLimitError> {
        Ok(0)
    }
}

/// Rate limit errors.
#[derive(Debug, thiserror::Error)]
pub enum RateLimitError {
    #[error("Backend error: {0}")]
    Backend(String),
}
