//! Per-identity quota resolution with a cache-aside layer over the user directory.

use std::sync::Arc;
use std::time::Duration;

use crate::domain::{IdentityKey, RateLimitProfile};
use crate::ports::{Cache, UserRepository};

/// Fixed quotas and caching parameters used by [`QuotaResolver`].
#[derive(Debug, Clone)]
pub struct QuotaPolicy {
    pub anonymous: RateLimitProfile,
    pub authenticated: RateLimitProfile,
    /// Upper bound on how long a resolved profile is served from cache.
    /// Zero disables caching.
    pub cache_ttl: Duration,
}

impl Default for QuotaPolicy {
    fn default() -> Self {
        Self {
            anonymous: RateLimitProfile::ANONYMOUS,
            authenticated: RateLimitProfile::AUTHENTICATED_DEFAULT,
            cache_ttl: Duration::from_secs(60),
        }
    }
}

/// Resolves the [`RateLimitProfile`] that applies to an identity.
pub struct QuotaResolver {
    users: Arc<dyn UserRepository>,
    cache: Option<Arc<dyn Cache>>,
    policy: QuotaPolicy,
}

impl QuotaResolver {
    pub fn new(users: Arc<dyn UserRepository>, policy: QuotaPolicy) -> Self {
        Self {
            users,
            cache: None,
            policy,
        }
    }

    pub fn with_cache(mut self, cache: Arc<dyn Cache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn policy(&self) -> &QuotaPolicy {
        &self.policy
    }

    /// Profile for `identity`.
    ///
    /// Anonymous callers get the anonymous quota. Identities without a directory
    /// record, with an invalid stored quota, or looked up while the directory is
    /// failing get the default authenticated quota (fail open).
    pub async fn resolve(&self, identity: &IdentityKey) -> RateLimitProfile {
        if identity.is_anonymous() {
            return self.policy.anonymous;
        }

        if let Some(profile) = self.cached(identity).await {
            return profile;
        }

        let profile = match self.users.find_by_email(identity.as_str()).await {
            Ok(Some(user)) => user.rate_limit_profile().unwrap_or_else(|| {
                tracing::warn!(
                    identity = %identity,
                    permit_limit = user.permit_limit,
                    window_minutes = user.rate_limit_window_minutes,
                    "Stored rate limit is invalid, applying default authenticated quota"
                );
                self.policy.authenticated
            }),
            Ok(None) => {
                tracing::debug!(identity = %identity, "No directory record, applying default authenticated quota");
                self.policy.authenticated
            }
            Err(e) => {
                tracing::warn!(
                    identity = %identity,
                    error = %e,
                    "User directory unavailable, applying default authenticated quota"
                );
                return self.policy.authenticated;
            }
        };

        self.store(identity, profile).await;
        profile
    }

    /// Forget the cached profile for `identity`. Call after changing a user's quota.
    pub async fn invalidate(&self, identity: &IdentityKey) {
        let Some(cache) = &self.cache else {
            return;
        };

        if let Err(e) = cache.delete(&cache_key(identity)).await {
            tracing::warn!(identity = %identity, error = %e, "Failed to invalidate cached quota");
        }
    }

    /// Sweep expired cached profiles.
    pub async fn purge_expired(&self) -> usize {
        match &self.cache {
            Some(cache) => cache.purge_expired().await,
            None => 0,
        }
    }

    async fn cached(&self, identity: &IdentityKey) -> Option<RateLimitProfile> {
        let raw = self.cache.as_ref()?.get(&cache_key(identity)).await?;

        match serde_json::from_str(&raw) {
            Ok(profile) => Some(profile),
            Err(e) => {
                tracing::warn!(identity = %identity, error = %e, "Discarding unreadable cached quota");
                None
            }
        }
    }

    async fn store(&self, identity: &IdentityKey, profile: RateLimitProfile) {
        let Some(cache) = &self.cache else {
            return;
        };

        // never serve a profile older than its own window
        let ttl = self.policy.cache_ttl.min(profile.window());
        if ttl.is_zero() {
            return;
        }

        let value = match serde_json::to_string(&profile) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to serialize quota");
                return;
            }
        };

        if let Err(e) = cache.set(&cache_key(identity), &value, Some(ttl)).await {
            tracing::warn!(identity = %identity, error = %e, "Failed to cache quota");
        }
    }
}

fn cache_key(identity: &IdentityKey) -> String {
    format!("quota:{}", identity.as_str())
}
