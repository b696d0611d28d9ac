//! Application configuration loaded from environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use todo_core::domain::RateLimitProfile;
use todo_core::services::{AnonymousPartitioning, ClaimTrust, IdentityExtractor, QuotaPolicy};
use todo_infra::JwtConfig;
use todo_infra::RateLimitConfig;
use todo_infra::database::DatabaseConfig;

#[cfg(feature = "redis")]
use todo_infra::RedisConfig;

#[cfg(feature = "scheduler")]
use crate::background::SchedulerConfig;
use crate::telemetry::TelemetryConfig;

/// Rate limiting settings.
#[derive(Debug, Clone)]
pub struct RateLimitSettings {
    pub policy: QuotaPolicy,
    pub identity_claim: String,
    pub claim_trust: ClaimTrust,
    pub anonymous: AnonymousPartitioning,
    pub store: RateLimitConfig,
    /// Cron schedule of the idle-partition purge.
    pub eviction_cron: String,
}

impl RateLimitSettings {
    pub fn from_env() -> Self {
        let anonymous = profile_from_env(
            "RATE_LIMIT_ANONYMOUS_PERMITS",
            "RATE_LIMIT_ANONYMOUS_WINDOW_MINUTES",
            RateLimitProfile::ANONYMOUS,
        );
        let authenticated = profile_from_env(
            "RATE_LIMIT_DEFAULT_PERMITS",
            "RATE_LIMIT_DEFAULT_WINDOW_MINUTES",
            RateLimitProfile::AUTHENTICATED_DEFAULT,
        );

        Self {
            policy: QuotaPolicy {
                anonymous,
                authenticated,
                cache_ttl: Duration::from_secs(parse_or("RATE_LIMIT_PROFILE_CACHE_SECS", 60)),
            },
            identity_claim: env::var("RATE_LIMIT_IDENTITY_CLAIM")
                .unwrap_or_else(|_| IdentityExtractor::DEFAULT_CLAIM.to_string()),
            claim_trust: if flag("RATE_LIMIT_TRUST_UNVERIFIED_CLAIMS", false) {
                ClaimTrust::Unverified
            } else {
                ClaimTrust::Verified
            },
            anonymous: if flag("RATE_LIMIT_ANONYMOUS_PER_ADDRESS", false) {
                AnonymousPartitioning::PerRemoteAddress
            } else {
                AnonymousPartitioning::Shared
            },
            store: RateLimitConfig::from_env(),
            eviction_cron: env::var("RATE_LIMIT_EVICTION_CRON")
                .unwrap_or_else(|_| "0 * * * * *".to_string()),
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub database: Option<DatabaseConfig>,
    #[cfg(feature = "redis")]
    pub redis: Option<RedisConfig>,
    pub jwt: JwtConfig,
    /// Emails granted the admin role at registration.
    pub admin_emails: Vec<String>,
    pub rate_limit: RateLimitSettings,
    #[cfg(feature = "scheduler")]
    pub scheduler: SchedulerConfig,
    pub telemetry: TelemetryConfig,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self {
            host: env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: parse_or("PORT", 8080),
            database: DatabaseConfig::from_env(),
            #[cfg(feature = "redis")]
            redis: RedisConfig::from_env(),
            jwt: JwtConfig::from_env(),
            admin_emails: parse_list(&env::var("ADMIN_EMAILS").unwrap_or_default()),
            rate_limit: RateLimitSettings::from_env(),
            #[cfg(feature = "scheduler")]
            scheduler: SchedulerConfig::from_env(),
            telemetry: TelemetryConfig::from_env(),
        }
    }
}

fn parse_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn flag(key: &str, default: bool) -> bool {
    env::var(key)
        .map(|v| v == "true" || v == "1")
        .unwrap_or(default)
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Reads a profile from two variables, keeping `default` when either is
/// missing or the pair is not a valid profile.
fn profile_from_env(permits: &str, window: &str, default: RateLimitProfile) -> RateLimitProfile {
    let permit_limit = parse_or(permits, default.permit_limit());
    let window_minutes = parse_or(window, default.window_minutes());

    RateLimitProfile::new(permit_limit, window_minutes).unwrap_or_else(|e| {
        tracing::warn!(
            permits = %permits,
            error = %e,
            "Invalid rate limit profile in environment, using default"
        );
        default
    })
}
