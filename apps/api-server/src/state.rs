//! Application state - shared across all handlers.

use std::sync::Arc;

use todo_core::ports::{
    Cache, PasswordService, RateLimiter, TodoRepository, TokenService, UserRepository,
};
use todo_core::services::{AdmissionController, IdentityExtractor, QuotaResolver};
use todo_infra::{
    Argon2PasswordService, InMemoryCache, InMemoryRateLimiter, InMemoryTodoRepository,
    InMemoryUserRepository, JwtTokenService,
};

#[cfg(feature = "postgres")]
use todo_infra::database::{DatabaseConnections, PostgresTodoRepository, PostgresUserRepository};
#[cfg(feature = "redis")]
use todo_infra::{RedisCache, RedisRateLimitConfig, RedisRateLimiter};

use crate::config::AppConfig;

/// Fatal startup failures.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("Redis unavailable and in-memory fallback disabled: {0}")]
    Redis(String),
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub users: Arc<dyn UserRepository>,
    pub todos: Arc<dyn TodoRepository>,
    pub tokens: Arc<dyn TokenService>,
    pub passwords: Arc<dyn PasswordService>,
    pub limiter: Arc<dyn RateLimiter>,
    pub admission: Arc<AdmissionController>,
    pub admin_emails: Arc<Vec<String>>,
    #[cfg(feature = "postgres")]
    pub db: Option<Arc<DatabaseConnections>>,
}

impl AppState {
    /// Build the application state with appropriate implementations.
    pub async fn new(config: &AppConfig) -> Result<Self, StartupError> {
        #[cfg(feature = "postgres")]
        let (db, users, todos) = Self::repositories(config).await;
        #[cfg(not(feature = "postgres"))]
        let (users, todos) = {
            tracing::info!("Running without postgres feature - using in-memory repositories");
            Self::in_memory_repositories()
        };

        let (cache, limiter) = Self::rate_limit_backends(config).await?;

        let tokens: Arc<dyn TokenService> = Arc::new(JwtTokenService::new(config.jwt.clone()));
        let passwords: Arc<dyn PasswordService> = Arc::new(Argon2PasswordService::new());

        let settings = &config.rate_limit;
        let resolver = QuotaResolver::new(users.clone(), settings.policy.clone()).with_cache(cache);
        let extractor = IdentityExtractor::new(tokens.clone())
            .with_claim(settings.identity_claim.clone())
            .with_trust(settings.claim_trust);
        let admission = AdmissionController::new(extractor, Arc::new(resolver), limiter.clone())
            .with_anonymous_partitioning(settings.anonymous);

        tracing::info!(
            anonymous_permits = settings.policy.anonymous.permit_limit(),
            default_permits = settings.policy.authenticated.permit_limit(),
            claim = %settings.identity_claim,
            trust = ?settings.claim_trust,
            "Application state initialized"
        );

        Ok(Self {
            users,
            todos,
            tokens,
            passwords,
            limiter,
            admission: Arc::new(admission),
            admin_emails: Arc::new(config.admin_emails.clone()),
            #[cfg(feature = "postgres")]
            db,
        })
    }

    /// Whether `email` is granted the admin role on registration.
    pub fn is_admin_email(&self, email: &str) -> bool {
        self.admin_emails.iter().any(|e| e == email)
    }

    /// Round-trip to the database when one is connected.
    pub async fn ping_database(&self) -> Result<(), String> {
        #[cfg(feature = "postgres")]
        if let Some(db) = &self.db {
            db.ping().await.map_err(|e| e.to_string())?;
        }

        Ok(())
    }

    fn in_memory_repositories() -> (Arc<dyn UserRepository>, Arc<dyn TodoRepository>) {
        (
            Arc::new(InMemoryUserRepository::new()),
            Arc::new(InMemoryTodoRepository::new()),
        )
    }

    #[cfg(feature = "postgres")]
    async fn repositories(
        config: &AppConfig,
    ) -> (
        Option<Arc<DatabaseConnections>>,
        Arc<dyn UserRepository>,
        Arc<dyn TodoRepository>,
    ) {
        let Some(db_config) = &config.database else {
            tracing::warn!("DATABASE_URL not set. Running without database (in-memory mode).");
            let (users, todos) = Self::in_memory_repositories();
            return (None, users, todos);
        };

        match DatabaseConnections::init(db_config).await {
            Ok(connections) => {
                let conn = Arc::new(connections);
                let users = Arc::new(PostgresUserRepository::new(conn.main.clone()));
                let todos = Arc::new(PostgresTodoRepository::new(conn.main.clone()));
                (Some(conn), users, todos)
            }
            Err(e) => {
                tracing::error!(
                    "Failed to connect to database: {}. Using in-memory fallback.",
                    e
                );
                let (users, todos) = Self::in_memory_repositories();
                (None, users, todos)
            }
        }
    }

    /// Profile cache and partition store. Redis when configured and reachable,
    /// otherwise in-process.
    async fn rate_limit_backends(
        config: &AppConfig,
    ) -> Result<(Arc<dyn Cache>, Arc<dyn RateLimiter>), StartupError> {
        let in_memory = || -> (Arc<dyn Cache>, Arc<dyn RateLimiter>) {
            (
                Arc::new(InMemoryCache::new()),
                Arc::new(InMemoryRateLimiter::new(config.rate_limit.store.clone())),
            )
        };

        #[cfg(feature = "redis")]
        if let Some(redis) = &config.redis {
            let connected = async {
                let cache = RedisCache::new(redis).await.map_err(|e| e.to_string())?;
                let limiter = RedisRateLimiter::new(RedisRateLimitConfig::new(redis.clone()))
                    .await
                    .map_err(|e| e.to_string())?;
                Ok::<_, String>((cache, limiter))
            }
            .await;

            return match connected {
                Ok((cache, limiter)) => Ok((Arc::new(cache), Arc::new(limiter))),
                Err(e) if redis.fallback_to_memory => {
                    tracing::error!(
                        "Failed to connect to Redis: {}. Using in-memory rate limiting.",
                        e
                    );
                    Ok(in_memory())
                }
                Err(e) => Err(StartupError::Redis(e)),
            };
        }

        tracing::info!("Using in-memory rate limiting (limits are per instance)");
        Ok(in_memory())
    }
}
