//! In-process fakes for the ports the rate-limit services consume.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::{Admission, RateLimitProfile, User};
use crate::error::RepoError;
use crate::ports::{
    AuthError, BaseRepository, Cache, CacheError, RateLimitError, RateLimiter, TokenClaims,
    TokenService, UserRepository,
};

/// Tokens look like `signed.<email>` (valid) or `unsigned.<email>` (bad signature).
pub struct FakeTokenService;

impl TokenService for FakeTokenService {
    fn generate_token(&self, _: Uuid, email: &str, _: Vec<String>) -> Result<String, AuthError> {
        Ok(format!("signed.{}", email))
    }

    fn validate_token(&self, token: &str) -> Result<TokenClaims, AuthError> {
        match token.strip_prefix("signed.") {
            Some(email) => Ok(TokenClaims {
                user_id: Uuid::nil(),
                email: email.to_string(),
                roles: vec![],
                exp: 0,
            }),
            None => Err(AuthError::InvalidToken("bad signature".to_string())),
        }
    }

    fn peek_claim(&self, token: &str, claim: &str) -> Result<Option<String>, AuthError> {
        let email = token
            .strip_prefix("signed.")
            .or_else(|| token.strip_prefix("unsigned."))
            .ok_or_else(|| AuthError::InvalidToken("malformed".to_string()))?;

        Ok((claim == "email").then(|| email.to_string()))
    }

    fn expiration_seconds(&self) -> i64 {
        3600
    }
}

/// User directory backed by a map, with a switch to simulate an outage.
#[derive(Default)]
pub struct FakeDirectory {
    users: Mutex<HashMap<String, User>>,
    pub unavailable: AtomicBool,
    pub lookups: AtomicUsize,
}

impl FakeDirectory {
    pub fn with_user(self, email: &str, permit_limit: u32, window_minutes: u32) -> Self {
        let mut user = User::new(
            email.to_string(),
            "hash".to_string(),
            RateLimitProfile::AUTHENTICATED_DEFAULT,
        );
        user.permit_limit = permit_limit;
        user.rate_limit_window_minutes = window_minutes;
        self.users.lock().unwrap().insert(email.to_string(), user);
        self
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BaseRepository<User, Uuid> for FakeDirectory {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, RepoError> {
        let users = self.users.lock().unwrap();
        Ok(users.values().find(|u| u.id == id).cloned())
    }

    async fn save(&self, user: User) -> Result<User, RepoError> {
        self.users
            .lock()
            .unwrap()
            .insert(user.email.clone(), user.clone());
        Ok(user)
    }

    async fn delete(&self, id: Uuid) -> Result<(), RepoError> {
        self.users.lock().unwrap().retain(|_, u| u.id != id);
        Ok(())
    }
}

#[async_trait]
impl UserRepository for FakeDirectory {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, RepoError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(RepoError::Connection("directory offline".to_string()));
        }
        Ok(self.users.lock().unwrap().get(email).cloned())
    }
}

/// TTL-less cache; expiry is exercised in the infra cache tests.
#[derive(Default)]
pub struct MapCache {
    entries: Mutex<HashMap<String, String>>,
}

#[async_trait]
impl Cache for MapCache {
    async fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().unwrap().get(key).cloned()
    }

    async fn set(&self, key: &str, value: &str, _ttl: Option<Duration>) -> Result<(), CacheError> {
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.entries.lock().unwrap().remove(key);
        Ok(())
    }
}

/// Counts per key with no notion of time.
#[derive(Default)]
pub struct CountingLimiter {
    counts: Mutex<HashMap<String, u32>>,
}

impl CountingLimiter {
    pub fn count(&self, key: &str) -> u32 {
        self.counts.lock().unwrap().get(key).copied().unwrap_or(0)
    }
}

#[async_trait]
impl RateLimiter for CountingLimiter {
    async fn check(
        &self,
        key: &str,
        profile: &RateLimitProfile,
    ) -> Result<Admission, RateLimitError> {
        let mut counts = self.counts.lock().unwrap();
        let count = counts.entry(key.to_string()).or_insert(0);
        if *count < profile.permit_limit() {
            *count += 1;
            Ok(Admission::Admitted {
                remaining: profile.permit_limit() - *count,
                reset_after: profile.window(),
            })
        } else {
            Ok(Admission::Rejected {
                retry_after: profile.window(),
            })
        }
    }
}

pub struct BrokenLimiter;

#[async_trait]
impl RateLimiter for BrokenLimiter {
    async fn check(&self, _: &str, _: &RateLimitProfile) -> Result<Admission, RateLimitError> {
        Err(RateLimitError::Backend("connection refused".to_string()))
    }
}
