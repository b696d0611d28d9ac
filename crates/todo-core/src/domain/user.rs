use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::RateLimitProfile;

/// User entity - an account that owns todos and carries its own rate-limit quota.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub is_admin: bool,
    /// Requests allowed per window.
    pub permit_limit: u32,
    pub rate_limit_window_minutes: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Create a new user with generated ID and timestamps.
    ///
    /// The stored quota starts out as `profile`, normally the default
    /// authenticated profile.
    pub fn new(email: String, password_hash: String, profile: RateLimitProfile) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            email,
            password_hash,
            is_admin: false,
            permit_limit: profile.permit_limit(),
            rate_limit_window_minutes: profile.window_minutes(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_admin(mut self, is_admin: bool) -> Self {
        self.is_admin = is_admin;
        self
    }

    /// Roles embedded in issued tokens.
    pub fn roles(&self) -> Vec<String> {
        let mut roles = vec!["user".to_string()];
        if self.is_admin {
            roles.push("admin".to_string());
        }
        roles
    }

    /// The stored quota, if it is a valid profile.
    pub fn rate_limit_profile(&self) -> Option<RateLimitProfile> {
        RateLimitProfile::new(self.permit_limit, self.rate_limit_window_minutes).ok()
    }

    pub fn set_rate_limit_profile(&mut self, profile: RateLimitProfile) {
        self.permit_limit = profile.permit_limit();
        self.rate_limit_window_minutes = profile.window_minutes();
        self.updated_at = Utc::now();
    }
}
