//! Rate-limit value types shared by the policy services and the limiter backends.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Key that distinguishes rate-limit subjects.
///
/// Derived per request from a token claim. The empty key is the anonymous caller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct IdentityKey(String);

impl IdentityKey {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn anonymous() -> Self {
        Self(String::new())
    }

    pub fn is_anonymous(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_anonymous() {
            f.write_str("Anonymous")
        } else {
            f.write_str(&self.0)
        }
    }
}

/// Quota applied to one identity: `permit_limit` requests per `window_minutes`.
///
/// Both values are strictly positive; construction through [`RateLimitProfile::new`]
/// (or deserialization) rejects zeroes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "ProfileRepr")]
pub struct RateLimitProfile {
    permit_limit: u32,
    window_minutes: u32,
}

#[derive(Deserialize)]
struct ProfileRepr {
    permit_limit: u32,
    window_minutes: u32,
}

impl TryFrom<ProfileRepr> for RateLimitProfile {
    type Error = DomainError;

    fn try_from(repr: ProfileRepr) -> Result<Self, Self::Error> {
        Self::new(repr.permit_limit, repr.window_minutes)
    }
}

impl RateLimitProfile {
    /// Quota for callers without an identity.
    pub const ANONYMOUS: Self = Self {
        permit_limit: 30,
        window_minutes: 5,
    };

    /// Quota for identified callers without a personalised record.
    pub const AUTHENTICATED_DEFAULT: Self = Self {
        permit_limit: 60,
        window_minutes: 5,
    };

    pub fn new(permit_limit: u32, window_minutes: u32) -> Result<Self, DomainError> {
        if permit_limit == 0 {
            return Err(DomainError::Validation(
                "permit_limit must be greater than zero".to_string(),
            ));
        }
        if window_minutes == 0 {
            return Err(DomainError::Validation(
                "window_minutes must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            permit_limit,
            window_minutes,
        })
    }

    pub fn permit_limit(&self) -> u32 {
        self.permit_limit
    }

    pub fn window_minutes(&self) -> u32 {
        self.window_minutes
    }

    pub fn window(&self) -> Duration {
        Duration::from_secs(u64::from(self.window_minutes) * 60)
    }
}

/// Outcome of a single admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The request may proceed.
    Admitted {
        remaining: u32,
        reset_after: Duration,
    },
    /// The partition's window is full. Never queued.
    Rejected { retry_after: Duration },
}

impl Admission {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Admission::Admitted { .. })
    }

    /// Seconds until the current window closes, rounded up.
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            Admission::Rejected { retry_after } => {
                let secs = retry_after.as_secs();
                if retry_after.subsec_nanos() > 0 {
                    Some(secs + 1)
                } else {
                    Some(secs.max(1))
                }
            }
            Admission::Admitted { .. } => None,
        }
    }
}
