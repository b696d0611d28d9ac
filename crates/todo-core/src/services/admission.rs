//! Admission control: identity -> quota -> partition counter.

use std::sync::Arc;

use crate::domain::{Admission, IdentityKey, RateLimitProfile};
use crate::ports::RateLimiter;

use super::{IdentityExtractor, QuotaResolver};

/// How anonymous callers are grouped into partitions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AnonymousPartitioning {
    /// All anonymous callers share a single counter.
    #[default]
    Shared,
    /// One counter per remote address.
    PerRemoteAddress,
}

/// Result of [`AdmissionController::admit`], carrying what the transport layer logs.
#[derive(Debug, Clone)]
pub struct AdmissionDecision {
    pub identity: IdentityKey,
    pub profile: RateLimitProfile,
    pub admission: Admission,
}

impl AdmissionDecision {
    pub fn is_admitted(&self) -> bool {
        self.admission.is_admitted()
    }
}

/// Decides whether a request may proceed past the rate limiter.
pub struct AdmissionController {
    extractor: IdentityExtractor,
    resolver: Arc<QuotaResolver>,
    limiter: Arc<dyn RateLimiter>,
    anonymous: AnonymousPartitioning,
}

impl AdmissionController {
    pub fn new(
        extractor: IdentityExtractor,
        resolver: Arc<QuotaResolver>,
        limiter: Arc<dyn RateLimiter>,
    ) -> Self {
        Self {
            extractor,
            resolver,
            limiter,
            anonymous: AnonymousPartitioning::default(),
        }
    }

    pub fn with_anonymous_partitioning(mut self, anonymous: AnonymousPartitioning) -> Self {
        self.anonymous = anonymous;
        self
    }

    pub fn resolver(&self) -> &Arc<QuotaResolver> {
        &self.resolver
    }

    /// Admit or reject one request.
    ///
    /// The quota is resolved before the partition is touched, so directory I/O
    /// never happens inside a partition's critical section. A failing limiter
    /// backend admits the request.
    pub async fn admit(
        &self,
        authorization: Option<&str>,
        remote_addr: Option<&str>,
    ) -> AdmissionDecision {
        let identity = self.extractor.extract(authorization);
        let profile = self.resolver.resolve(&identity).await;
        let key = self.partition_key(&identity, remote_addr);

        let admission = match self.limiter.check(&key, &profile).await {
            Ok(admission) => admission,
            Err(e) => {
                tracing::error!(partition = %key, error = %e, "Rate limiter failed, admitting request");
                Admission::Admitted {
                    remaining: profile.permit_limit(),
                    reset_after: profile.window(),
                }
            }
        };

        AdmissionDecision {
            identity,
            profile,
            admission,
        }
    }

    /// Partition key for `identity`. Identities are prefixed so that no email can
    /// collide with an anonymous partition.
    pub fn partition_key(&self, identity: &IdentityKey, remote_addr: Option<&str>) -> String {
        if !identity.is_anonymous() {
            return format!("user:{}", identity.as_str());
        }

        match (self.anonymous, remote_addr) {
            (AnonymousPartitioning::PerRemoteAddress, Some(addr)) => format!("anonymous:{}", addr),
            _ => "anonymous".to_string(),
        }
    }
}
