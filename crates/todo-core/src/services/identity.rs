//! Identity extraction from the `Authorization` header.

use std::sync::Arc;

use crate::domain::IdentityKey;
use crate::ports::{AuthError, TokenService};

/// Whether the identity claim is read before or after signature verification.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ClaimTrust {
    /// The token must pass signature, issuer and expiry checks first.
    #[default]
    Verified,
    /// The claim is decoded without checking the signature.
    Unverified,
}

/// Derives the rate-limit identity of a request from its bearer token.
///
/// Never fails: anything that is not a readable bearer token with the
/// identity claim yields the anonymous key.
pub struct IdentityExtractor {
    tokens: Arc<dyn TokenService>,
    claim: String,
    trust: ClaimTrust,
}

impl IdentityExtractor {
    pub const DEFAULT_CLAIM: &'static str = "email";

    pub fn new(tokens: Arc<dyn TokenService>) -> Self {
        Self {
            tokens,
            claim: Self::DEFAULT_CLAIM.to_string(),
            trust: ClaimTrust::default(),
        }
    }

    pub fn with_claim(mut self, claim: impl Into<String>) -> Self {
        self.claim = claim.into();
        self
    }

    pub fn with_trust(mut self, trust: ClaimTrust) -> Self {
        self.trust = trust;
        self
    }

    pub fn extract(&self, authorization: Option<&str>) -> IdentityKey {
        let Some(token) = authorization.and_then(bearer_token) else {
            return IdentityKey::anonymous();
        };

        match self.read_claim(token) {
            Ok(Some(value)) if !value.is_empty() => IdentityKey::new(value),
            Ok(_) => {
                tracing::warn!(
                    claim = %self.claim,
                    "Bearer token carries no identity claim, treating caller as anonymous"
                );
                IdentityKey::anonymous()
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    "Unreadable bearer token, treating caller as anonymous"
                );
                IdentityKey::anonymous()
            }
        }
    }

    fn read_claim(&self, token: &str) -> Result<Option<String>, AuthError> {
        if self.trust == ClaimTrust::Verified {
            self.tokens.validate_token(token)?;
        }
        self.tokens.peek_claim(token, &self.claim)
    }
}

/// The token part of `Bearer <token>`; the scheme is case-insensitive.
fn bearer_token(header: &str) -> Option<&str> {
    let (scheme, token) = header.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }

    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::testing::FakeTokenService;

    fn extractor(trust: ClaimTrust) -> IdentityExtractor {
        IdentityExtractor::new(Arc::new(FakeTokenService)).with_trust(trust)
    }

    #[test]
    fn test_missing_header_is_anonymous() {
        let identity = extractor(ClaimTrust::Verified).extract(None);
        assert!(identity.is_anonymous());
    }

    #[test]
    fn test_non_bearer_scheme_is_anonymous() {
        let identity = extractor(ClaimTrust::Verified).extract(Some("Basic dXNlcjpwYXNz"));
        assert!(identity.is_anonymous());
    }

    #[test]
    fn test_garbage_token_is_anonymous() {
        let identity = extractor(ClaimTrust::Unverified).extract(Some("Bearer garbage-not-a-jwt"));
        assert!(identity.is_anonymous());

        let identity = extractor(ClaimTrust::Verified).extract(Some("Bearer garbage-not-a-jwt"));
        assert!(identity.is_anonymous());
    }

    #[test]
    fn test_signed_token_yields_email() {
        let identity =
            extractor(ClaimTrust::Verified).extract(Some("Bearer signed.alice@example.com"));
        assert_eq!(identity.as_str(), "alice@example.com");
    }

    #[test]
    fn test_scheme_is_case_insensitive() {
        let identity =
            extractor(ClaimTrust::Verified).extract(Some("bearer signed.alice@example.com"));
        assert_eq!(identity.as_str(), "alice@example.com");
    }

    #[test]
    fn test_unsigned_token_depends_on_trust() {
        let header = Some("Bearer unsigned.mallory@example.com");

        assert!(extractor(ClaimTrust::Verified).extract(header).is_anonymous());
        assert_eq!(
            extractor(ClaimTrust::Unverified).extract(header).as_str(),
            "mallory@example.com"
        );
    }

    #[test]
    fn test_missing_claim_is_anonymous() {
        let identity = extractor(ClaimTrust::Verified)
            .with_claim("tenant")
            .extract(Some("Bearer signed.alice@example.com"));
        assert!(identity.is_anonymous());
    }

    #[test]
    fn test_bearer_token_parsing() {
        assert_eq!(bearer_token("Bearer abc"), Some("abc"));
        assert_eq!(bearer_token("  Bearer   abc  "), Some("abc"));
        assert_eq!(bearer_token("Bearer "), None);
        assert_eq!(bearer_token("Bearer"), None);
        assert_eq!(bearer_token("Token abc"), None);
    }
}
