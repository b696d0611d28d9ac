//! Rate-limit policy services.
//!
//! Every versioned request runs through [`IdentityExtractor`] -> [`QuotaResolver`]
//! -> [`AdmissionController`] before it reaches a resource handler.

mod admission;
mod identity;
mod quota;

pub use admission::{AdmissionController, AdmissionDecision, AnonymousPartitioning};
pub use identity::{ClaimTrust, IdentityExtractor};
pub use quota::{QuotaPolicy, QuotaResolver};

#[cfg(test)]
pub(crate) mod testing;
