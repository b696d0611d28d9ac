//! # Todo Core
//!
//! The domain layer of the Todo API.
//! This crate contains the entities, the ports infrastructure must implement,
//! and the rate-limit policy that sits in front of every versioned route.
//! It has zero infrastructure dependencies.

pub mod domain;
pub mod error;
pub mod ports;
pub mod services;

pub use error::DomainError;
