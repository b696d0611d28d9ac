//! Domain-level error types.

use thiserror::Error;
use uuid::Uuid;

/// Domain errors - business rule failures surfaced to handlers.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("{entity_type} {id} not found")]
    NotFound { entity_type: &'static str, id: Uuid },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Duplicate entity: {0}")]
    Duplicate(String),

    #[error("Operation not permitted")]
    Forbidden,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl DomainError {
    pub fn todo_not_found(id: Uuid) -> Self {
        DomainError::NotFound {
            entity_type: "Todo",
            id,
        }
    }

    pub fn user_not_found(id: Uuid) -> Self {
        DomainError::NotFound {
            entity_type: "User",
            id,
        }
    }
}

/// Repository-level errors.
///
/// `Connection` is what the quota resolver treats as "directory unavailable".
#[derive(Debug, Error)]
pub enum RepoError {
    #[error("Database connection failed: {0}")]
    Connection(String),

    #[error("Query execution failed: {0}")]
    Query(String),

    #[error("Entity not found")]
    NotFound,

    #[error("Constraint violation: {0}")]
    Constraint(String),
}
