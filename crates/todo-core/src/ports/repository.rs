use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::{Todo, User};
use crate::error::RepoError;

/// Generic repository trait defining standard CRUD operations.
#[async_trait]
pub trait BaseRepository<T, ID>: Send + Sync {
    /// Find an entity by its unique ID.
    async fn find_by_id(&self, id: ID) -> Result<Option<T>, RepoError>;

    /// Save an entity (create or update).
    async fn save(&self, entity: T) -> Result<T, RepoError>;

    /// Delete an entity by its ID. Deleting a missing entity is `RepoError::NotFound`.
    async fn delete(&self, id: ID) -> Result<(), RepoError>;
}

/// User repository - doubles as the directory the quota resolver consults.
#[async_trait]
pub trait UserRepository: BaseRepository<User, Uuid> {
    /// Find a user by their email address.
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, RepoError>;
}

/// Todo repository.
#[async_trait]
pub trait TodoRepository: BaseRepository<Todo, Uuid> {
    /// All todos owned by `user_id`, oldest first.
    async fn find_by_user_id(&self, user_id: Uuid) -> Result<Vec<Todo>, RepoError>;
}
