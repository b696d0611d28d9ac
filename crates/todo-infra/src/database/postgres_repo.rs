//! PostgreSQL repository implementations.

use async_trait::async_trait;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, QueryOrder};
use uuid::Uuid;

use todo_core::domain::{Todo, User};
use todo_core::error::RepoError;
use todo_core::ports::{TodoRepository, UserRepository};

use super::entity::todo::{self, Entity as TodoEntity};
use super::entity::user::{self, Entity as UserEntity};
use super::postgres_base::{PostgresBaseRepository, query_error};

/// PostgreSQL user repository.
pub type PostgresUserRepository = PostgresBaseRepository<UserEntity>;

/// PostgreSQL todo repository.
pub type PostgresTodoRepository = PostgresBaseRepository<TodoEntity>;

/// `alice@example.com` -> `a***@example.com`, keeping PII out of logs.
pub(crate) fn mask_email(email: &str) -> String {
    match email.split_once('@') {
        Some((local, domain)) => match local.chars().next() {
            Some(first) if local.chars().count() > 1 => format!("{}***@{}", first, domain),
            _ => format!("***@{}", domain),
        },
        None => "***".to_string(),
    }
}

#[async_trait]
impl UserRepository for PostgresUserRepository {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, RepoError> {
        tracing::debug!(user_email = %mask_email(email), "Finding user by email");

        let result = UserEntity::find()
            .filter(user::Column::Email.eq(email))
            .one(&self.db)
            .await
            .map_err(query_error)?;

        Ok(result.map(Into::into))
    }
}

#[async_trait]
impl TodoRepository for PostgresTodoRepository {
    async fn find_by_user_id(&self, user_id: Uuid) -> Result<Vec<Todo>, RepoError> {
        let result = TodoEntity::find()
            .filter(todo::Column::UserId.eq(user_id))
            .order_by_asc(todo::Column::CreatedAt)
            .all(&self.db)
            .await
            .map_err(query_error)?;

        Ok(result.into_iter().map(Into::into).collect())
    }
}
