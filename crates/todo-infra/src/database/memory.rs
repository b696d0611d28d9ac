//! In-memory repositories - used when no database is configured, and in tests.
//!
//! Data is lost on process restart.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use todo_core::domain::{Todo, User};
use todo_core::error::RepoError;
use todo_core::ports::{BaseRepository, TodoRepository, UserRepository};

/// User directory on a `HashMap` keyed by id. Emails are unique.
#[derive(Default)]
pub struct InMemoryUserRepository {
    users: RwLock<HashMap<Uuid, User>>,
}

impl InMemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BaseRepository<User, Uuid> for InMemoryUserRepository {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, RepoError> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn save(&self, user: User) -> Result<User, RepoError> {
        let mut users = self.users.write().await;

        let taken = users
            .values()
            .any(|existing| existing.id != user.id && existing.email == user.email);
        if taken {
            return Err(RepoError::Constraint("Entity already exists".to_string()));
        }

        users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn delete(&self, id: Uuid) -> Result<(), RepoError> {
        self.users
            .write()
            .await
            .remove(&id)
            .map(|_| ())
            .ok_or(RepoError::NotFound)
    }
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, RepoError> {
        let users = self.users.read().await;
        Ok(users.values().find(|u| u.email == email).cloned())
    }
}

/// Todo store on a `HashMap` keyed by id.
#[derive(Default)]
pub struct InMemoryTodoRepository {
    todos: RwLock<HashMap<Uuid, Todo>>,
}

impl InMemoryTodoRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BaseRepository<Todo, Uuid> for InMemoryTodoRepository {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Todo>, RepoError> {
        Ok(self.todos.read().await.get(&id).cloned())
    }

    async fn save(&self, todo: Todo) -> Result<Todo, RepoError> {
        self.todos.write().await.insert(todo.id, todo.clone());
        Ok(todo)
    }

    async fn delete(&self, id: Uuid) -> Result<(), RepoError> {
        self.todos
            .write()
            .await
            .remove(&id)
            .map(|_| ())
            .ok_or(RepoError::NotFound)
    }
}

#[async_trait]
impl TodoRepository for InMemoryTodoRepository {
    async fn find_by_user_id(&self, user_id: Uuid) -> Result<Vec<Todo>, RepoError> {
        let todos = self.todos.read().await;
        let mut owned: Vec<Todo> = todos
            .values()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect();
        owned.sort_by_key(|t| t.created_at);
        Ok(owned)
    }
}
