use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;

/// Longest accepted title, in characters.
pub const TITLE_MAX_LEN: usize = 200;

/// Todo entity - a single item on a user's list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Todo {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub notes: Option<String>,
    pub is_complete: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Partial update applied by [`Todo::apply`]. `None` leaves a field untouched.
#[derive(Debug, Clone, Default)]
pub struct TodoChanges {
    pub title: Option<String>,
    pub notes: Option<Option<String>>,
    pub is_complete: Option<bool>,
}

impl Todo {
    /// Create a new, incomplete todo owned by `user_id`.
    pub fn new(user_id: Uuid, title: &str, notes: Option<String>) -> Result<Self, DomainError> {
        let title = validate_title(title)?;
        let now = Utc::now();

        Ok(Self {
            id: Uuid::new_v4(),
            user_id,
            title,
            notes,
            is_complete: false,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn is_owned_by(&self, user_id: Uuid) -> bool {
        self.user_id == user_id
    }

    pub fn apply(&mut self, changes: TodoChanges) -> Result<(), DomainError> {
        if let Some(title) = changes.title {
            self.title = validate_title(&title)?;
        }
        if let Some(notes) = changes.notes {
            self.notes = notes;
        }
        if let Some(is_complete) = changes.is_complete {
            self.is_complete = is_complete;
        }
        self.updated_at = Utc::now();
        Ok(())
    }
}

fn validate_title(title: &str) -> Result<String, DomainError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(DomainError::Validation("title must not be empty".to_string()));
    }
    if title.chars().count() > TITLE_MAX_LEN {
        return Err(DomainError::Validation(format!(
            "title must be at most {} characters",
            TITLE_MAX_LEN
        )));
    }
    Ok(title.to_string())
}
