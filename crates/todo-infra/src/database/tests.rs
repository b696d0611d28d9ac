#[cfg(test)]
mod tests {
    use crate::database::entity::{todo, user};
    use crate::database::postgres_repo::{PostgresTodoRepository, PostgresUserRepository};
    use sea_orm::{DatabaseBackend, MockDatabase};
    use todo_core::domain::{Todo, User};
    use todo_core::ports::{BaseRepository, TodoRepository, UserRepository};

    fn todo_model(user_id: uuid::Uuid, title: &str) -> todo::Model {
        let now = chrono::Utc::now();
        todo::Model {
            id: uuid::Uuid::new_v4(),
            user_id,
            title: title.to_owned(),
            notes: None,
            is_complete: false,
            created_at: now.into(),
            updated_at: now.into(),
        }
    }

    #[tokio::test]
    async fn test_find_todo_by_id() {
        let model = todo_model(uuid::Uuid::new_v4(), "Water plants");
        let todo_id = model.id;

        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results(vec![vec![model]])
            .into_connection();

        let repo = PostgresTodoRepository::new(db);
        let result: Option<Todo> = repo.find_by_id(todo_id).await.unwrap();

        let todo = result.unwrap();
        assert_eq!(todo.title, "Water plants");
        assert_eq!(todo.id, todo_id);
    }

    #[tokio::test]
    async fn test_find_todos_by_user() {
        let owner = uuid::Uuid::new_v4();

        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results(vec![vec![
                todo_model(owner, "one"),
                todo_model(owner, "two"),
            ]])
            .into_connection();

        let repo = PostgresTodoRepository::new(db);
        let todos = repo.find_by_user_id(owner).await.unwrap();

        assert_eq!(todos.len(), 2);
        assert!(todos.iter().all(|t| t.user_id == owner));
    }

    #[tokio::test]
    async fn test_save_inserts_when_update_matches_nothing() {
        let model = todo_model(uuid::Uuid::new_v4(), "New item");
        let domain: Todo = model.clone().into();

        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results(vec![Vec::<todo::Model>::new(), vec![model.clone()]])
            .into_connection();

        let repo = PostgresTodoRepository::new(db);
        let saved: Todo = repo.save(domain).await.unwrap();

        assert_eq!(saved.id, model.id);
        assert_eq!(saved.title, "New item");
    }

    #[tokio::test]
    async fn test_find_user_by_email_maps_quota() {
        let now = chrono::Utc::now();
        let model = user::Model {
            id: uuid::Uuid::new_v4(),
            email: "alice@example.com".to_owned(),
            password_hash: "hash".to_owned(),
            is_admin: false,
            permit_limit: 3,
            rate_limit_window_minutes: 1,
            created_at: now.into(),
            updated_at: now.into(),
        };

        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results(vec![vec![model]])
            .into_connection();

        let repo = PostgresUserRepository::new(db);
        let user: User = repo
            .find_by_email("alice@example.com")
            .await
            .unwrap()
            .unwrap();

        assert_eq!(user.permit_limit, 3);
        assert_eq!(user.rate_limit_window_minutes, 1);
        assert!(user.rate_limit_profile().is_some());
    }
}
