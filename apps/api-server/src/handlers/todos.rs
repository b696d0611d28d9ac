//! Todo CRUD handlers. Every route is scoped to the caller's own todos.

use actix_web::{HttpResponse, web};
use uuid::Uuid;

use todo_core::domain::{Todo, TodoChanges};
use todo_core::error::DomainError;
use todo_core::ports::{BaseRepository, TodoRepository};
use todo_shared::ApiResponse;
use todo_shared::dto::{CreateTodoRequest, TodoResponse, UpdateTodoRequest};

use crate::middleware::auth::Identity;
use crate::middleware::error::AppResult;
use crate::state::AppState;

fn to_response(todo: Todo) -> TodoResponse {
    TodoResponse {
        id: todo.id,
        title: todo.title,
        notes: todo.notes,
        is_complete: todo.is_complete,
        created_at: todo.created_at,
        updated_at: todo.updated_at,
    }
}

/// Loads a todo owned by the caller. Someone else's todo is reported as missing.
async fn find_owned(state: &AppState, identity: &Identity, id: Uuid) -> AppResult<Todo> {
    match state.todos.find_by_id(id).await? {
        Some(todo) if todo.is_owned_by(identity.user_id) => Ok(todo),
        _ => Err(DomainError::todo_not_found(id).into()),
    }
}

/// GET /api/v1/todos
pub async fn list(state: web::Data<AppState>, identity: Identity) -> AppResult<HttpResponse> {
    let todos = state.todos.find_by_user_id(identity.user_id).await?;
    let body: Vec<TodoResponse> = todos.into_iter().map(to_response).collect();

    Ok(HttpResponse::Ok().json(ApiResponse::ok(body)))
}

/// POST /api/v1/todos
pub async fn create(
    state: web::Data<AppState>,
    identity: Identity,
    body: web::Json<CreateTodoRequest>,
) -> AppResult<HttpResponse> {
    let req = body.into_inner();
    let todo = Todo::new(identity.user_id, &req.title, req.notes)?;
    let todo = state.todos.save(todo).await?;

    tracing::debug!(todo_id = %todo.id, user_id = %identity.user_id, "Todo created");

    Ok(HttpResponse::Created().json(ApiResponse::ok(to_response(todo))))
}

/// GET /api/v1/todos/{id}
pub async fn get(
    state: web::Data<AppState>,
    identity: Identity,
    path: web::Path<Uuid>,
) -> AppResult<HttpResponse> {
    let todo = find_owned(&state, &identity, path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::ok(to_response(todo))))
}

/// PUT /api/v1/todos/{id}
pub async fn update(
    state: web::Data<AppState>,
    identity: Identity,
    path: web::Path<Uuid>,
    body: web::Json<UpdateTodoRequest>,
) -> AppResult<HttpResponse> {
    let mut todo = find_owned(&state, &identity, path.into_inner()).await?;

    let req = body.into_inner();
    todo.apply(TodoChanges {
        title: req.title,
        notes: req.notes,
        is_complete: req.is_complete,
    })?;
    let todo = state.todos.save(todo).await?;

    Ok(HttpResponse::Ok().json(ApiResponse::ok(to_response(todo))))
}

/// DELETE /api/v1/todos/{id}
pub async fn delete(
    state: web::Data<AppState>,
    identity: Identity,
    path: web::Path<Uuid>,
) -> AppResult<HttpResponse> {
    let todo = find_owned(&state, &identity, path.into_inner()).await?;
    state.todos.delete(todo.id).await?;

    Ok(HttpResponse::NoContent().finish())
}
