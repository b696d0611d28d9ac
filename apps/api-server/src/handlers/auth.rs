//! Authentication handlers.

use actix_web::{HttpResponse, web};

use todo_core::domain::User;
use todo_core::ports::{BaseRepository, PasswordService, TokenService, UserRepository};
use todo_shared::dto::{AuthResponse, LoginRequest, RegisterUserRequest, UserResponse};

use crate::middleware::auth::Identity;
use crate::middleware::error::{AppError, AppResult};
use crate::observability::RequestId;
use crate::state::AppState;

const MIN_PASSWORD_LEN: usize = 8;

fn issue_token(state: &AppState, user: &User) -> AppResult<AuthResponse> {
    let access_token = state
        .tokens
        .generate_token(user.id, &user.email, user.roles())?;

    Ok(AuthResponse {
        access_token,
        token_type: "Bearer".to_string(),
        expires_in: state.tokens.expiration_seconds().max(0) as u64,
    })
}

/// POST /api/v1/auth/register
///
/// New accounts get the default authenticated quota.
pub async fn register(
    state: web::Data<AppState>,
    request_id: RequestId,
    body: web::Json<RegisterUserRequest>,
) -> AppResult<HttpResponse> {
    let req = body.into_inner();
    let email = req.email.trim().to_lowercase();

    if email.is_empty() || !email.contains('@') {
        return Err(AppError::BadRequest("Invalid email address".to_string()));
    }
    if req.password.len() < MIN_PASSWORD_LEN {
        return Err(AppError::BadRequest(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }

    if state.users.find_by_email(&email).await?.is_some() {
        return Err(AppError::Conflict("Email already registered".to_string()));
    }

    let password_hash = state.passwords.hash(&req.password)?;
    let profile = state.admission.resolver().policy().authenticated;
    let is_admin = state.is_admin_email(&email);
    let user = User::new(email, password_hash, profile).with_admin(is_admin);
    let user = state.users.save(user).await?;

    tracing::info!(
        request_id = %request_id.as_str(),
        user_id = %user.id,
        is_admin = user.is_admin,
        "User registered"
    );

    Ok(HttpResponse::Created().json(issue_token(&state, &user)?))
}

/// POST /api/v1/auth/login
pub async fn login(
    state: web::Data<AppState>,
    body: web::Json<LoginRequest>,
) -> AppResult<HttpResponse> {
    let req = body.into_inner();
    let email = req.email.trim().to_lowercase();

    let user = state
        .users
        .find_by_email(&email)
        .await?
        .ok_or(AppError::Unauthorized)?;

    if !state.passwords.verify(&req.password, &user.password_hash)? {
        return Err(AppError::Unauthorized);
    }

    Ok(HttpResponse::Ok().json(issue_token(&state, &user)?))
}

/// GET /api/v1/auth/me
pub async fn me(identity: Identity) -> AppResult<HttpResponse> {
    Ok(HttpResponse::Ok().json(UserResponse {
        id: identity.user_id,
        email: identity.email,
        roles: identity.roles,
    }))
}
