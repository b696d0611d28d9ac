//! Per-user rate limit quota.

use actix_web::{HttpResponse, web};
use uuid::Uuid;

use todo_core::domain::{IdentityKey, RateLimitProfile};
use todo_core::error::DomainError;
use todo_core::ports::BaseRepository;
use todo_shared::ApiResponse;
use todo_shared::dto::RateLimitProfileDto;

use crate::middleware::auth::{AdminIdentity, Identity};
use crate::middleware::error::AppResult;
use crate::state::AppState;

fn to_dto(profile: RateLimitProfile) -> RateLimitProfileDto {
    RateLimitProfileDto {
        permit_limit: profile.permit_limit(),
        window_minutes: profile.window_minutes(),
    }
}

/// GET /api/v1/users/me/rate-limit
///
/// The quota the limiter applies to the caller right now.
pub async fn my_rate_limit(
    state: web::Data<AppState>,
    identity: Identity,
) -> AppResult<HttpResponse> {
    let profile = state
        .admission
        .resolver()
        .resolve(&IdentityKey::new(identity.email))
        .await;

    Ok(HttpResponse::Ok().json(ApiResponse::ok(to_dto(profile))))
}

/// PUT /api/v1/users/{id}/rate-limit (admin)
///
/// The new quota applies from the user's next window.
pub async fn set_rate_limit(
    state: web::Data<AppState>,
    admin: AdminIdentity,
    path: web::Path<Uuid>,
    body: web::Json<RateLimitProfileDto>,
) -> AppResult<HttpResponse> {
    let user_id = path.into_inner();
    let req = body.into_inner();
    // the users table stores both fields as INTEGER
    if i32::try_from(req.permit_limit).is_err() || i32::try_from(req.window_minutes).is_err() {
        return Err(DomainError::Validation(format!(
            "permit_limit and window_minutes must not exceed {}",
            i32::MAX
        ))
        .into());
    }
    let profile = RateLimitProfile::new(req.permit_limit, req.window_minutes)?;

    let mut user = state
        .users
        .find_by_id(user_id)
        .await?
        .ok_or_else(|| DomainError::user_not_found(user_id))?;

    user.set_rate_limit_profile(profile);
    let user = state.users.save(user).await?;

    state
        .admission
        .resolver()
        .invalidate(&IdentityKey::new(user.email.as_str()))
        .await;

    tracing::info!(
        admin_id = %admin.0.user_id,
        user_id = %user.id,
        permit_limit = profile.permit_limit(),
        window_minutes = profile.window_minutes(),
        "Rate limit updated"
    );

    Ok(HttpResponse::Ok().json(ApiResponse::ok(to_dto(profile))))
}
