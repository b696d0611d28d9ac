//! Health check endpoints.

use actix_web::{HttpResponse, web};
use serde::Serialize;

use crate::middleware::error::{AppError, AppResult};
use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub timestamp: String,
}

impl HealthResponse {
    fn ok() -> Self {
        Self {
            status: "ok",
            version: env!("CARGO_PKG_VERSION"),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Liveness - the process is up.
///
/// GET /api/health
pub async fn health_check() -> HttpResponse {
    HttpResponse::Ok().json(HealthResponse::ok())
}

/// Readiness - dependencies answer.
///
/// GET /api/health/ready
pub async fn readiness(state: web::Data<AppState>) -> AppResult<HttpResponse> {
    state.ping_database().await.map_err(|e| {
        tracing::warn!(error = %e, "Readiness check failed");
        AppError::ServiceUnavailable("Database unreachable".to_string())
    })?;

    Ok(HttpResponse::Ok().json(HealthResponse::ok()))
}
