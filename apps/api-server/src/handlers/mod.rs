//! HTTP handlers and route configuration.

mod auth;
mod health;
mod todos;
mod users;

use std::sync::Arc;

use actix_web::web;
use todo_core::services::AdmissionController;

use crate::middleware::RateLimitMiddleware;

/// Configure all application routes. Everything under `/api/v1` is rate limited.
pub fn configure_routes(cfg: &mut web::ServiceConfig, admission: Arc<AdmissionController>) {
    cfg.service(
        web::scope("/api")
            .route("/health", web::get().to(health::health_check))
            .route("/health/ready", web::get().to(health::readiness))
            .service(
                web::scope("/v1")
                    .wrap(RateLimitMiddleware::new(admission))
                    .service(
                        web::scope("/auth")
                            .route("/register", web::post().to(auth::register))
                            .route("/login", web::post().to(auth::login))
                            .route("/me", web::get().to(auth::me)),
                    )
                    .service(
                        web::scope("/todos")
                            .route("", web::get().to(todos::list))
                            .route("", web::post().to(todos::create))
                            .route("/{id}", web::get().to(todos::get))
                            .route("/{id}", web::put().to(todos::update))
                            .route("/{id}", web::delete().to(todos::delete)),
                    )
                    .service(
                        web::scope("/users")
                            .route("/me/rate-limit", web::get().to(users::my_rate_limit))
                            .route("/{id}/rate-limit", web::put().to(users::set_rate_limit)),
                    ),
            ),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{App, http::StatusCode, test};
    use serde_json::{Value, json};

    use todo_core::ports::{PasswordService, TokenService, UserRepository};
    use todo_core::services::{IdentityExtractor, QuotaPolicy, QuotaResolver};
    use todo_infra::{
        Argon2PasswordService, InMemoryCache, InMemoryRateLimiter, InMemoryTodoRepository,
        InMemoryUserRepository, JwtConfig, JwtTokenService, RateLimitConfig,
    };

    use crate::state::AppState;

    fn state() -> AppState {
        let users = Arc::new(InMemoryUserRepository::new());
        let tokens: Arc<dyn TokenService> = Arc::new(JwtTokenService::new(JwtConfig {
            secret: "handler-test-secret".to_string(),
            ..JwtConfig::default()
        }));
        let passwords: Arc<dyn PasswordService> = Arc::new(Argon2PasswordService::new());
        let limiter = Arc::new(InMemoryRateLimiter::new(RateLimitConfig::default()));
        let resolver = QuotaResolver::new(users.clone(), QuotaPolicy::default())
            .with_cache(Arc::new(InMemoryCache::new()));
        let admission = AdmissionController::new(
            IdentityExtractor::new(tokens.clone()),
            Arc::new(resolver),
            limiter.clone(),
        );

        AppState {
            users,
            todos: Arc::new(InMemoryTodoRepository::new()),
            tokens,
            passwords,
            limiter,
            admission: Arc::new(admission),
            admin_emails: Arc::new(vec!["admin@example.com".to_string()]),
            #[cfg(feature = "postgres")]
            db: None,
        }
    }

    macro_rules! app {
        ($state:expr) => {{
            let state = $state;
            test::init_service(
                App::new()
                    .app_data(web::Data::new(state.clone()))
                    .app_data(web::Data::new(state.tokens.clone()))
                    .configure(|cfg| configure_routes(cfg, state.admission.clone())),
            )
            .await
        }};
    }

    macro_rules! register {
        ($app:expr, $email:expr) => {{
            let req = test::TestRequest::post()
                .uri("/api/v1/auth/register")
                .set_json(json!({ "email": $email, "password": "correct-horse" }))
                .to_request();
            let body: Value = test::call_and_read_body_json(&$app, req).await;
            format!("Bearer {}", body["access_token"].as_str().unwrap())
        }};
    }

    #[actix_web::test]
    async fn test_todo_lifecycle() {
        let app = app!(state());
        let token = register!(app, "alice@example.com");

        let req = test::TestRequest::post()
            .uri("/api/v1/todos")
            .insert_header(("Authorization", token.clone()))
            .set_json(json!({ "title": "  Buy milk ", "notes": "2 litres" }))
            .to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::CREATED);
        let created: Value = test::read_body_json(res).await;
        let id = created["data"]["id"].as_str().unwrap().to_string();
        assert_eq!(created["data"]["title"], "Buy milk");

        let req = test::TestRequest::put()
            .uri(&format!("/api/v1/todos/{}", id))
            .insert_header(("Authorization", token.clone()))
            .set_json(json!({ "is_complete": true, "notes": null }))
            .to_request();
        let updated: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(updated["data"]["is_complete"], true);
        assert!(updated["data"]["notes"].is_null());

        let req = test::TestRequest::delete()
            .uri(&format!("/api/v1/todos/{}", id))
            .insert_header(("Authorization", token.clone()))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NO_CONTENT);

        let req = test::TestRequest::get()
            .uri(&format!("/api/v1/todos/{}", id))
            .insert_header(("Authorization", token))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn test_todos_of_other_users_are_hidden() {
        let app = app!(state());
        let alice = register!(app, "alice@example.com");
        let bob = register!(app, "bob@example.com");

        let req = test::TestRequest::post()
            .uri("/api/v1/todos")
            .insert_header(("Authorization", alice))
            .set_json(json!({ "title": "private" }))
            .to_request();
        let created: Value = test::call_and_read_body_json(&app, req).await;
        let id = created["data"]["id"].as_str().unwrap().to_string();

        let req = test::TestRequest::get()
            .uri(&format!("/api/v1/todos/{}", id))
            .insert_header(("Authorization", bob.clone()))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);

        let req = test::TestRequest::get()
            .uri("/api/v1/todos")
            .insert_header(("Authorization", bob))
            .to_request();
        let listed: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(listed["data"].as_array().unwrap().len(), 0);
    }

    #[actix_web::test]
    async fn test_todo_routes_require_token() {
        let app = app!(state());

        let req = test::TestRequest::get().uri("/api/v1/todos").to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::UNAUTHORIZED);
    }

    #[actix_web::test]
    async fn test_admin_sets_quota_and_it_applies() {
        let state = state();
        let app = app!(state.clone());
        let admin = register!(app, "admin@example.com");
        let alice = register!(app, "alice@example.com");

        let req = test::TestRequest::get()
            .uri("/api/v1/users/me/rate-limit")
            .insert_header(("Authorization", alice.clone()))
            .to_request();
        let before: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(
            before["data"]["permit_limit"],
            QuotaPolicy::default().authenticated.permit_limit()
        );

        let alice_id = state
            .users
            .find_by_email("alice@example.com")
            .await
            .unwrap()
            .unwrap()
            .id;

        let req = test::TestRequest::put()
            .uri(&format!("/api/v1/users/{}/rate-limit", alice_id))
            .insert_header(("Authorization", alice.clone()))
            .set_json(json!({ "permit_limit": 3, "window_minutes": 1 }))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::FORBIDDEN);

        let req = test::TestRequest::put()
            .uri(&format!("/api/v1/users/{}/rate-limit", alice_id))
            .insert_header(("Authorization", admin.clone()))
            .set_json(json!({ "permit_limit": 0, "window_minutes": 1 }))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);

        let req = test::TestRequest::put()
            .uri(&format!("/api/v1/users/{}/rate-limit", alice_id))
            .insert_header(("Authorization", admin.clone()))
            .set_json(json!({ "permit_limit": u32::MAX, "window_minutes": 1 }))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);

        let req = test::TestRequest::put()
            .uri(&format!("/api/v1/users/{}/rate-limit", alice_id))
            .insert_header(("Authorization", admin))
            .set_json(json!({ "permit_limit": 3, "window_minutes": 1 }))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);

        // Cached profile was invalidated, so the new quota is visible at once.
        let req = test::TestRequest::get()
            .uri("/api/v1/users/me/rate-limit")
            .insert_header(("Authorization", alice))
            .to_request();
        let after: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(after["data"]["permit_limit"], 3);
        assert_eq!(after["data"]["window_minutes"], 1);
    }

    #[actix_web::test]
    async fn test_health_is_outside_rate_limit() {
        let app = app!(state());

        let req = test::TestRequest::get().uri("/api/health/ready").to_request();
        let res = test::call_service(&app, req).await;

        assert_eq!(res.status(), StatusCode::OK);
        assert!(res.headers().get("x-ratelimit-limit").is_none());
    }
}
