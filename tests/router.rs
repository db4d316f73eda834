//! Router tests that never reach PostgreSQL or Redis: authentication,
//! role guards and request validation all reject before any query runs.

use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use chrono::Utc;
use serde_json::{json, Value};
use sqlx::postgres::PgPoolOptions;
use tower::ServiceExt;

use unilib_server::{
    api,
    config::AppConfig,
    models::user::{TokenType, User, UserClaims, UserStatus, UserType},
    repository::Repository,
    services::{email::EmailNotifier, redis::RedisService, Services},
    AppState,
};

fn test_app() -> (Router, AppConfig) {
    let config = AppConfig::default();

    let pool = PgPoolOptions::new()
        .connect_lazy(&config.database.url)
        .expect("lazy pool");
    let redis = RedisService::open(&config.redis.url).expect("redis client");
    let notifier = Arc::new(EmailNotifier::new(config.email.clone()));
    let services = Services::new(Repository::new(pool), &config, redis, notifier);

    let state = AppState {
        config: Arc::new(config.clone()),
        services: Arc::new(services),
    };
    (api::router(state), config)
}

fn token_for(config: &AppConfig, user_type: UserType) -> String {
    let user = User {
        id: 42,
        email: "reader@university.edu".to_string(),
        password_hash: String::new(),
        first_name: "Grace".to_string(),
        last_name: "Hopper".to_string(),
        user_type,
        status: UserStatus::Active,
        card_number: None,
        department: None,
        phone: None,
        created_at: Utc::now(),
        updated_at: Utc::now(),
        last_login_at: None,
    };
    UserClaims::new(&user, TokenType::Access, 600)
        .create_token(&config.auth.jwt_secret)
        .expect("token")
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.expect("response");
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn authorized(method: Method, uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn test_health_is_public() {
    let (app, _) = test_app();
    let request = Request::builder().uri("/api/v1/health").body(Body::empty()).unwrap();

    let (status, body) = send(app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_openapi_document_is_served() {
    let (app, _) = test_app();
    let request = Request::builder()
        .uri("/api-docs/openapi.json")
        .body(Body::empty())
        .unwrap();

    let (status, body) = send(app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["paths"]["/loans/{id}/renew"].is_object());
    assert!(body["components"]["securitySchemes"]["bearer_auth"].is_object());
}

#[tokio::test]
async fn test_missing_token_is_unauthorized() {
    let (app, _) = test_app();
    let request = Request::builder().uri("/api/v1/auth/me").body(Body::empty()).unwrap();

    let (status, body) = send(app, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], 2);
}

#[tokio::test]
async fn test_garbage_token_is_unauthorized() {
    let (app, _) = test_app();
    let request = authorized(Method::GET, "/api/v1/loans", "not-a-jwt");

    let (status, _) = send(app, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_token_signed_with_other_secret_is_unauthorized() {
    let (app, config) = test_app();
    let mut other = config.clone();
    other.auth.jwt_secret = "another-secret".to_string();
    let token = token_for(&other, UserType::Admin);

    let (status, _) = send(app, authorized(Method::GET, "/api/v1/stats", &token)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_patron_cannot_delete_material() {
    let (app, config) = test_app();
    let token = token_for(&config, UserType::Student);

    let (status, body) = send(app, authorized(Method::DELETE, "/api/v1/materials/1", &token)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "NotAuthorized");
}

#[tokio::test]
async fn test_patron_cannot_read_configuration() {
    let (app, config) = test_app();
    let token = token_for(&config, UserType::Professor);

    let (status, _) = send(app, authorized(Method::GET, "/api/v1/config", &token)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_desk_staff_cannot_cancel_loans() {
    let (app, config) = test_app();
    let token = token_for(&config, UserType::Staff);

    let (status, _) = send(app, authorized(Method::POST, "/api/v1/loans/5/cancel", &token)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_librarian_cannot_change_configuration() {
    let (app, config) = test_app();
    let token = token_for(&config, UserType::Librarian);

    let request = Request::builder()
        .method(Method::PUT)
        .uri("/api/v1/config/max_renewals")
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json!({ "value": 5 }).to_string()))
        .unwrap();

    let (status, _) = send(app, request).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_patron_cannot_read_other_users_loans() {
    let (app, config) = test_app();
    let token = token_for(&config, UserType::Student);

    let (status, _) = send(app, authorized(Method::GET, "/api/v1/users/7/loans", &token)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_register_rejects_invalid_email() {
    let (app, _) = test_app();
    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/v1/auth/register")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            json!({
                "email": "not-an-email",
                "password": "long-enough-password",
                "first_name": "Alan",
                "last_name": "Turing"
            })
            .to_string(),
        ))
        .unwrap();

    let (status, body) = send(app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "BadValue");
}
