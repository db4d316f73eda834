//! API handlers for the library REST endpoints

pub mod auth;
pub mod fines;
pub mod health;
pub mod loans;
pub mod materials;
pub mod openapi;
pub mod reservations;
pub mod reviews;
pub mod stats;
pub mod system_config;
pub mod users;

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::request::Parts,
    routing::{get, post, put},
    Router,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{
    error::AppError,
    models::user::{TokenType, UserClaims},
    AppState,
};

/// Extractor for authenticated user from JWT token
pub struct AuthenticatedUser(pub UserClaims);

#[async_trait]
impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) =
            TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
                .await
                .map_err(|_| AppError::Authentication("Missing or malformed bearer token".to_string()))?;

        let claims = UserClaims::from_token(bearer.token(), &state.config.auth.jwt_secret, TokenType::Access)?;

        Ok(AuthenticatedUser(claims))
    }
}

/// Create the application router with all routes
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_v1 = Router::new()
        // Health
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness_check))
        // Authentication
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/refresh", post(auth::refresh))
        .route("/auth/logout", post(auth::logout))
        .route("/auth/me", get(auth::me))
        .route("/auth/profile", put(auth::update_profile))
        .route("/auth/password", put(auth::change_password))
        // Users
        .route("/users", get(users::list_users).post(users::create_user))
        .route(
            "/users/:id",
            get(users::get_user).put(users::update_user).delete(users::delete_user),
        )
        .route("/users/:id/status", put(users::update_status))
        .route("/users/:id/loans", get(loans::get_user_loans))
        .route("/users/:id/reservations", get(reservations::get_user_reservations))
        .route("/users/:id/fines", get(fines::get_user_fines))
        // Catalog
        .route("/materials", get(materials::list_materials).post(materials::create_material))
        .route(
            "/materials/:id",
            get(materials::get_material)
                .put(materials::update_material)
                .delete(materials::delete_material),
        )
        .route(
            "/materials/:id/reviews",
            get(reviews::list_reviews).post(reviews::create_review),
        )
        .route("/materials/:id/queue", get(reservations::get_material_queue))
        // Loans
        .route("/loans", get(loans::list_loans).post(loans::create_loan))
        .route("/loans/process-overdue", post(loans::process_overdue))
        .route("/loans/:id", get(loans::get_loan))
        .route("/loans/:id/renew", post(loans::renew_loan))
        .route("/loans/:id/return", post(loans::return_loan))
        .route("/loans/:id/cancel", post(loans::cancel_loan))
        // Reservations
        .route(
            "/reservations",
            get(reservations::list_reservations).post(reservations::create_reservation),
        )
        .route("/reservations/expire-holds", post(reservations::expire_holds))
        .route("/reservations/:id", get(reservations::get_reservation))
        .route("/reservations/:id/cancel", post(reservations::cancel_reservation))
        .route("/reservations/:id/priority", put(reservations::update_priority))
        // Reviews
        .route("/reviews/:id", put(reviews::update_review).delete(reviews::delete_review))
        // Fines
        .route("/fines", get(fines::list_fines).post(fines::create_fine))
        .route("/fines/:id", get(fines::get_fine))
        .route("/fines/:id/pay", post(fines::pay_fine))
        .route("/fines/:id/waive", post(fines::waive_fine))
        // System configuration
        .route("/config", get(system_config::list_config))
        .route("/config/policy", get(system_config::get_policy))
        .route(
            "/config/:key",
            get(system_config::get_config).put(system_config::update_config),
        )
        // Statistics
        .route("/stats", get(stats::get_stats))
        .with_state(state);

    Router::new()
        .nest("/api/v1", api_v1)
        .merge(openapi::create_openapi_router())
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(cors)
}
