//! OpenAPI documentation

use axum::Router;
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::api::{
    auth, fines, health, loans, materials, reservations, reviews, stats, system_config, users,
};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "University Library API",
        version = "1.0.0",
        description = "Catalog, circulation, reservations and fines for a university library"
    ),
    servers(
        (url = "/api/v1", description = "API v1")
    ),
    modifiers(&SecurityAddon),
    paths(
        // Health
        health::health_check,
        health::readiness_check,
        // Auth
        auth::register,
        auth::login,
        auth::refresh,
        auth::logout,
        auth::me,
        auth::update_profile,
        auth::change_password,
        // Users
        users::list_users,
        users::get_user,
        users::create_user,
        users::update_user,
        users::delete_user,
        users::update_status,
        // Catalog
        materials::list_materials,
        materials::get_material,
        materials::create_material,
        materials::update_material,
        materials::delete_material,
        // Loans
        loans::get_user_loans,
        loans::list_loans,
        loans::create_loan,
        loans::process_overdue,
        loans::get_loan,
        loans::renew_loan,
        loans::return_loan,
        loans::cancel_loan,
        // Reservations
        reservations::get_user_reservations,
        reservations::get_material_queue,
        reservations::list_reservations,
        reservations::create_reservation,
        reservations::expire_holds,
        reservations::get_reservation,
        reservations::cancel_reservation,
        reservations::update_priority,
        // Reviews
        reviews::list_reviews,
        reviews::create_review,
        reviews::update_review,
        reviews::delete_review,
        // Fines
        fines::get_user_fines,
        fines::list_fines,
        fines::create_fine,
        fines::get_fine,
        fines::pay_fine,
        fines::waive_fine,
        // Configuration
        system_config::list_config,
        system_config::get_policy,
        system_config::get_config,
        system_config::update_config,
        // Stats
        stats::get_stats,
    ),
    components(
        schemas(
            // Users and auth
            crate::models::user::User,
            crate::models::user::UserSummary,
            crate::models::user::UserType,
            crate::models::user::UserStatus,
            crate::models::user::RegisterUser,
            crate::models::user::CreateUser,
            crate::models::user::UpdateUser,
            crate::models::user::UpdateProfile,
            crate::models::user::ChangePassword,
            crate::models::user::UpdateStatus,
            crate::models::user::LoginRequest,
            crate::models::user::RefreshRequest,
            crate::models::user::TokenResponse,
            crate::models::PaginatedUsers,
            // Catalog
            crate::models::material::Material,
            crate::models::material::MaterialDetails,
            crate::models::material::MaterialSummary,
            crate::models::material::MaterialType,
            crate::models::material::MaterialStatus,
            crate::models::material::CreateMaterial,
            crate::models::material::UpdateMaterial,
            crate::models::PaginatedMaterials,
            // Loans
            crate::models::loan::Loan,
            crate::models::loan::LoanDetails,
            crate::models::loan::LoanStatus,
            crate::models::loan::CreateLoan,
            crate::models::loan::CancelLoan,
            crate::models::loan::ReturnOutcome,
            crate::models::PaginatedLoans,
            crate::models::ProcessedCount,
            // Reservations
            crate::models::reservation::Reservation,
            crate::models::reservation::ReservationDetails,
            crate::models::reservation::ReservationStatus,
            crate::models::reservation::CreateReservation,
            crate::models::reservation::UpdatePriority,
            crate::models::PaginatedReservations,
            // Reviews
            crate::models::review::Review,
            crate::models::review::ReviewList,
            crate::models::review::CreateReview,
            crate::models::review::UpdateReview,
            // Fines
            crate::models::fine::Fine,
            crate::models::fine::FineStatus,
            crate::models::fine::UserFines,
            crate::models::fine::CreateFine,
            crate::models::fine::WaiveFine,
            crate::models::PaginatedFines,
            // Configuration
            crate::models::system_config::ConfigEntry,
            crate::models::system_config::UpdateConfigEntry,
            crate::models::system_config::LibraryPolicy,
            crate::models::system_config::PerUserType,
            // Stats
            crate::models::stats::LibraryStats,
            crate::models::stats::CatalogStats,
            crate::models::stats::UserTypeCount,
            crate::models::stats::CirculationStats,
            // Health
            health::HealthResponse,
            health::ReadinessResponse,
            // Errors
            crate::error::ErrorResponse,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "auth", description = "Authentication and sessions"),
        (name = "users", description = "User management"),
        (name = "materials", description = "Catalog management"),
        (name = "loans", description = "Checkout, renewal and return"),
        (name = "reservations", description = "Reservation queues and holds"),
        (name = "reviews", description = "Material reviews"),
        (name = "fines", description = "Overdue and manual fines"),
        (name = "config", description = "Circulation policy"),
        (name = "stats", description = "Statistics")
    )
)]
pub struct ApiDoc;

/// Registers the `bearer_auth` scheme referenced by protected paths
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

/// Create the OpenAPI documentation router
pub fn create_openapi_router() -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}
