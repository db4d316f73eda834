//! System configuration endpoints

use axum::{
    extract::{Path, State},
    Json,
};
use validator::Validate;

use crate::{
    error::AppResult,
    models::system_config::{ConfigEntry, LibraryPolicy, UpdateConfigEntry},
    AppState,
};

use super::AuthenticatedUser;

/// All configuration entries
#[utoipa::path(
    get,
    path = "/config",
    tag = "config",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Configuration entries", body = [ConfigEntry]),
        (status = 403, description = "Staff only")
    )
)]
pub async fn list_config(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<Vec<ConfigEntry>>> {
    claims.require_staff()?;

    let entries = state.services.settings.list().await?;
    Ok(Json(entries))
}

/// Effective circulation policy
#[utoipa::path(
    get,
    path = "/config/policy",
    tag = "config",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Loan periods, limits, fine rates and hold rules", body = LibraryPolicy)
    )
)]
pub async fn get_policy(
    State(state): State<AppState>,
    AuthenticatedUser(_claims): AuthenticatedUser,
) -> AppResult<Json<LibraryPolicy>> {
    let policy = state.services.settings.policy().await?;
    Ok(Json(policy))
}

/// One configuration entry
#[utoipa::path(
    get,
    path = "/config/{key}",
    tag = "config",
    security(("bearer_auth" = [])),
    params(
        ("key" = String, Path, description = "Configuration key")
    ),
    responses(
        (status = 200, description = "Configuration entry", body = ConfigEntry),
        (status = 404, description = "Unknown key")
    )
)]
pub async fn get_config(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(key): Path<String>,
) -> AppResult<Json<ConfigEntry>> {
    claims.require_staff()?;

    let entry = state.services.settings.get(&key).await?;
    Ok(Json(entry))
}

/// Set a configuration entry; rejected if the resulting policy is invalid
#[utoipa::path(
    put,
    path = "/config/{key}",
    tag = "config",
    security(("bearer_auth" = [])),
    params(
        ("key" = String, Path, description = "Configuration key")
    ),
    request_body = UpdateConfigEntry,
    responses(
        (status = 200, description = "Entry saved", body = ConfigEntry),
        (status = 400, description = "Invalid value"),
        (status = 403, description = "Administrator only")
    )
)]
pub async fn update_config(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(key): Path<String>,
    Json(update): Json<UpdateConfigEntry>,
) -> AppResult<Json<ConfigEntry>> {
    claims.require_admin()?;
    update.validate()?;

    let entry = state.services.settings.set(&key, update, claims.user_id).await?;
    Ok(Json(entry))
}
