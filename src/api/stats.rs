//! Statistics endpoints

use axum::{extract::State, Json};

use crate::{error::AppResult, models::stats::LibraryStats, AppState};

use super::AuthenticatedUser;

/// Catalog, user and circulation figures
#[utoipa::path(
    get,
    path = "/stats",
    tag = "stats",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Library statistics", body = LibraryStats),
        (status = 403, description = "Staff only")
    )
)]
pub async fn get_stats(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<LibraryStats>> {
    claims.require_staff()?;

    let stats = state.services.stats.library_stats().await?;
    Ok(Json(stats))
}
