//! Fine endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use validator::Validate;

use crate::{
    error::AppResult,
    models::{
        fine::{CreateFine, Fine, FineQuery, UserFines, WaiveFine},
        Page, PaginatedResponse,
    },
    AppState,
};

use super::AuthenticatedUser;

/// Fines of a user with the amount still owed
#[utoipa::path(
    get,
    path = "/users/{id}/fines",
    tag = "fines",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "User ID")
    ),
    responses(
        (status = 200, description = "Fines of the user", body = UserFines),
        (status = 403, description = "Not your account"),
        (status = 404, description = "User not found")
    )
)]
pub async fn get_user_fines(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(user_id): Path<i32>,
) -> AppResult<Json<UserFines>> {
    claims.require_self_or_staff(user_id)?;

    let fines = state.services.fines.user_fines(user_id).await?;
    Ok(Json(fines))
}

/// List fines
#[utoipa::path(
    get,
    path = "/fines",
    tag = "fines",
    security(("bearer_auth" = [])),
    params(FineQuery),
    responses(
        (status = 200, description = "Matching fines", body = PaginatedFines),
        (status = 403, description = "Staff only")
    )
)]
pub async fn list_fines(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Query(query): Query<FineQuery>,
) -> AppResult<Json<PaginatedResponse<Fine>>> {
    claims.require_staff()?;

    let (fines, total) = state.services.fines.list(&query).await?;

    Ok(Json(PaginatedResponse::new(fines, total, Page::new(query.page, query.per_page))))
}

/// Issue a manual fine
#[utoipa::path(
    post,
    path = "/fines",
    tag = "fines",
    security(("bearer_auth" = [])),
    request_body = CreateFine,
    responses(
        (status = 201, description = "Fine issued", body = Fine),
        (status = 400, description = "Invalid amount or loan"),
        (status = 403, description = "Librarian only")
    )
)]
pub async fn create_fine(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Json(fine): Json<CreateFine>,
) -> AppResult<(StatusCode, Json<Fine>)> {
    claims.require_librarian()?;
    fine.validate()?;

    let created = state.services.fines.create(&claims, fine).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// Get a fine
#[utoipa::path(
    get,
    path = "/fines/{id}",
    tag = "fines",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Fine ID")
    ),
    responses(
        (status = 200, description = "Fine", body = Fine),
        (status = 403, description = "Not your fine"),
        (status = 404, description = "Fine not found")
    )
)]
pub async fn get_fine(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<Json<Fine>> {
    let fine = state.services.fines.get(&claims, id).await?;
    Ok(Json(fine))
}

/// Record payment of a fine
#[utoipa::path(
    post,
    path = "/fines/{id}/pay",
    tag = "fines",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Fine ID")
    ),
    responses(
        (status = 200, description = "Fine paid", body = Fine),
        (status = 403, description = "Not your fine"),
        (status = 409, description = "Fine is not pending")
    )
)]
pub async fn pay_fine(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<Json<Fine>> {
    let fine = state.services.fines.pay(&claims, id).await?;
    Ok(Json(fine))
}

/// Waive a fine
#[utoipa::path(
    post,
    path = "/fines/{id}/waive",
    tag = "fines",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Fine ID")
    ),
    request_body = WaiveFine,
    responses(
        (status = 200, description = "Fine waived", body = Fine),
        (status = 403, description = "Librarian only"),
        (status = 409, description = "Fine is not pending")
    )
)]
pub async fn waive_fine(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
    Json(request): Json<WaiveFine>,
) -> AppResult<Json<Fine>> {
    claims.require_librarian()?;
    request.validate()?;

    let fine = state.services.fines.waive(&claims, id, &request.reason).await?;
    Ok(Json(fine))
}
