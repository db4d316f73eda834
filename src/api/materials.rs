//! Catalog endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use validator::Validate;

use crate::{
    error::AppResult,
    models::{
        material::{CreateMaterial, MaterialDetails, MaterialQuery, MaterialSummary, UpdateMaterial},
        Page, PaginatedResponse,
    },
    AppState,
};

use super::AuthenticatedUser;

/// Search the catalog
#[utoipa::path(
    get,
    path = "/materials",
    tag = "materials",
    params(MaterialQuery),
    responses(
        (status = 200, description = "Matching materials", body = PaginatedMaterials)
    )
)]
pub async fn list_materials(
    State(state): State<AppState>,
    Query(query): Query<MaterialQuery>,
) -> AppResult<Json<PaginatedResponse<MaterialSummary>>> {
    let (materials, total) = state.services.catalog.search(&query).await?;

    Ok(Json(PaginatedResponse::new(materials, total, Page::new(query.page, query.per_page))))
}

/// Get material details with rating and queue length
#[utoipa::path(
    get,
    path = "/materials/{id}",
    tag = "materials",
    params(
        ("id" = i32, Path, description = "Material ID")
    ),
    responses(
        (status = 200, description = "Material details", body = MaterialDetails),
        (status = 404, description = "Material not found")
    )
)]
pub async fn get_material(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> AppResult<Json<MaterialDetails>> {
    let material = state.services.catalog.get(id).await?;
    Ok(Json(material))
}

/// Add a material to the catalog
#[utoipa::path(
    post,
    path = "/materials",
    tag = "materials",
    security(("bearer_auth" = [])),
    request_body = CreateMaterial,
    responses(
        (status = 201, description = "Material created", body = MaterialDetails),
        (status = 400, description = "Invalid input or ISBN"),
        (status = 403, description = "Librarian only"),
        (status = 409, description = "ISBN already catalogued")
    )
)]
pub async fn create_material(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Json(material): Json<CreateMaterial>,
) -> AppResult<(StatusCode, Json<MaterialDetails>)> {
    claims.require_librarian()?;
    material.validate()?;

    let created = state.services.catalog.create(material).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// Update a material; added copies go to the reservation queue first
#[utoipa::path(
    put,
    path = "/materials/{id}",
    tag = "materials",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Material ID")
    ),
    request_body = UpdateMaterial,
    responses(
        (status = 200, description = "Material updated", body = MaterialDetails),
        (status = 404, description = "Material not found"),
        (status = 409, description = "ISBN already catalogued"),
        (status = 422, description = "Fewer copies than are currently out")
    )
)]
pub async fn update_material(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
    Json(update): Json<UpdateMaterial>,
) -> AppResult<Json<MaterialDetails>> {
    claims.require_librarian()?;
    update.validate()?;

    let material = state.services.catalog.update(id, update).await?;
    Ok(Json(material))
}

/// Remove a material from the catalog
#[utoipa::path(
    delete,
    path = "/materials/{id}",
    tag = "materials",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Material ID")
    ),
    responses(
        (status = 204, description = "Material deleted"),
        (status = 404, description = "Material not found"),
        (status = 422, description = "Material has open loans or reservations")
    )
)]
pub async fn delete_material(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<StatusCode> {
    claims.require_librarian()?;

    state.services.catalog.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
