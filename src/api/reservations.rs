//! Reservation queue endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use validator::Validate;

use crate::{
    error::AppResult,
    models::{
        reservation::{CreateReservation, ReservationDetails, ReservationQuery, UpdatePriority},
        Page, PaginatedResponse, ProcessedCount,
    },
    AppState,
};

use super::AuthenticatedUser;

/// Reservations of a user
#[utoipa::path(
    get,
    path = "/users/{id}/reservations",
    tag = "reservations",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "User ID"),
        ReservationQuery
    ),
    responses(
        (status = 200, description = "Reservations of the user", body = PaginatedReservations),
        (status = 403, description = "Not your account")
    )
)]
pub async fn get_user_reservations(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(user_id): Path<i32>,
    Query(query): Query<ReservationQuery>,
) -> AppResult<Json<PaginatedResponse<ReservationDetails>>> {
    claims.require_self_or_staff(user_id)?;

    let query = ReservationQuery {
        user_id: Some(user_id),
        ..query
    };
    let (reservations, total) = state.services.reservations.list(&query).await?;

    Ok(Json(PaginatedResponse::new(reservations, total, Page::new(query.page, query.per_page))))
}

/// Pending queue of a material, head first
#[utoipa::path(
    get,
    path = "/materials/{id}/queue",
    tag = "reservations",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Material ID")
    ),
    responses(
        (status = 200, description = "Pending reservations in queue order", body = [ReservationDetails]),
        (status = 403, description = "Staff only"),
        (status = 404, description = "Material not found")
    )
)]
pub async fn get_material_queue(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(material_id): Path<i32>,
) -> AppResult<Json<Vec<ReservationDetails>>> {
    claims.require_staff()?;

    let queue = state.services.reservations.queue(material_id).await?;
    Ok(Json(queue))
}

/// List reservations
#[utoipa::path(
    get,
    path = "/reservations",
    tag = "reservations",
    security(("bearer_auth" = [])),
    params(ReservationQuery),
    responses(
        (status = 200, description = "Matching reservations", body = PaginatedReservations),
        (status = 403, description = "Staff only")
    )
)]
pub async fn list_reservations(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Query(query): Query<ReservationQuery>,
) -> AppResult<Json<PaginatedResponse<ReservationDetails>>> {
    claims.require_staff()?;

    let (reservations, total) = state.services.reservations.list(&query).await?;

    Ok(Json(PaginatedResponse::new(reservations, total, Page::new(query.page, query.per_page))))
}

/// Reserve a material with no copy on the shelf
#[utoipa::path(
    post,
    path = "/reservations",
    tag = "reservations",
    security(("bearer_auth" = [])),
    request_body = CreateReservation,
    responses(
        (status = 201, description = "Reservation queued", body = ReservationDetails),
        (status = 409, description = "Material already reserved by this user"),
        (status = 422, description = "Reservation refused by a circulation rule")
    )
)]
pub async fn create_reservation(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Json(request): Json<CreateReservation>,
) -> AppResult<(StatusCode, Json<ReservationDetails>)> {
    let reservation = state.services.reservations.create(&claims, request).await?;
    Ok((StatusCode::CREATED, Json(reservation)))
}

/// Expire ready holds that were not picked up in time
#[utoipa::path(
    post,
    path = "/reservations/expire-holds",
    tag = "reservations",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Holds expired", body = ProcessedCount),
        (status = 403, description = "Librarian only")
    )
)]
pub async fn expire_holds(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<ProcessedCount>> {
    claims.require_librarian()?;

    let processed = state.services.reservations.expire_holds().await?;
    Ok(Json(ProcessedCount { processed }))
}

/// Get a reservation with its queue position
#[utoipa::path(
    get,
    path = "/reservations/{id}",
    tag = "reservations",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Reservation ID")
    ),
    responses(
        (status = 200, description = "Reservation details", body = ReservationDetails),
        (status = 403, description = "Not your reservation"),
        (status = 404, description = "Reservation not found")
    )
)]
pub async fn get_reservation(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<Json<ReservationDetails>> {
    let reservation = state.services.reservations.get(&claims, id).await?;
    Ok(Json(reservation))
}

/// Cancel a reservation; a held copy passes to the next in line
#[utoipa::path(
    post,
    path = "/reservations/{id}/cancel",
    tag = "reservations",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Reservation ID")
    ),
    responses(
        (status = 200, description = "Reservation cancelled", body = ReservationDetails),
        (status = 403, description = "Not your reservation"),
        (status = 409, description = "Reservation already closed")
    )
)]
pub async fn cancel_reservation(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<Json<ReservationDetails>> {
    let reservation = state.services.reservations.cancel(&claims, id).await?;
    Ok(Json(reservation))
}

/// Override the queue priority of a pending reservation
#[utoipa::path(
    put,
    path = "/reservations/{id}/priority",
    tag = "reservations",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Reservation ID")
    ),
    request_body = UpdatePriority,
    responses(
        (status = 200, description = "Priority updated", body = ReservationDetails),
        (status = 403, description = "Librarian only"),
        (status = 409, description = "Reservation is not pending")
    )
)]
pub async fn update_priority(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
    Json(request): Json<UpdatePriority>,
) -> AppResult<Json<ReservationDetails>> {
    claims.require_librarian()?;
    request.validate()?;

    let reservation = state.services.reservations.set_priority(id, request.priority).await?;
    Ok(Json(reservation))
}
