//! Review endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use validator::Validate;

use crate::{
    error::AppResult,
    models::review::{CreateReview, Review, ReviewList, UpdateReview},
    AppState,
};

use super::AuthenticatedUser;

/// Reviews of a material with the average rating
#[utoipa::path(
    get,
    path = "/materials/{id}/reviews",
    tag = "reviews",
    params(
        ("id" = i32, Path, description = "Material ID")
    ),
    responses(
        (status = 200, description = "Reviews, newest first", body = ReviewList),
        (status = 404, description = "Material not found")
    )
)]
pub async fn list_reviews(
    State(state): State<AppState>,
    Path(material_id): Path<i32>,
) -> AppResult<Json<ReviewList>> {
    let reviews = state.services.reviews.list_for_material(material_id).await?;
    Ok(Json(reviews))
}

/// Review a material you have borrowed
#[utoipa::path(
    post,
    path = "/materials/{id}/reviews",
    tag = "reviews",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Material ID")
    ),
    request_body = CreateReview,
    responses(
        (status = 201, description = "Review created", body = Review),
        (status = 400, description = "Rating out of range"),
        (status = 409, description = "Already reviewed"),
        (status = 422, description = "Material never borrowed")
    )
)]
pub async fn create_review(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(material_id): Path<i32>,
    Json(review): Json<CreateReview>,
) -> AppResult<(StatusCode, Json<Review>)> {
    review.validate()?;

    let created = state.services.reviews.create(&claims, material_id, review).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// Edit your review
#[utoipa::path(
    put,
    path = "/reviews/{id}",
    tag = "reviews",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Review ID")
    ),
    request_body = UpdateReview,
    responses(
        (status = 200, description = "Review updated", body = Review),
        (status = 403, description = "Not the author"),
        (status = 404, description = "Review not found")
    )
)]
pub async fn update_review(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
    Json(review): Json<UpdateReview>,
) -> AppResult<Json<Review>> {
    review.validate()?;

    let updated = state.services.reviews.update(&claims, id, review).await?;
    Ok(Json(updated))
}

/// Delete a review (author or librarian)
#[utoipa::path(
    delete,
    path = "/reviews/{id}",
    tag = "reviews",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Review ID")
    ),
    responses(
        (status = 204, description = "Review deleted"),
        (status = 403, description = "Not the author"),
        (status = 404, description = "Review not found")
    )
)]
pub async fn delete_review(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<StatusCode> {
    state.services.reviews.delete(&claims, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
