//! Circulation endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use validator::Validate;

use crate::{
    error::AppResult,
    models::{
        loan::{CancelLoan, CreateLoan, LoanDetails, LoanQuery, ReturnOutcome},
        Page, PaginatedResponse, ProcessedCount,
    },
    AppState,
};

use super::AuthenticatedUser;

/// Loans of a user (open only unless `include_closed`)
#[utoipa::path(
    get,
    path = "/users/{id}/loans",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "User ID"),
        LoanQuery
    ),
    responses(
        (status = 200, description = "Loans of the user", body = PaginatedLoans),
        (status = 403, description = "Not your account"),
        (status = 404, description = "User not found")
    )
)]
pub async fn get_user_loans(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(user_id): Path<i32>,
    Query(query): Query<LoanQuery>,
) -> AppResult<Json<PaginatedResponse<LoanDetails>>> {
    claims.require_self_or_staff(user_id)?;

    let page = Page::new(query.page, query.per_page);
    let (loans, total) = state.services.loans.user_loans(user_id, query).await?;

    Ok(Json(PaginatedResponse::new(loans, total, page)))
}

/// List loans
#[utoipa::path(
    get,
    path = "/loans",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(LoanQuery),
    responses(
        (status = 200, description = "Matching loans", body = PaginatedLoans),
        (status = 403, description = "Staff only")
    )
)]
pub async fn list_loans(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Query(query): Query<LoanQuery>,
) -> AppResult<Json<PaginatedResponse<LoanDetails>>> {
    claims.require_staff()?;

    let (loans, total) = state.services.loans.list(&query).await?;

    Ok(Json(PaginatedResponse::new(loans, total, Page::new(query.page, query.per_page))))
}

/// Check out a material
#[utoipa::path(
    post,
    path = "/loans",
    tag = "loans",
    security(("bearer_auth" = [])),
    request_body = CreateLoan,
    responses(
        (status = 201, description = "Loan created", body = LoanDetails),
        (status = 403, description = "Cannot borrow for another user"),
        (status = 404, description = "User or material not found"),
        (status = 422, description = "Loan refused by a circulation rule")
    )
)]
pub async fn create_loan(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Json(request): Json<CreateLoan>,
) -> AppResult<(StatusCode, Json<LoanDetails>)> {
    request.validate()?;

    let loan = state.services.loans.checkout(&claims, request).await?;
    Ok((StatusCode::CREATED, Json(loan)))
}

/// Mark every past-due active loan as overdue and notify borrowers
#[utoipa::path(
    post,
    path = "/loans/process-overdue",
    tag = "loans",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Loans marked overdue", body = ProcessedCount),
        (status = 403, description = "Librarian only")
    )
)]
pub async fn process_overdue(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<ProcessedCount>> {
    claims.require_librarian()?;

    let processed = state.services.loans.process_overdue().await?;
    Ok(Json(ProcessedCount { processed }))
}

/// Get a loan
#[utoipa::path(
    get,
    path = "/loans/{id}",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Loan ID")
    ),
    responses(
        (status = 200, description = "Loan details", body = LoanDetails),
        (status = 403, description = "Not your loan"),
        (status = 404, description = "Loan not found")
    )
)]
pub async fn get_loan(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<Json<LoanDetails>> {
    let loan = state.services.loans.get(&claims, id).await?;
    Ok(Json(loan))
}

/// Renew a loan
#[utoipa::path(
    post,
    path = "/loans/{id}/renew",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Loan ID")
    ),
    responses(
        (status = 200, description = "Loan renewed", body = LoanDetails),
        (status = 404, description = "Loan not found"),
        (status = 409, description = "Loan is not active"),
        (status = 422, description = "Renewal refused by a circulation rule")
    )
)]
pub async fn renew_loan(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<Json<LoanDetails>> {
    let loan = state.services.loans.renew(&claims, id).await?;
    Ok(Json(loan))
}

/// Return a loan; a late return produces a fine
#[utoipa::path(
    post,
    path = "/loans/{id}/return",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Loan ID")
    ),
    responses(
        (status = 200, description = "Loan returned", body = ReturnOutcome),
        (status = 403, description = "Staff only"),
        (status = 404, description = "Loan not found"),
        (status = 409, description = "Loan already closed")
    )
)]
pub async fn return_loan(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<Json<ReturnOutcome>> {
    claims.require_staff()?;

    let outcome = state.services.loans.return_loan(id).await?;
    Ok(Json(outcome))
}

/// Cancel a loan entered by mistake
#[utoipa::path(
    post,
    path = "/loans/{id}/cancel",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Loan ID")
    ),
    request_body = CancelLoan,
    responses(
        (status = 200, description = "Loan cancelled", body = LoanDetails),
        (status = 403, description = "Librarian only"),
        (status = 409, description = "Loan already closed")
    )
)]
pub async fn cancel_loan(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
    request: Option<Json<CancelLoan>>,
) -> AppResult<Json<LoanDetails>> {
    claims.require_librarian()?;

    let request = request.map(|Json(r)| r).unwrap_or_default();
    request.validate()?;

    let loan = state.services.loans.cancel(&claims, id, request.reason).await?;
    Ok(Json(loan))
}
