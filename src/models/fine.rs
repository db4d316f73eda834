//! Fine model

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

text_enum! {
    pub enum FineStatus {
        Pending => "pending",
        Paid => "paid",
        Waived => "waived",
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Fine {
    pub id: i32,
    pub user_id: i32,
    pub loan_id: Option<i32>,
    pub amount: Decimal,
    pub reason: String,
    pub status: FineStatus,
    pub issued_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
    pub waived_at: Option<DateTime<Utc>>,
    pub waived_by: Option<i32>,
    pub notes: Option<String>,
}

/// A user's fines with the amount still owed
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct UserFines {
    pub user_id: i32,
    pub pending_total: Decimal,
    pub fines: Vec<Fine>,
}

#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct FineQuery {
    pub user_id: Option<i32>,
    pub status: Option<FineStatus>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

/// Manual fine (lost or damaged material)
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateFine {
    pub user_id: i32,
    pub loan_id: Option<i32>,
    pub amount: Decimal,
    #[validate(length(min = 1, max = 500, message = "A reason is required"))]
    pub reason: String,
    #[validate(length(max = 1000))]
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct WaiveFine {
    #[validate(length(min = 1, max = 1000, message = "A reason is required"))]
    pub reason: String,
}
