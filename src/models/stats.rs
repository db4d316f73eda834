//! Library statistics

use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::FromRow;
use utoipa::ToSchema;

#[derive(Debug, Clone, Default, Serialize, FromRow, ToSchema)]
pub struct CatalogStats {
    pub titles: i64,
    pub total_copies: i64,
    pub available_copies: i64,
}

#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
pub struct UserTypeCount {
    pub user_type: super::user::UserType,
    pub count: i64,
}

#[derive(Debug, Clone, Default, Serialize, FromRow, ToSchema)]
pub struct CirculationStats {
    pub open_loans: i64,
    pub overdue_loans: i64,
    pub pending_reservations: i64,
    pub ready_reservations: i64,
    pub pending_fines_total: Decimal,
}

/// Dashboard figures for circulation staff
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct LibraryStats {
    pub catalog: CatalogStats,
    pub users_by_type: Vec<UserTypeCount>,
    pub circulation: CirculationStats,
}
