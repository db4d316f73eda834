//! Statistics repository

use sqlx::{Pool, Postgres};

use crate::{
    error::AppResult,
    models::stats::{CatalogStats, CirculationStats, LibraryStats, UserTypeCount},
};

use super::OPEN_LOAN_STATUSES;

#[derive(Clone)]
pub struct StatsRepository {
    pool: Pool<Postgres>,
}

impl StatsRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    pub async fn library_stats(&self) -> AppResult<LibraryStats> {
        let catalog = sqlx::query_as::<_, CatalogStats>(
            r#"
            SELECT COUNT(*) AS titles,
                   COALESCE(SUM(total_copies), 0)::int8 AS total_copies,
                   COALESCE(SUM(available_copies), 0)::int8 AS available_copies
            FROM materials
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        let users_by_type = sqlx::query_as::<_, UserTypeCount>(
            r#"
            SELECT user_type, COUNT(*) AS count
            FROM users
            WHERE status != 'inactive'
            GROUP BY user_type
            ORDER BY user_type
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let circulation = sqlx::query_as::<_, CirculationStats>(&format!(
            r#"
            SELECT
                (SELECT COUNT(*) FROM loans WHERE status IN {open}) AS open_loans,
                (SELECT COUNT(*) FROM loans
                 WHERE status IN {open} AND due_date < NOW()) AS overdue_loans,
                (SELECT COUNT(*) FROM reservations WHERE status = 'pending') AS pending_reservations,
                (SELECT COUNT(*) FROM reservations WHERE status = 'ready') AS ready_reservations,
                (SELECT COALESCE(SUM(amount), 0) FROM fines WHERE status = 'pending') AS pending_fines_total
            "#,
            open = OPEN_LOAN_STATUSES
        ))
        .fetch_one(&self.pool)
        .await?;

        Ok(LibraryStats {
            catalog,
            users_by_type,
            circulation,
        })
    }
}
