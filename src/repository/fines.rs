//! Fines repository for database operations

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgConnection, Pool, Postgres};

use crate::{
    error::{AppError, AppResult},
    models::{
        fine::{Fine, FineQuery},
        Page,
    },
};

#[derive(Clone)]
pub struct FinesRepository {
    pool: Pool<Postgres>,
}

impl FinesRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    pub async fn get_by_id(&self, id: i32) -> AppResult<Fine> {
        sqlx::query_as::<_, Fine>("SELECT * FROM fines WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Fine with id {} not found", id)))
    }

    pub async fn lock(&self, conn: &mut PgConnection, id: i32) -> AppResult<Fine> {
        sqlx::query_as::<_, Fine>("SELECT * FROM fines WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(conn)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Fine with id {} not found", id)))
    }

    pub async fn list(&self, query: &FineQuery) -> AppResult<(Vec<Fine>, i64)> {
        let page = Page::new(query.page, query.per_page);

        const FILTER: &str = "($1::int IS NULL OR user_id = $1) AND ($2::text IS NULL OR status = $2)";

        let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM fines WHERE {}", FILTER))
            .bind(query.user_id)
            .bind(query.status)
            .fetch_one(&self.pool)
            .await?;

        let fines = sqlx::query_as::<_, Fine>(&format!(
            "SELECT * FROM fines WHERE {} ORDER BY issued_at DESC, id DESC LIMIT $3 OFFSET $4",
            FILTER
        ))
        .bind(query.user_id)
        .bind(query.status)
        .bind(page.per_page)
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await?;

        Ok((fines, total))
    }

    /// All fines of a user, newest first
    pub async fn for_user(&self, user_id: i32) -> AppResult<Vec<Fine>> {
        let fines = sqlx::query_as::<_, Fine>(
            "SELECT * FROM fines WHERE user_id = $1 ORDER BY issued_at DESC, id DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(fines)
    }

    /// Sum of the user's pending fines
    pub async fn pending_total(&self, conn: &mut PgConnection, user_id: i32) -> AppResult<Decimal> {
        let total: Decimal = sqlx::query_scalar(
            "SELECT COALESCE(SUM(amount), 0) FROM fines WHERE user_id = $1 AND status = 'pending'",
        )
        .bind(user_id)
        .fetch_one(conn)
        .await?;
        Ok(total)
    }

    pub async fn insert(
        &self,
        conn: &mut PgConnection,
        user_id: i32,
        loan_id: Option<i32>,
        amount: Decimal,
        reason: &str,
        notes: Option<&str>,
    ) -> AppResult<Fine> {
        let fine = sqlx::query_as::<_, Fine>(
            r#"
            INSERT INTO fines (user_id, loan_id, amount, reason, status, notes)
            VALUES ($1, $2, $3, $4, 'pending', $5)
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(loan_id)
        .bind(amount)
        .bind(reason)
        .bind(notes)
        .fetch_one(conn)
        .await?;
        Ok(fine)
    }

    pub async fn mark_paid(&self, conn: &mut PgConnection, id: i32, at: DateTime<Utc>) -> AppResult<Fine> {
        let fine = sqlx::query_as::<_, Fine>(
            "UPDATE fines SET status = 'paid', paid_at = $2 WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(at)
        .fetch_one(conn)
        .await?;
        Ok(fine)
    }

    pub async fn waive(
        &self,
        conn: &mut PgConnection,
        id: i32,
        at: DateTime<Utc>,
        waived_by: i32,
        reason: &str,
    ) -> AppResult<Fine> {
        let fine = sqlx::query_as::<_, Fine>(
            r#"
            UPDATE fines SET
                status = 'waived',
                waived_at = $2,
                waived_by = $3,
                notes = CASE WHEN notes IS NULL THEN $4 ELSE notes || E'\n' || $4 END
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(at)
        .bind(waived_by)
        .bind(reason)
        .fetch_one(conn)
        .await?;
        Ok(fine)
    }
}
