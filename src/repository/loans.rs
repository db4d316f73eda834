//! Loans repository for database operations

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use sqlx::{PgConnection, Pool, Postgres};

use crate::{
    error::{AppError, AppResult},
    models::{
        loan::{Loan, LoanDetails, LoanQuery, LoanStatus, OverdueLoan},
        Page,
    },
};

use super::{FLAGGABLE_LOAN_STATUSES, OPEN_LOAN_STATUSES};

static DETAILS_SELECT: Lazy<String> = Lazy::new(|| {
    format!(
        r#"
    SELECT l.*,
           m.title AS material_title,
           (u.first_name || ' ' || u.last_name) AS user_name,
           (l.status IN {} AND l.due_date < NOW()) AS is_overdue
    FROM loans l
    JOIN materials m ON m.id = l.material_id
    JOIN users u ON u.id = l.user_id
"#,
        OPEN_LOAN_STATUSES
    )
});

#[derive(Clone)]
pub struct LoansRepository {
    pool: Pool<Postgres>,
}

impl LoansRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Get loan by ID
    pub async fn get_by_id(&self, id: i32) -> AppResult<Loan> {
        sqlx::query_as::<_, Loan>("SELECT * FROM loans WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Loan with id {} not found", id)))
    }

    /// Lock a loan row for the rest of the transaction
    pub async fn lock(&self, conn: &mut PgConnection, id: i32) -> AppResult<Loan> {
        sqlx::query_as::<_, Loan>("SELECT * FROM loans WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(conn)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Loan with id {} not found", id)))
    }

    pub async fn get_details(&self, id: i32) -> AppResult<LoanDetails> {
        sqlx::query_as::<_, LoanDetails>(&format!("{} WHERE l.id = $1", DETAILS_SELECT.as_str()))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Loan with id {} not found", id)))
    }

    /// List loans with filters. `open_only` restricts to loans still held.
    pub async fn list(&self, query: &LoanQuery, open_only: bool) -> AppResult<(Vec<LoanDetails>, i64)> {
        let page = Page::new(query.page, query.per_page);
        let overdue_only = query.overdue_only.unwrap_or(false);

        let filter = format!(
            r#"
            ($1::int IS NULL OR l.user_id = $1)
            AND ($2::int IS NULL OR l.material_id = $2)
            AND ($3::text IS NULL OR l.status = $3)
            AND (NOT $4 OR (l.status IN {open} AND l.due_date < NOW()))
            AND (NOT $5 OR l.status IN {open})
            "#,
            open = OPEN_LOAN_STATUSES
        );

        let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM loans l WHERE {}", filter))
            .bind(query.user_id)
            .bind(query.material_id)
            .bind(query.status)
            .bind(overdue_only)
            .bind(open_only)
            .fetch_one(&self.pool)
            .await?;

        let loans = sqlx::query_as::<_, LoanDetails>(&format!(
            "{} WHERE {} ORDER BY l.due_date, l.id LIMIT $6 OFFSET $7",
            DETAILS_SELECT.as_str(), filter
        ))
        .bind(query.user_id)
        .bind(query.material_id)
        .bind(query.status)
        .bind(overdue_only)
        .bind(open_only)
        .bind(page.per_page)
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await?;

        Ok((loans, total))
    }

    pub async fn count_open_for_user(&self, conn: &mut PgConnection, user_id: i32) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM loans WHERE user_id = $1 AND status IN {}",
            OPEN_LOAN_STATUSES
        ))
        .bind(user_id)
        .fetch_one(conn)
        .await?;
        Ok(count)
    }

    pub async fn count_open_for_user_pool(&self, user_id: i32) -> AppResult<i64> {
        let mut conn = self.pool.acquire().await?;
        self.count_open_for_user(&mut *conn, user_id).await
    }

    pub async fn has_open_loan(&self, conn: &mut PgConnection, user_id: i32, material_id: i32) -> AppResult<bool> {
        let exists: bool = sqlx::query_scalar(&format!(
            "SELECT EXISTS(SELECT 1 FROM loans WHERE user_id = $1 AND material_id = $2 AND status IN {})",
            OPEN_LOAN_STATUSES
        ))
        .bind(user_id)
        .bind(material_id)
        .fetch_one(conn)
        .await?;
        Ok(exists)
    }

    /// Whether the user ever borrowed the material (cancelled loans excluded)
    pub async fn has_borrowed(&self, user_id: i32, material_id: i32) -> AppResult<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM loans WHERE user_id = $1 AND material_id = $2 AND status != 'cancelled')",
        )
        .bind(user_id)
        .bind(material_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    pub async fn insert(
        &self,
        conn: &mut PgConnection,
        user_id: i32,
        material_id: i32,
        loan_date: DateTime<Utc>,
        due_date: DateTime<Utc>,
        notes: Option<&str>,
    ) -> AppResult<Loan> {
        let loan = sqlx::query_as::<_, Loan>(
            r#"
            INSERT INTO loans (user_id, material_id, loan_date, due_date, status, renewal_count, notes)
            VALUES ($1, $2, $3, $4, 'active', 0, $5)
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(material_id)
        .bind(loan_date)
        .bind(due_date)
        .bind(notes)
        .fetch_one(conn)
        .await?;
        Ok(loan)
    }

    /// Close an open loan as returned or cancelled
    pub async fn close(
        &self,
        conn: &mut PgConnection,
        id: i32,
        status: LoanStatus,
        at: DateTime<Utc>,
        note: Option<&str>,
    ) -> AppResult<Loan> {
        let loan = sqlx::query_as::<_, Loan>(
            r#"
            UPDATE loans SET
                status = $2,
                return_date = $3,
                notes = CASE
                    WHEN $4::text IS NULL THEN notes
                    WHEN notes IS NULL THEN $4
                    ELSE notes || E'\n' || $4
                END,
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(status)
        .bind(at)
        .bind(note)
        .fetch_one(conn)
        .await?;
        Ok(loan)
    }

    pub async fn renew(&self, conn: &mut PgConnection, id: i32, due_date: DateTime<Utc>) -> AppResult<Loan> {
        let loan = sqlx::query_as::<_, Loan>(
            r#"
            UPDATE loans SET
                due_date = $2,
                status = 'renewed',
                renewal_count = renewal_count + 1,
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(due_date)
        .fetch_one(conn)
        .await?;
        Ok(loan)
    }

    /// Flag active/renewed loans due before `now` as overdue and return them
    pub async fn mark_overdue(&self, now: DateTime<Utc>) -> AppResult<Vec<OverdueLoan>> {
        let loans = sqlx::query_as::<_, OverdueLoan>(&format!(
            r#"
            WITH flagged AS (
                UPDATE loans SET status = 'overdue', updated_at = NOW()
                WHERE status IN {} AND due_date < $1
                RETURNING id, user_id, material_id, due_date
            )
            SELECT f.id AS loan_id, f.user_id, u.email,
                   (u.first_name || ' ' || u.last_name) AS user_name,
                   m.title AS material_title, f.due_date
            FROM flagged f
            JOIN users u ON u.id = f.user_id
            JOIN materials m ON m.id = f.material_id
            ORDER BY f.id
            "#,
            FLAGGABLE_LOAN_STATUSES
        ))
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        Ok(loans)
    }
}
