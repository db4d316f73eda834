//! Reservations repository for database operations

use chrono::{DateTime, Utc};
use sqlx::{PgConnection, Pool, Postgres};

use crate::{
    error::{AppError, AppResult},
    models::{
        reservation::{HoldNotice, Reservation, ReservationDetails, ReservationQuery, ReservationStatus},
        Page,
    },
};

use super::{conflict_on_unique, ACTIVE_RESERVATION_STATUSES};

/// Queue position counts pending reservations of the same material
/// ordered ahead of (or equal to) this one.
const DETAILS_SELECT: &str = r#"
    SELECT r.*,
           m.title AS material_title,
           (u.first_name || ' ' || u.last_name) AS user_name,
           CASE WHEN r.status = 'pending' THEN (
               SELECT COUNT(*) FROM reservations q
               WHERE q.material_id = r.material_id
                 AND q.status = 'pending'
                 AND (q.priority > r.priority
                      OR (q.priority = r.priority AND q.reserved_at < r.reserved_at)
                      OR (q.priority = r.priority AND q.reserved_at = r.reserved_at AND q.id <= r.id))
           ) END AS queue_position
    FROM reservations r
    JOIN materials m ON m.id = r.material_id
    JOIN users u ON u.id = r.user_id
"#;

#[derive(Clone)]
pub struct ReservationsRepository {
    pool: Pool<Postgres>,
}

impl ReservationsRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    pub async fn get_by_id(&self, id: i32) -> AppResult<Reservation> {
        sqlx::query_as::<_, Reservation>("SELECT * FROM reservations WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Reservation with id {} not found", id)))
    }

    /// Lock a reservation row for the rest of the transaction
    pub async fn lock(&self, conn: &mut PgConnection, id: i32) -> AppResult<Reservation> {
        sqlx::query_as::<_, Reservation>("SELECT * FROM reservations WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(conn)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Reservation with id {} not found", id)))
    }

    pub async fn get_details(&self, id: i32) -> AppResult<ReservationDetails> {
        sqlx::query_as::<_, ReservationDetails>(&format!("{} WHERE r.id = $1", DETAILS_SELECT))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Reservation with id {} not found", id)))
    }

    pub async fn list(&self, query: &ReservationQuery) -> AppResult<(Vec<ReservationDetails>, i64)> {
        let page = Page::new(query.page, query.per_page);

        const FILTER: &str = r#"
            ($1::int IS NULL OR r.user_id = $1)
            AND ($2::int IS NULL OR r.material_id = $2)
            AND ($3::text IS NULL OR r.status = $3)
        "#;

        let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM reservations r WHERE {}", FILTER))
            .bind(query.user_id)
            .bind(query.material_id)
            .bind(query.status)
            .fetch_one(&self.pool)
            .await?;

        let reservations = sqlx::query_as::<_, ReservationDetails>(&format!(
            "{} WHERE {} ORDER BY r.reserved_at DESC, r.id DESC LIMIT $4 OFFSET $5",
            DETAILS_SELECT, FILTER
        ))
        .bind(query.user_id)
        .bind(query.material_id)
        .bind(query.status)
        .bind(page.per_page)
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await?;

        Ok((reservations, total))
    }

    /// Pending queue of a material, head first
    pub async fn queue_for_material(&self, material_id: i32) -> AppResult<Vec<ReservationDetails>> {
        let queue = sqlx::query_as::<_, ReservationDetails>(&format!(
            "{} WHERE r.material_id = $1 AND r.status = 'pending' ORDER BY r.priority DESC, r.reserved_at, r.id",
            DETAILS_SELECT
        ))
        .bind(material_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(queue)
    }

    /// Pending reservations of a material, locked
    pub async fn pending_queue(&self, conn: &mut PgConnection, material_id: i32) -> AppResult<Vec<Reservation>> {
        let queue = sqlx::query_as::<_, Reservation>(
            r#"
            SELECT * FROM reservations
            WHERE material_id = $1 AND status = 'pending'
            ORDER BY priority DESC, reserved_at, id
            FOR UPDATE
            "#,
        )
        .bind(material_id)
        .fetch_all(conn)
        .await?;
        Ok(queue)
    }

    pub async fn has_pending(&self, conn: &mut PgConnection, material_id: i32) -> AppResult<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM reservations WHERE material_id = $1 AND status = 'pending')",
        )
        .bind(material_id)
        .fetch_one(conn)
        .await?;
        Ok(exists)
    }

    pub async fn count_active_for_user(&self, conn: &mut PgConnection, user_id: i32) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM reservations WHERE user_id = $1 AND status IN {}",
            ACTIVE_RESERVATION_STATUSES
        ))
        .bind(user_id)
        .fetch_one(conn)
        .await?;
        Ok(count)
    }

    /// The user's pending or ready reservation of a material, locked
    pub async fn active_for_user(
        &self,
        conn: &mut PgConnection,
        user_id: i32,
        material_id: i32,
    ) -> AppResult<Option<Reservation>> {
        let reservation = sqlx::query_as::<_, Reservation>(&format!(
            "SELECT * FROM reservations WHERE user_id = $1 AND material_id = $2 AND status IN {} FOR UPDATE",
            ACTIVE_RESERVATION_STATUSES
        ))
        .bind(user_id)
        .bind(material_id)
        .fetch_optional(conn)
        .await?;
        Ok(reservation)
    }

    pub async fn insert(
        &self,
        conn: &mut PgConnection,
        user_id: i32,
        material_id: i32,
        priority: i32,
    ) -> AppResult<Reservation> {
        sqlx::query_as::<_, Reservation>(
            r#"
            INSERT INTO reservations (user_id, material_id, status, priority, reserved_at)
            VALUES ($1, $2, 'pending', $3, NOW())
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(material_id)
        .bind(priority)
        .fetch_one(conn)
        .await
        .map_err(|e| conflict_on_unique(e, "You already have an active reservation for this material"))
    }

    /// Hold a copy for the reservation until `expires_at`
    pub async fn mark_ready(
        &self,
        conn: &mut PgConnection,
        id: i32,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> AppResult<Reservation> {
        let reservation = sqlx::query_as::<_, Reservation>(
            r#"
            UPDATE reservations SET status = 'ready', ready_at = $2, expires_at = $3
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(now)
        .bind(expires_at)
        .fetch_one(conn)
        .await?;
        Ok(reservation)
    }

    /// Move to a terminal status, stamping the matching timestamp
    pub async fn close(
        &self,
        conn: &mut PgConnection,
        id: i32,
        status: ReservationStatus,
        at: DateTime<Utc>,
    ) -> AppResult<Reservation> {
        let reservation = sqlx::query_as::<_, Reservation>(
            r#"
            UPDATE reservations SET
                status = $2,
                fulfilled_at = CASE WHEN $2 = 'fulfilled' THEN $3 ELSE fulfilled_at END,
                cancelled_at = CASE WHEN $2 = 'cancelled' THEN $3 ELSE cancelled_at END
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(status)
        .bind(at)
        .fetch_one(conn)
        .await?;
        Ok(reservation)
    }

    pub async fn set_priority(&self, conn: &mut PgConnection, id: i32, priority: i32) -> AppResult<Reservation> {
        let reservation = sqlx::query_as::<_, Reservation>(
            "UPDATE reservations SET priority = $2 WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(priority)
        .fetch_one(conn)
        .await?;
        Ok(reservation)
    }

    /// Ids of ready reservations whose hold ran out before `now`
    pub async fn expired_hold_ids(&self, now: DateTime<Utc>) -> AppResult<Vec<i32>> {
        let ids: Vec<i32> = sqlx::query_scalar(
            "SELECT id FROM reservations WHERE status = 'ready' AND expires_at < $1 ORDER BY expires_at, id",
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    pub async fn hold_notice(&self, id: i32) -> AppResult<HoldNotice> {
        sqlx::query_as::<_, HoldNotice>(
            r#"
            SELECT r.id AS reservation_id, r.user_id, u.email,
                   (u.first_name || ' ' || u.last_name) AS user_name,
                   m.title AS material_title, r.expires_at
            FROM reservations r
            JOIN users u ON u.id = r.user_id
            JOIN materials m ON m.id = r.material_id
            WHERE r.id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Reservation with id {} not found", id)))
    }
}
