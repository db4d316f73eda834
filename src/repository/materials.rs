//! Catalog repository for database operations

use sqlx::{PgConnection, Pool, Postgres};

use crate::{
    error::{AppError, AppResult},
    models::{
        material::{
            CreateMaterial, IsbnUpdate, Material, MaterialDetails, MaterialQuery, MaterialStatus, MaterialSummary,
            MaterialType, UpdateMaterial,
        },
        Page,
    },
};

use super::{conflict_on_unique, ACTIVE_RESERVATION_STATUSES, OPEN_LOAN_STATUSES};

#[derive(Clone)]
pub struct MaterialsRepository {
    pool: Pool<Postgres>,
}

impl MaterialsRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Get material by ID
    pub async fn get_by_id(&self, id: i32) -> AppResult<Material> {
        sqlx::query_as::<_, Material>("SELECT * FROM materials WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Material with id {} not found", id)))
    }

    /// Get material with review summary and queue length
    pub async fn get_details(&self, id: i32) -> AppResult<MaterialDetails> {
        sqlx::query_as::<_, MaterialDetails>(
            r#"
            SELECT m.*,
                   (SELECT AVG(r.rating)::float8 FROM reviews r WHERE r.material_id = m.id) AS average_rating,
                   (SELECT COUNT(*) FROM reviews r WHERE r.material_id = m.id) AS review_count,
                   (SELECT COUNT(*) FROM reservations s
                    WHERE s.material_id = m.id AND s.status = 'pending') AS queue_length
            FROM materials m
            WHERE m.id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Material with id {} not found", id)))
    }

    /// Search the catalog with filters and pagination
    pub async fn search(&self, query: &MaterialQuery) -> AppResult<(Vec<MaterialSummary>, i64)> {
        let page = Page::new(query.page, query.per_page);
        let pattern = query
            .q
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| format!("%{}%", s));
        let category = query.category.as_deref().map(str::trim).filter(|s| !s.is_empty());
        let available_only = query.available_only.unwrap_or(false);

        const FILTER: &str = r#"
            ($1::text IS NULL OR title ILIKE $1 OR author ILIKE $1 OR isbn ILIKE $1)
            AND ($2::text IS NULL OR material_type = $2)
            AND ($3::text IS NULL OR LOWER(category) = LOWER($3))
            AND (NOT $4 OR (status = 'available' AND available_copies > 0))
        "#;

        let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM materials WHERE {}", FILTER))
            .bind(&pattern)
            .bind(query.material_type)
            .bind(category)
            .bind(available_only)
            .fetch_one(&self.pool)
            .await?;

        let materials = sqlx::query_as::<_, MaterialSummary>(&format!(
            r#"
            SELECT id, title, author, isbn, publication_year, material_type, category,
                   total_copies, available_copies, status
            FROM materials
            WHERE {}
            ORDER BY LOWER(title), id
            LIMIT $5 OFFSET $6
            "#,
            FILTER
        ))
        .bind(&pattern)
        .bind(query.material_type)
        .bind(category)
        .bind(available_only)
        .bind(page.per_page)
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await?;

        Ok((materials, total))
    }

    pub async fn isbn_exists(&self, isbn: &str, exclude_id: Option<i32>) -> AppResult<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM materials WHERE isbn = $1 AND ($2::int IS NULL OR id != $2))",
        )
        .bind(isbn)
        .bind(exclude_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    /// Create a material; every copy starts on the shelf
    pub async fn create(
        &self,
        material: &CreateMaterial,
        isbn: Option<String>,
        material_type: MaterialType,
        total_copies: i32,
    ) -> AppResult<Material> {
        sqlx::query_as::<_, Material>(
            r#"
            INSERT INTO materials (title, author, isbn, publisher, publication_year, material_type,
                                   category, language, description, location,
                                   total_copies, available_copies, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $11, 'available')
            RETURNING *
            "#,
        )
        .bind(material.title.trim())
        .bind(&material.author)
        .bind(isbn)
        .bind(&material.publisher)
        .bind(material.publication_year)
        .bind(material_type)
        .bind(&material.category)
        .bind(&material.language)
        .bind(&material.description)
        .bind(&material.location)
        .bind(total_copies)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, "A material with this ISBN already exists"))
    }

    /// Lock a material row for the rest of the transaction
    pub async fn lock(&self, conn: &mut PgConnection, id: i32) -> AppResult<Material> {
        sqlx::query_as::<_, Material>("SELECT * FROM materials WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(conn)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Material with id {} not found", id)))
    }

    /// Write descriptive fields, copy counts and status computed by the caller
    pub async fn update(
        &self,
        conn: &mut PgConnection,
        id: i32,
        material: &UpdateMaterial,
        isbn: &IsbnUpdate,
        total_copies: i32,
        available_copies: i32,
        status: MaterialStatus,
    ) -> AppResult<Material> {
        sqlx::query_as::<_, Material>(
            r#"
            UPDATE materials SET
                title = COALESCE($2, title),
                author = COALESCE($3, author),
                isbn = CASE WHEN $15 THEN NULL ELSE COALESCE($4, isbn) END,
                publisher = COALESCE($5, publisher),
                publication_year = COALESCE($6, publication_year),
                material_type = COALESCE($7, material_type),
                category = COALESCE($8, category),
                language = COALESCE($9, language),
                description = COALESCE($10, description),
                location = COALESCE($11, location),
                total_copies = $12,
                available_copies = $13,
                status = $14,
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(material.title.as_deref().map(str::trim))
        .bind(&material.author)
        .bind(isbn.value())
        .bind(&material.publisher)
        .bind(material.publication_year)
        .bind(material.material_type)
        .bind(&material.category)
        .bind(&material.language)
        .bind(&material.description)
        .bind(&material.location)
        .bind(total_copies)
        .bind(available_copies)
        .bind(status)
        .bind(isbn.clears())
        .fetch_optional(conn)
        .await
        .map_err(|e| conflict_on_unique(e, "A material with this ISBN already exists"))?
        .ok_or_else(|| AppError::NotFound(format!("Material with id {} not found", id)))
    }

    pub async fn delete(&self, conn: &mut PgConnection, id: i32) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM materials WHERE id = $1")
            .bind(id)
            .execute(conn)
            .await
            .map_err(|e| match &e {
                sqlx::Error::Database(db) if db.is_foreign_key_violation() => {
                    AppError::rule("Material is still referenced by circulation records")
                }
                _ => AppError::Database(e),
            })?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Material with id {} not found", id)));
        }
        Ok(())
    }

    /// Take one copy off the shelf. Returns false when no copy was left,
    /// so two checkouts racing for the last copy cannot both succeed.
    pub async fn take_copy(&self, conn: &mut PgConnection, id: i32) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE materials SET
                available_copies = available_copies - 1,
                status = CASE
                    WHEN status IN ('available', 'unavailable') AND available_copies - 1 = 0 THEN 'unavailable'
                    ELSE status
                END,
                updated_at = NOW()
            WHERE id = $1 AND available_copies > 0
            "#,
        )
        .bind(id)
        .execute(conn)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Put one copy back on the shelf
    pub async fn release_copy(&self, conn: &mut PgConnection, id: i32) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE materials SET
                available_copies = LEAST(available_copies + 1, total_copies),
                status = CASE WHEN status = 'unavailable' THEN 'available' ELSE status END,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(conn)
        .await?;
        Ok(())
    }

    pub async fn count_open_loans(&self, conn: &mut PgConnection, id: i32) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM loans WHERE material_id = $1 AND status IN {}",
            OPEN_LOAN_STATUSES
        ))
        .bind(id)
        .fetch_one(conn)
        .await?;
        Ok(count)
    }

    pub async fn count_active_reservations(&self, conn: &mut PgConnection, id: i32) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM reservations WHERE material_id = $1 AND status IN {}",
            ACTIVE_RESERVATION_STATUSES
        ))
        .bind(id)
        .fetch_one(conn)
        .await?;
        Ok(count)
    }

    /// Whether any loan or reservation, open or closed, refers to the material
    pub async fn has_history(&self, conn: &mut PgConnection, id: i32) -> AppResult<bool> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(SELECT 1 FROM loans WHERE material_id = $1)
                OR EXISTS(SELECT 1 FROM reservations WHERE material_id = $1)
            "#,
        )
        .bind(id)
        .fetch_one(conn)
        .await?;
        Ok(exists)
    }
}
