//! Reviews repository for database operations

use sqlx::{Pool, Postgres};

use crate::{
    error::{AppError, AppResult},
    models::review::{CreateReview, Review, UpdateReview},
};

use super::conflict_on_unique;

const REVIEW_SELECT: &str = r#"
    SELECT r.id, r.user_id, r.material_id, r.rating, r.comment, r.created_at, r.updated_at,
           (u.first_name || ' ' || u.last_name) AS reviewer_name
    FROM reviews r
    JOIN users u ON u.id = r.user_id
"#;

#[derive(Clone)]
pub struct ReviewsRepository {
    pool: Pool<Postgres>,
}

impl ReviewsRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    pub async fn get_by_id(&self, id: i32) -> AppResult<Review> {
        sqlx::query_as::<_, Review>(&format!("{} WHERE r.id = $1", REVIEW_SELECT))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Review with id {} not found", id)))
    }

    /// Reviews of a material, newest first
    pub async fn list_for_material(&self, material_id: i32) -> AppResult<Vec<Review>> {
        let reviews = sqlx::query_as::<_, Review>(&format!(
            "{} WHERE r.material_id = $1 ORDER BY r.created_at DESC, r.id DESC",
            REVIEW_SELECT
        ))
        .bind(material_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(reviews)
    }

    /// Average rating and review count of a material
    pub async fn summary(&self, material_id: i32) -> AppResult<(Option<f64>, i64)> {
        let summary: (Option<f64>, i64) = sqlx::query_as(
            "SELECT AVG(rating)::float8, COUNT(*) FROM reviews WHERE material_id = $1",
        )
        .bind(material_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(summary)
    }

    pub async fn exists(&self, user_id: i32, material_id: i32) -> AppResult<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM reviews WHERE user_id = $1 AND material_id = $2)",
        )
        .bind(user_id)
        .bind(material_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    pub async fn create(&self, user_id: i32, material_id: i32, review: &CreateReview) -> AppResult<Review> {
        let id: i32 = sqlx::query_scalar(
            r#"
            INSERT INTO reviews (user_id, material_id, rating, comment)
            VALUES ($1, $2, $3, $4)
            RETURNING id
            "#,
        )
        .bind(user_id)
        .bind(material_id)
        .bind(review.rating)
        .bind(&review.comment)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, "You have already reviewed this material"))?;

        self.get_by_id(id).await
    }

    pub async fn update(&self, id: i32, review: &UpdateReview) -> AppResult<Review> {
        let result = sqlx::query(
            r#"
            UPDATE reviews SET
                rating = COALESCE($2, rating),
                comment = COALESCE($3, comment),
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(review.rating)
        .bind(&review.comment)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Review with id {} not found", id)));
        }
        self.get_by_id(id).await
    }

    pub async fn delete(&self, id: i32) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM reviews WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Review with id {} not found", id)));
        }
        Ok(())
    }
}
