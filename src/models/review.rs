//! Material review model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Review {
    pub id: i32,
    pub user_id: i32,
    pub material_id: i32,
    pub rating: i16,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Reviewer display name
    pub reviewer_name: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ReviewList {
    pub material_id: i32,
    pub average_rating: Option<f64>,
    pub review_count: i64,
    pub reviews: Vec<Review>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateReview {
    #[validate(range(min = 1, max = 5, message = "Rating must be between 1 and 5"))]
    pub rating: i16,
    #[validate(length(max = 2000, message = "Comment must be at most 2000 characters"))]
    pub comment: Option<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateReview {
    #[validate(range(min = 1, max = 5, message = "Rating must be between 1 and 5"))]
    pub rating: Option<i16>,
    #[validate(length(max = 2000, message = "Comment must be at most 2000 characters"))]
    pub comment: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rating_bounds() {
        let ok = CreateReview { rating: 5, comment: None };
        assert!(ok.validate().is_ok());

        let low = CreateReview { rating: 0, comment: None };
        assert!(low.validate().is_err());

        let high = UpdateReview { rating: Some(6), comment: None };
        assert!(high.validate().is_err());
    }

    #[test]
    fn test_comment_length() {
        let review = CreateReview {
            rating: 3,
            comment: Some("x".repeat(2001)),
        };
        assert!(review.validate().is_err());
    }
}
