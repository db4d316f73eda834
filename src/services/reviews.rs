//! Material reviews service

use crate::{
    error::{AppError, AppResult},
    models::{
        review::{CreateReview, Review, ReviewList, UpdateReview},
        user::UserClaims,
    },
    repository::Repository,
};

#[derive(Clone)]
pub struct ReviewsService {
    repository: Repository,
}

impl ReviewsService {
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }

    /// Reviews of a material, newest first, with the rating summary
    pub async fn list_for_material(&self, material_id: i32) -> AppResult<ReviewList> {
        self.repository.materials.get_by_id(material_id).await?;

        let reviews = self.repository.reviews.list_for_material(material_id).await?;
        let (average_rating, review_count) = self.repository.reviews.summary(material_id).await?;

        Ok(ReviewList {
            material_id,
            average_rating,
            review_count,
            reviews,
        })
    }

    /// One review per user and material, only from past borrowers
    pub async fn create(&self, caller: &UserClaims, material_id: i32, review: CreateReview) -> AppResult<Review> {
        self.repository.materials.get_by_id(material_id).await?;

        if self.repository.reviews.exists(caller.user_id, material_id).await? {
            return Err(AppError::Conflict("You have already reviewed this material".to_string()));
        }
        if !self.repository.loans.has_borrowed(caller.user_id, material_id).await? {
            return Err(AppError::rule("Only users who borrowed this material can review it"));
        }

        let created = self.repository.reviews.create(caller.user_id, material_id, &review).await?;
        tracing::info!(review_id = created.id, user_id = caller.user_id, material_id, "Review created");
        Ok(created)
    }

    /// Authors edit their own reviews
    pub async fn update(&self, caller: &UserClaims, id: i32, review: UpdateReview) -> AppResult<Review> {
        let existing = self.repository.reviews.get_by_id(id).await?;
        if existing.user_id != caller.user_id {
            return Err(AppError::Authorization("Only the author can edit a review".to_string()));
        }
        self.repository.reviews.update(id, &review).await
    }

    /// Authors and librarians delete reviews
    pub async fn delete(&self, caller: &UserClaims, id: i32) -> AppResult<()> {
        let existing = self.repository.reviews.get_by_id(id).await?;
        if existing.user_id != caller.user_id {
            caller.require_librarian()?;
        }

        self.repository.reviews.delete(id).await?;
        tracing::info!(review_id = id, deleted_by = caller.user_id, "Review deleted");
        Ok(())
    }
}
