//! Catalog management service

use std::sync::Arc;

use chrono::Utc;

use crate::{
    error::{AppError, AppResult},
    models::material::{
        CreateMaterial, IsbnUpdate, Material, MaterialDetails, MaterialQuery, MaterialStatus, MaterialSummary,
        MaterialType, UpdateMaterial,
    },
    repository::Repository,
    services::{
        email::Notifier,
        reservations::{notify_hold, pass_copy_on},
        settings::SettingsService,
    },
};

/// Copy counts and status after an update, before any copy is handed to the queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CopyPlan {
    pub total_copies: i32,
    /// Copies written to the shelf right away
    pub available_copies: i32,
    pub status: MaterialStatus,
    /// Copies to offer to the reservation queue one by one
    pub to_offer: i32,
}

/// Work out copy counts for a change of total copies and/or status.
/// Copies out (on loan or held) can never exceed the new total.
pub fn plan_copies(
    material: &Material,
    new_total: Option<i32>,
    new_status: Option<MaterialStatus>,
) -> AppResult<CopyPlan> {
    let total_copies = new_total.unwrap_or(material.total_copies);
    let out = material.total_copies - material.available_copies;
    if total_copies < out {
        return Err(AppError::rule(format!(
            "Cannot reduce total copies to {}: {} copies are on loan or held",
            total_copies, out
        )));
    }

    let status = match new_status {
        None => material.status,
        Some(MaterialStatus::Unavailable) => {
            return Err(AppError::BadRequest(
                "Status 'unavailable' follows the copy count and cannot be set".to_string(),
            ))
        }
        Some(status) => status,
    };

    let added = total_copies - material.total_copies;
    let mut available = material.available_copies + added.min(0);
    let mut to_offer = added.max(0);

    // Back in circulation: the shelf copies go through the queue too
    if !material.status.is_circulating() && status.is_circulating() {
        to_offer += available;
        available = 0;
    }

    Ok(CopyPlan {
        total_copies,
        available_copies: available,
        status: status.for_copies(available),
        to_offer,
    })
}

/// Deletion is refused while copies are claimed. Closed history keeps the
/// material too: loans, reservations and fines still point at it, so it is
/// withdrawn through the `lost` or `maintenance` status instead.
pub fn check_deletable(open_loans: i64, active_reservations: i64, has_history: bool) -> AppResult<()> {
    if open_loans > 0 {
        return Err(AppError::rule(format!(
            "Material has {} open loan(s) and cannot be deleted",
            open_loans
        )));
    }
    if active_reservations > 0 {
        return Err(AppError::rule(format!(
            "Material has {} active reservation(s) and cannot be deleted",
            active_reservations
        )));
    }
    if has_history {
        return Err(AppError::rule(
            "Material has circulation history and cannot be deleted; set its status to lost or maintenance to withdraw it",
        ));
    }
    Ok(())
}

#[derive(Clone)]
pub struct CatalogService {
    repository: Repository,
    settings: SettingsService,
    notifier: Arc<dyn Notifier>,
}

impl CatalogService {
    pub fn new(repository: Repository, settings: SettingsService, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            repository,
            settings,
            notifier,
        }
    }

    /// Search the catalog with filters
    pub async fn search(&self, query: &MaterialQuery) -> AppResult<(Vec<MaterialSummary>, i64)> {
        self.repository.materials.search(query).await
    }

    /// Get material by ID with its review summary
    pub async fn get(&self, id: i32) -> AppResult<MaterialDetails> {
        self.repository.materials.get_details(id).await
    }

    fn checked_isbn(raw: Option<&str>) -> AppResult<IsbnUpdate> {
        IsbnUpdate::parse(raw).map_err(|raw| AppError::Validation(format!("Invalid ISBN: {}", raw)))
    }

    pub async fn create(&self, material: CreateMaterial) -> AppResult<MaterialDetails> {
        let isbn = Self::checked_isbn(material.isbn.as_deref())?.value().map(str::to_string);
        if let Some(ref isbn) = isbn {
            if self.repository.materials.isbn_exists(isbn, None).await? {
                return Err(AppError::Conflict("A material with this ISBN already exists".to_string()));
            }
        }

        let created = self
            .repository
            .materials
            .create(
                &material,
                isbn,
                material.material_type.unwrap_or(MaterialType::Book),
                material.total_copies.unwrap_or(1),
            )
            .await?;

        tracing::info!(material_id = created.id, title = %created.title, "Material created");
        self.repository.materials.get_details(created.id).await
    }

    /// Update descriptive fields, copy count or circulation status.
    /// New copies are offered to the reservation queue first.
    pub async fn update(&self, id: i32, update: UpdateMaterial) -> AppResult<MaterialDetails> {
        let isbn = Self::checked_isbn(update.isbn.as_deref())?;
        if let Some(isbn) = isbn.value() {
            if self.repository.materials.isbn_exists(isbn, Some(id)).await? {
                return Err(AppError::Conflict("A material with this ISBN already exists".to_string()));
            }
        }

        let policy = self.settings.policy().await?;
        let now = Utc::now();

        let mut tx = self.repository.pool.begin().await?;
        let material = self.repository.materials.lock(&mut *tx, id).await?;
        let plan = plan_copies(&material, update.total_copies, update.status)?;

        let updated = self
            .repository
            .materials
            .update(
                &mut *tx,
                id,
                &update,
                &isbn,
                plan.total_copies,
                plan.available_copies,
                plan.status,
            )
            .await?;

        let mut holds = Vec::new();
        for _ in 0..plan.to_offer {
            if let Some(hold) = pass_copy_on(&self.repository, &mut *tx, &updated, &policy, now).await? {
                holds.push(hold.id);
            }
        }
        tx.commit().await?;

        tracing::info!(
            material_id = id,
            total_copies = plan.total_copies,
            status = %plan.status,
            holds = holds.len(),
            "Material updated"
        );
        for hold in holds {
            notify_hold(&self.repository, self.notifier.as_ref(), hold).await;
        }

        self.repository.materials.get_details(id).await
    }

    /// Delete a material that never circulated
    pub async fn delete(&self, id: i32) -> AppResult<()> {
        let mut tx = self.repository.pool.begin().await?;
        self.repository.materials.lock(&mut *tx, id).await?;

        let open_loans = self.repository.materials.count_open_loans(&mut *tx, id).await?;
        let reservations = self.repository.materials.count_active_reservations(&mut *tx, id).await?;
        let has_history = self.repository.materials.has_history(&mut *tx, id).await?;
        check_deletable(open_loans, reservations, has_history)?;

        self.repository.materials.delete(&mut *tx, id).await?;
        tx.commit().await?;

        tracing::info!(material_id = id, "Material deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn material(total: i32, available: i32, status: MaterialStatus) -> Material {
        Material {
            id: 1,
            title: "Structure and Interpretation of Computer Programs".to_string(),
            author: Some("Abelson, Sussman".to_string()),
            isbn: None,
            publisher: None,
            publication_year: Some(1996),
            material_type: MaterialType::Book,
            category: None,
            language: None,
            description: None,
            location: None,
            total_copies: total,
            available_copies: available,
            status,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_added_copies_are_offered() {
        let plan = plan_copies(&material(2, 0, MaterialStatus::Unavailable), Some(4), None).unwrap();
        assert_eq!(plan.total_copies, 4);
        assert_eq!(plan.available_copies, 0);
        assert_eq!(plan.to_offer, 2);
        assert_eq!(plan.status, MaterialStatus::Unavailable);
    }

    #[test]
    fn test_removed_copies_come_off_the_shelf() {
        let plan = plan_copies(&material(5, 3, MaterialStatus::Available), Some(3), None).unwrap();
        assert_eq!(plan.available_copies, 1);
        assert_eq!(plan.to_offer, 0);
        assert_eq!(plan.status, MaterialStatus::Available);

        let plan = plan_copies(&material(5, 3, MaterialStatus::Available), Some(2), None).unwrap();
        assert_eq!(plan.available_copies, 0);
        assert_eq!(plan.status, MaterialStatus::Unavailable);
    }

    #[test]
    fn test_cannot_drop_below_copies_out() {
        let err = plan_copies(&material(5, 3, MaterialStatus::Available), Some(1), None).unwrap_err();
        assert_eq!(err.status_code(), axum::http::StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn test_maintenance_keeps_copies_on_shelf() {
        let plan = plan_copies(
            &material(3, 3, MaterialStatus::Available),
            None,
            Some(MaterialStatus::Maintenance),
        )
        .unwrap();
        assert_eq!(plan.status, MaterialStatus::Maintenance);
        assert_eq!(plan.available_copies, 3);
        assert_eq!(plan.to_offer, 0);
    }

    #[test]
    fn test_back_in_circulation_offers_shelf_copies() {
        let plan = plan_copies(
            &material(3, 2, MaterialStatus::Maintenance),
            None,
            Some(MaterialStatus::Available),
        )
        .unwrap();
        assert_eq!(plan.available_copies, 0);
        assert_eq!(plan.to_offer, 2);
        assert_eq!(plan.status, MaterialStatus::Unavailable);
    }

    #[test]
    fn test_delete_refused_while_claimed() {
        let err = check_deletable(1, 0, true).unwrap_err();
        assert_eq!(err.status_code(), axum::http::StatusCode::UNPROCESSABLE_ENTITY);
        assert!(err.to_string().contains("open loan"));

        let err = check_deletable(0, 2, true).unwrap_err();
        assert!(err.to_string().contains("2 active reservation"));
    }

    #[test]
    fn test_delete_refused_with_closed_history() {
        let err = check_deletable(0, 0, true).unwrap_err();
        assert_eq!(err.status_code(), axum::http::StatusCode::UNPROCESSABLE_ENTITY);
        assert!(err.to_string().contains("history"));
    }

    #[test]
    fn test_delete_allowed_without_history() {
        assert!(check_deletable(0, 0, false).is_ok());
    }

    #[test]
    fn test_unavailable_cannot_be_set() {
        assert!(plan_copies(
            &material(1, 1, MaterialStatus::Available),
            None,
            Some(MaterialStatus::Unavailable)
        )
        .is_err());
    }
}
