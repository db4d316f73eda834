//! Reservation service: the per-material queue and copy holds

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::PgConnection;

use crate::{
    error::{AppError, AppResult, ErrorCode},
    models::{
        material::Material,
        reservation::{next_in_queue, CreateReservation, Reservation, ReservationDetails, ReservationQuery, ReservationStatus},
        system_config::LibraryPolicy,
        user::{User, UserClaims, UserStatus},
    },
    repository::Repository,
    services::{
        email::{send_hold_notice, Notifier},
        settings::SettingsService,
    },
};

/// Hand a copy that just came back (or was added) to the head of the
/// material's queue, or put it on the shelf when nobody waits.
/// The material row must be locked by the caller.
pub(crate) async fn pass_copy_on(
    repository: &Repository,
    conn: &mut PgConnection,
    material: &Material,
    policy: &LibraryPolicy,
    now: DateTime<Utc>,
) -> AppResult<Option<Reservation>> {
    if material.status.is_circulating() {
        let queue = repository.reservations.pending_queue(&mut *conn, material.id).await?;
        if let Some(next) = next_in_queue(&queue) {
            let held = repository
                .reservations
                .mark_ready(&mut *conn, next.id, now, now + policy.hold_period())
                .await?;
            tracing::info!(
                reservation_id = held.id,
                user_id = held.user_id,
                material_id = material.id,
                "Copy held for reservation"
            );
            return Ok(Some(held));
        }
    }

    repository.materials.release_copy(&mut *conn, material.id).await?;
    Ok(None)
}

/// Tell the holder their copy is waiting. Never fails the caller.
pub(crate) async fn notify_hold(repository: &Repository, notifier: &dyn Notifier, reservation_id: i32) {
    match repository.reservations.hold_notice(reservation_id).await {
        Ok(notice) => send_hold_notice(notifier, &notice).await,
        Err(e) => tracing::warn!(reservation_id, "Cannot build pickup notice: {}", e),
    }
}

/// Refuse circulation for accounts that are not active
pub(crate) fn ensure_active(user: &User) -> AppResult<()> {
    if user.status == UserStatus::Active {
        Ok(())
    } else {
        Err(AppError::BusinessRule(
            ErrorCode::AccountSuspended,
            format!("Account is {}", user.status),
        ))
    }
}

#[derive(Clone)]
pub struct ReservationsService {
    repository: Repository,
    settings: SettingsService,
    notifier: Arc<dyn Notifier>,
}

impl ReservationsService {
    pub fn new(repository: Repository, settings: SettingsService, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            repository,
            settings,
            notifier,
        }
    }

    pub async fn get(&self, caller: &UserClaims, id: i32) -> AppResult<ReservationDetails> {
        let reservation = self.repository.reservations.get_details(id).await?;
        caller.require_self_or_staff(reservation.reservation.user_id)?;
        Ok(reservation)
    }

    pub async fn list(&self, query: &ReservationQuery) -> AppResult<(Vec<ReservationDetails>, i64)> {
        self.repository.reservations.list(query).await
    }

    /// Pending queue of a material, head first
    pub async fn queue(&self, material_id: i32) -> AppResult<Vec<ReservationDetails>> {
        self.repository.materials.get_by_id(material_id).await?;
        self.repository.reservations.queue_for_material(material_id).await
    }

    /// Join the queue of a material that has no copy on the shelf
    pub async fn create(&self, caller: &UserClaims, request: CreateReservation) -> AppResult<ReservationDetails> {
        let user_id = request.user_id.unwrap_or(caller.user_id);
        caller.require_self_or_staff(user_id)?;

        let policy = self.settings.policy().await?;
        let user = self.repository.users.get_by_id(user_id).await?;
        ensure_active(&user)?;

        let mut tx = self.repository.pool.begin().await?;
        let material = self.repository.materials.lock(&mut *tx, request.material_id).await?;

        if !material.status.is_circulating() {
            return Err(AppError::BusinessRule(
                ErrorCode::MaterialNotAvailable,
                format!("Material is {} and cannot be reserved", material.status),
            ));
        }
        if material.available_copies > 0 {
            return Err(AppError::rule("A copy is available; borrow it directly"));
        }
        if self
            .repository
            .loans
            .has_open_loan(&mut *tx, user_id, material.id)
            .await?
        {
            return Err(AppError::rule("You already have this material on loan"));
        }
        if self
            .repository
            .reservations
            .active_for_user(&mut *tx, user_id, material.id)
            .await?
            .is_some()
        {
            return Err(AppError::Conflict(
                "You already have an active reservation for this material".to_string(),
            ));
        }

        let active = self.repository.reservations.count_active_for_user(&mut *tx, user_id).await?;
        if active >= policy.max_reservations {
            return Err(AppError::BusinessRule(
                ErrorCode::MaxReservationsReached,
                format!("Maximum reservations reached ({}/{})", active, policy.max_reservations),
            ));
        }

        let reservation = self
            .repository
            .reservations
            .insert(&mut *tx, user_id, material.id, policy.priority_for(user.user_type))
            .await?;
        tx.commit().await?;

        tracing::info!(
            reservation_id = reservation.id,
            user_id,
            material_id = material.id,
            priority = reservation.priority,
            "Reservation created"
        );
        self.repository.reservations.get_details(reservation.id).await
    }

    /// Cancel a pending or ready reservation; a held copy passes on
    pub async fn cancel(&self, caller: &UserClaims, id: i32) -> AppResult<ReservationDetails> {
        let found = self.repository.reservations.get_by_id(id).await?;
        caller.require_self_or_staff(found.user_id)?;

        let policy = self.settings.policy().await?;
        let now = Utc::now();

        let mut tx = self.repository.pool.begin().await?;
        let material = self.repository.materials.lock(&mut *tx, found.material_id).await?;
        let reservation = self.repository.reservations.lock(&mut *tx, id).await?;

        if !reservation.status.can_transition_to(ReservationStatus::Cancelled) {
            return Err(AppError::BusinessRule(
                ErrorCode::InvalidTransition,
                format!("Cannot cancel a {} reservation", reservation.status),
            ));
        }

        self.repository
            .reservations
            .close(&mut *tx, id, ReservationStatus::Cancelled, now)
            .await?;

        let next = if reservation.status == ReservationStatus::Ready {
            pass_copy_on(&self.repository, &mut *tx, &material, &policy, now).await?
        } else {
            None
        };
        tx.commit().await?;

        tracing::info!(reservation_id = id, cancelled_by = caller.user_id, "Reservation cancelled");
        if let Some(next) = next {
            notify_hold(&self.repository, self.notifier.as_ref(), next.id).await;
        }

        self.repository.reservations.get_details(id).await
    }

    /// Override the queue priority of a pending reservation
    pub async fn set_priority(&self, id: i32, priority: i32) -> AppResult<ReservationDetails> {
        let mut tx = self.repository.pool.begin().await?;
        let reservation = self.repository.reservations.lock(&mut *tx, id).await?;

        if reservation.status != ReservationStatus::Pending {
            return Err(AppError::BusinessRule(
                ErrorCode::InvalidTransition,
                "Only pending reservations can be reprioritized".to_string(),
            ));
        }

        self.repository.reservations.set_priority(&mut *tx, id, priority).await?;
        tx.commit().await?;

        tracing::info!(reservation_id = id, priority, "Reservation priority changed");
        self.repository.reservations.get_details(id).await
    }

    /// Expire ready holds past their pickup deadline; their copies pass on.
    /// Returns the number of holds expired.
    pub async fn expire_holds(&self) -> AppResult<usize> {
        let now = Utc::now();
        let ids = self.repository.reservations.expired_hold_ids(now).await?;
        if ids.is_empty() {
            return Ok(0);
        }

        let policy = self.settings.policy().await?;
        let mut expired = 0;

        for id in ids {
            let found = self.repository.reservations.get_by_id(id).await?;

            let mut tx = self.repository.pool.begin().await?;
            let material = self.repository.materials.lock(&mut *tx, found.material_id).await?;
            let reservation = self.repository.reservations.lock(&mut *tx, id).await?;

            // Picked up or cancelled since the scan
            if !reservation.hold_expired(now) {
                continue;
            }

            self.repository
                .reservations
                .close(&mut *tx, id, ReservationStatus::Expired, now)
                .await?;
            let next = pass_copy_on(&self.repository, &mut *tx, &material, &policy, now).await?;
            tx.commit().await?;

            expired += 1;
            tracing::info!(reservation_id = id, user_id = reservation.user_id, "Hold expired");

            if let Some(next) = next {
                notify_hold(&self.repository, self.notifier.as_ref(), next.id).await;
            }
        }

        Ok(expired)
    }
}
