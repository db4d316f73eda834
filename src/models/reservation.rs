//! Reservation model and queue ordering

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

text_enum! {
    pub enum ReservationStatus {
        /// Waiting in the material's queue
        Pending => "pending",
        /// A copy is held for the user until `expires_at`
        Ready => "ready",
        Fulfilled => "fulfilled",
        Cancelled => "cancelled",
        Expired => "expired",
    }
}

impl ReservationStatus {
    pub const ACTIVE: [ReservationStatus; 2] = [ReservationStatus::Pending, ReservationStatus::Ready];

    pub fn is_active(&self) -> bool {
        Self::ACTIVE.contains(self)
    }

    pub fn can_transition_to(&self, next: ReservationStatus) -> bool {
        use ReservationStatus::*;
        matches!(
            (self, next),
            (Pending, Ready | Fulfilled | Cancelled) | (Ready, Fulfilled | Cancelled | Expired)
        )
    }
}

/// Reservation model from database
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Reservation {
    pub id: i32,
    pub user_id: i32,
    pub material_id: i32,
    pub status: ReservationStatus,
    pub priority: i32,
    pub reserved_at: DateTime<Utc>,
    pub ready_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub fulfilled_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl Reservation {
    /// Queue order: higher priority first, then earlier request, then lower id
    pub fn queue_cmp(&self, other: &Self) -> Ordering {
        other
            .priority
            .cmp(&self.priority)
            .then(self.reserved_at.cmp(&other.reserved_at))
            .then(self.id.cmp(&other.id))
    }

    pub fn hold_expired(&self, now: DateTime<Utc>) -> bool {
        self.status == ReservationStatus::Ready && self.expires_at.is_some_and(|at| at < now)
    }
}

/// The pending reservation first in line
pub fn next_in_queue(queue: &[Reservation]) -> Option<&Reservation> {
    queue
        .iter()
        .filter(|r| r.status == ReservationStatus::Pending)
        .min_by(|a, b| a.queue_cmp(b))
}

/// Reservation with material title and queue position
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct ReservationDetails {
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub reservation: Reservation,
    pub material_title: String,
    pub user_name: String,
    /// 1-based position among pending reservations of the material
    pub queue_position: Option<i64>,
}

/// Ready hold with what a pickup notice needs
#[derive(Debug, Clone, FromRow)]
pub struct HoldNotice {
    pub reservation_id: i32,
    pub user_id: i32,
    pub email: String,
    pub user_name: String,
    pub material_title: String,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Reservation listing filters
#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct ReservationQuery {
    pub user_id: Option<i32>,
    pub material_id: Option<i32>,
    pub status: Option<ReservationStatus>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

/// Create reservation request
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateReservation {
    /// Defaults to the caller
    pub user_id: Option<i32>,
    pub material_id: i32,
}

/// Priority override request
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdatePriority {
    #[validate(range(min = -100, max = 100))]
    pub priority: i32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn reservation(id: i32, priority: i32, minutes_ago: i64) -> Reservation {
        Reservation {
            id,
            user_id: id,
            material_id: 1,
            status: ReservationStatus::Pending,
            priority,
            reserved_at: Utc::now() - Duration::minutes(minutes_ago),
            ready_at: None,
            expires_at: None,
            fulfilled_at: None,
            cancelled_at: None,
        }
    }

    #[test]
    fn test_priority_beats_request_time() {
        let queue = vec![reservation(1, 0, 60), reservation(2, 2, 5)];
        assert_eq!(next_in_queue(&queue).map(|r| r.id), Some(2));
    }

    #[test]
    fn test_earlier_request_wins_at_equal_priority() {
        let queue = vec![reservation(1, 1, 5), reservation(2, 1, 60)];
        assert_eq!(next_in_queue(&queue).map(|r| r.id), Some(2));
    }

    #[test]
    fn test_sorted_queue() {
        let mut queue = vec![
            reservation(1, 0, 90),
            reservation(2, 2, 10),
            reservation(3, 0, 120),
            reservation(4, 2, 30),
        ];
        queue.sort_by(|a, b| a.queue_cmp(b));
        let ids: Vec<i32> = queue.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![4, 2, 3, 1]);
    }

    #[test]
    fn test_ready_reservations_skipped() {
        let mut ready = reservation(1, 5, 100);
        ready.status = ReservationStatus::Ready;
        let queue = vec![ready, reservation(2, 0, 1)];
        assert_eq!(next_in_queue(&queue).map(|r| r.id), Some(2));
        assert!(next_in_queue(&[]).is_none());
    }

    #[test]
    fn test_transitions() {
        assert!(ReservationStatus::Pending.can_transition_to(ReservationStatus::Ready));
        assert!(ReservationStatus::Pending.can_transition_to(ReservationStatus::Fulfilled));
        assert!(!ReservationStatus::Pending.can_transition_to(ReservationStatus::Expired));
        assert!(ReservationStatus::Ready.can_transition_to(ReservationStatus::Expired));
        assert!(!ReservationStatus::Expired.can_transition_to(ReservationStatus::Ready));
    }

    #[test]
    fn test_hold_expiry() {
        let now = Utc::now();
        let mut r = reservation(1, 0, 10);
        r.status = ReservationStatus::Ready;
        r.expires_at = Some(now - Duration::hours(1));
        assert!(r.hold_expired(now));

        r.expires_at = Some(now + Duration::hours(1));
        assert!(!r.hold_expired(now));
    }
}
