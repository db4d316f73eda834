//! Repository layer for database operations

pub mod fines;
pub mod loans;
pub mod materials;
pub mod reservations;
pub mod reviews;
pub mod stats;
pub mod system_config;
pub mod users;

use sqlx::{Pool, Postgres};

use crate::error::{AppError, AppResult};

/// SQL list of loan statuses in which the borrower still holds the copy
pub(crate) const OPEN_LOAN_STATUSES: &str = "('active', 'renewed', 'overdue')";

/// Open loan statuses not yet flagged overdue
pub(crate) const FLAGGABLE_LOAN_STATUSES: &str = "('active', 'renewed')";

/// SQL list of reservation statuses still claiming a copy
pub(crate) const ACTIVE_RESERVATION_STATUSES: &str = "('pending', 'ready')";

/// Main repository struct holding database connection pool
#[derive(Clone)]
pub struct Repository {
    pub pool: Pool<Postgres>,
    pub users: users::UsersRepository,
    pub materials: materials::MaterialsRepository,
    pub loans: loans::LoansRepository,
    pub reservations: reservations::ReservationsRepository,
    pub reviews: reviews::ReviewsRepository,
    pub fines: fines::FinesRepository,
    pub system_config: system_config::SystemConfigRepository,
    pub stats: stats::StatsRepository,
}

impl Repository {
    /// Create a new repository with the given database pool
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self {
            users: users::UsersRepository::new(pool.clone()),
            materials: materials::MaterialsRepository::new(pool.clone()),
            loans: loans::LoansRepository::new(pool.clone()),
            reservations: reservations::ReservationsRepository::new(pool.clone()),
            reviews: reviews::ReviewsRepository::new(pool.clone()),
            fines: fines::FinesRepository::new(pool.clone()),
            system_config: system_config::SystemConfigRepository::new(pool.clone()),
            stats: stats::StatsRepository::new(pool.clone()),
            pool,
        }
    }

    /// Round-trip to the database, used by the readiness check
    pub async fn ping(&self) -> AppResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

/// Turn a unique-constraint violation into a 409, pass anything else through
pub(crate) fn conflict_on_unique(err: sqlx::Error, message: &str) -> AppError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            AppError::Conflict(message.to_string())
        }
        _ => AppError::Database(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::loan::LoanStatus;

    fn statuses(list: &str) -> Vec<LoanStatus> {
        list.trim_matches(|c| c == '(' || c == ')')
            .split(',')
            .map(|s| s.trim().trim_matches('\'').parse().unwrap())
            .collect()
    }

    #[test]
    fn test_open_statuses_match_model() {
        let open = statuses(OPEN_LOAN_STATUSES);
        for status in LoanStatus::ALL {
            assert_eq!(open.contains(status), status.is_open(), "{}", status);
        }
    }

    #[test]
    fn test_flaggable_statuses_can_become_overdue() {
        for status in statuses(FLAGGABLE_LOAN_STATUSES) {
            assert!(status.is_open());
            assert!(status.can_transition_to(LoanStatus::Overdue));
        }
        assert!(!statuses(FLAGGABLE_LOAN_STATUSES).contains(&LoanStatus::Overdue));
    }
}
