//! Loan model and lifecycle

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

text_enum! {
    pub enum LoanStatus {
        Active => "active",
        Returned => "returned",
        Overdue => "overdue",
        Renewed => "renewed",
        Cancelled => "cancelled",
    }
}

impl LoanStatus {
    /// Statuses in which the borrower still holds the copy
    pub const OPEN: [LoanStatus; 3] = [LoanStatus::Active, LoanStatus::Renewed, LoanStatus::Overdue];

    pub fn is_open(&self) -> bool {
        Self::OPEN.contains(self)
    }

    pub fn can_transition_to(&self, next: LoanStatus) -> bool {
        use LoanStatus::*;
        match (self, next) {
            (Active | Renewed, Returned | Overdue | Renewed | Cancelled) => true,
            (Overdue, Returned | Cancelled) => true,
            _ => false,
        }
    }
}

/// Loan model from database
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Loan {
    pub id: i32,
    pub user_id: i32,
    pub material_id: i32,
    pub loan_date: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    pub return_date: Option<DateTime<Utc>>,
    pub status: LoanStatus,
    pub renewal_count: i32,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Loan {
    pub fn is_past_due(&self, now: DateTime<Utc>) -> bool {
        self.status.is_open() && self.due_date < now
    }
}

/// Loan with borrower and material for display
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct LoanDetails {
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub loan: Loan,
    pub material_title: String,
    pub user_name: String,
    pub is_overdue: bool,
}

/// Loan listing filters
#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct LoanQuery {
    pub user_id: Option<i32>,
    pub material_id: Option<i32>,
    pub status: Option<LoanStatus>,
    /// Open loans past their due date, whatever their recorded status
    pub overdue_only: Option<bool>,
    /// Include returned and cancelled loans (user listings only show open loans by default)
    pub include_closed: Option<bool>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

/// Loan that just turned overdue, with what an overdue notice needs
#[derive(Debug, Clone, FromRow)]
pub struct OverdueLoan {
    pub loan_id: i32,
    pub user_id: i32,
    pub email: String,
    pub user_name: String,
    pub material_title: String,
    pub due_date: DateTime<Utc>,
}

/// Checkout request
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateLoan {
    /// Borrower; defaults to the caller
    pub user_id: Option<i32>,
    pub material_id: i32,
    #[validate(length(max = 1000))]
    pub notes: Option<String>,
}

/// Cancel request
#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
pub struct CancelLoan {
    #[validate(length(max = 1000))]
    pub reason: Option<String>,
}

/// Result of a return: the closed loan and any fine it produced
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ReturnOutcome {
    pub loan: Loan,
    pub overdue_days: i64,
    pub fine: Option<super::fine::Fine>,
    /// Reservation now holding the returned copy, if any
    pub hold_reservation_id: Option<i32>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_open_statuses() {
        assert!(LoanStatus::Active.is_open());
        assert!(LoanStatus::Renewed.is_open());
        assert!(LoanStatus::Overdue.is_open());
        assert!(!LoanStatus::Returned.is_open());
        assert!(!LoanStatus::Cancelled.is_open());
    }

    #[test]
    fn test_transitions_from_active() {
        for next in [
            LoanStatus::Returned,
            LoanStatus::Overdue,
            LoanStatus::Renewed,
            LoanStatus::Cancelled,
        ] {
            assert!(LoanStatus::Active.can_transition_to(next));
            assert!(LoanStatus::Renewed.can_transition_to(next));
        }
        assert!(!LoanStatus::Active.can_transition_to(LoanStatus::Active));
    }

    #[test]
    fn test_overdue_cannot_renew() {
        assert!(!LoanStatus::Overdue.can_transition_to(LoanStatus::Renewed));
        assert!(LoanStatus::Overdue.can_transition_to(LoanStatus::Returned));
    }

    #[test]
    fn test_terminal_statuses() {
        for status in [LoanStatus::Returned, LoanStatus::Cancelled] {
            for next in LoanStatus::ALL {
                assert!(!status.can_transition_to(*next));
            }
        }
    }

    #[test]
    fn test_past_due_requires_open_loan() {
        let now = Utc::now();
        let mut loan = Loan {
            id: 1,
            user_id: 1,
            material_id: 1,
            loan_date: now - Duration::days(20),
            due_date: now - Duration::days(6),
            return_date: None,
            status: LoanStatus::Active,
            renewal_count: 0,
            notes: None,
            created_at: now,
            updated_at: now,
        };
        assert!(loan.is_past_due(now));

        loan.status = LoanStatus::Returned;
        assert!(!loan.is_past_due(now));
    }
}
