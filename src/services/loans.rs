//! Loan service: checkout, renewal, return and overdue processing

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::{
    error::{AppError, AppResult, ErrorCode},
    models::{
        loan::{CreateLoan, Loan, LoanDetails, LoanQuery, LoanStatus, ReturnOutcome},
        reservation::ReservationStatus,
        user::UserClaims,
    },
    repository::Repository,
    services::{
        email::{send_overdue_notices, Notifier},
        reservations::{ensure_active, notify_hold, pass_copy_on},
        settings::SettingsService,
    },
};

/// A borrower must be under the loan limit and not owe more than allowed
pub fn check_borrowing_limits(
    open_loans: i64,
    max_loans: i64,
    unpaid: Decimal,
    max_unpaid: Decimal,
) -> AppResult<()> {
    if open_loans >= max_loans {
        return Err(AppError::BusinessRule(
            ErrorCode::MaxLoansReached,
            format!("Maximum loans reached ({}/{})", open_loans, max_loans),
        ));
    }
    if unpaid > max_unpaid {
        return Err(AppError::BusinessRule(
            ErrorCode::UnpaidFines,
            format!("Unpaid fines of {} exceed the limit of {}", unpaid, max_unpaid),
        ));
    }
    Ok(())
}

/// Checks on the loan itself; the reservation queue is checked separately
pub fn check_renewable(loan: &Loan, max_renewals: i32, now: DateTime<Utc>) -> AppResult<()> {
    if !loan.status.can_transition_to(LoanStatus::Renewed) {
        return Err(AppError::BusinessRule(
            ErrorCode::InvalidTransition,
            format!("Cannot renew a {} loan", loan.status),
        ));
    }
    if loan.is_past_due(now) {
        return Err(AppError::rule("Loan is past due and cannot be renewed"));
    }
    if loan.renewal_count >= max_renewals {
        return Err(AppError::BusinessRule(
            ErrorCode::RenewalLimitReached,
            format!("Renewal limit reached ({}/{})", loan.renewal_count, max_renewals),
        ));
    }
    Ok(())
}

#[derive(Clone)]
pub struct LoansService {
    repository: Repository,
    settings: SettingsService,
    notifier: Arc<dyn Notifier>,
}

impl LoansService {
    pub fn new(repository: Repository, settings: SettingsService, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            repository,
            settings,
            notifier,
        }
    }

    pub async fn get(&self, caller: &UserClaims, id: i32) -> AppResult<LoanDetails> {
        let loan = self.repository.loans.get_details(id).await?;
        caller.require_self_or_staff(loan.loan.user_id)?;
        Ok(loan)
    }

    pub async fn list(&self, query: &LoanQuery) -> AppResult<(Vec<LoanDetails>, i64)> {
        self.repository.loans.list(query, false).await
    }

    /// Loans of one user; only open ones unless `include_closed`
    pub async fn user_loans(&self, user_id: i32, query: LoanQuery) -> AppResult<(Vec<LoanDetails>, i64)> {
        self.repository.users.get_by_id(user_id).await?;
        let open_only = !query.include_closed.unwrap_or(false);
        let query = LoanQuery {
            user_id: Some(user_id),
            ..query
        };
        self.repository.loans.list(&query, open_only).await
    }

    /// Lend a copy of a material
    pub async fn checkout(&self, caller: &UserClaims, request: CreateLoan) -> AppResult<LoanDetails> {
        let user_id = request.user_id.unwrap_or(caller.user_id);
        caller.require_self_or_staff(user_id)?;

        let policy = self.settings.policy().await?;
        let now = Utc::now();

        let user = self.repository.users.get_by_id(user_id).await?;
        ensure_active(&user)?;

        let mut tx = self.repository.pool.begin().await?;
        let material = self.repository.materials.lock(&mut *tx, request.material_id).await?;

        if !material.status.is_circulating() {
            return Err(AppError::BusinessRule(
                ErrorCode::MaterialNotAvailable,
                format!("Material is {} and cannot be borrowed", material.status),
            ));
        }

        if self
            .repository
            .loans
            .has_open_loan(&mut *tx, user_id, material.id)
            .await?
        {
            return Err(AppError::rule("User already has this material on loan"));
        }

        let open_loans = self.repository.loans.count_open_for_user(&mut *tx, user_id).await?;
        let unpaid = self.repository.fines.pending_total(&mut *tx, user_id).await?;
        check_borrowing_limits(
            open_loans,
            policy.max_loans_for(user.user_type),
            unpaid,
            policy.max_unpaid_fines,
        )?;

        let reservation = self
            .repository
            .reservations
            .active_for_user(&mut *tx, user_id, material.id)
            .await?;

        match reservation {
            // The held copy is already off the shelf
            Some(ref r) if r.status == ReservationStatus::Ready => {}
            _ => {
                if !self.repository.materials.take_copy(&mut *tx, material.id).await? {
                    return Err(AppError::BusinessRule(
                        ErrorCode::MaterialNotAvailable,
                        "No copy available; all copies are on loan or held for reservations".to_string(),
                    ));
                }
            }
        }

        if let Some(ref r) = reservation {
            self.repository
                .reservations
                .close(&mut *tx, r.id, ReservationStatus::Fulfilled, now)
                .await?;
        }

        let due_date = now + policy.loan_period(user.user_type);
        let loan = self
            .repository
            .loans
            .insert(&mut *tx, user_id, material.id, now, due_date, request.notes.as_deref())
            .await?;
        tx.commit().await?;

        tracing::info!(
            loan_id = loan.id,
            user_id,
            material_id = material.id,
            due_date = %loan.due_date,
            reservation_id = reservation.map(|r| r.id),
            "Loan created"
        );
        self.repository.loans.get_details(loan.id).await
    }

    /// Extend the due date by one loan period
    pub async fn renew(&self, caller: &UserClaims, id: i32) -> AppResult<LoanDetails> {
        let found = self.repository.loans.get_by_id(id).await?;
        caller.require_self_or_staff(found.user_id)?;

        let policy = self.settings.policy().await?;
        let borrower = self.repository.users.get_by_id(found.user_id).await?;
        let now = Utc::now();

        let mut tx = self.repository.pool.begin().await?;
        let loan = self.repository.loans.lock(&mut *tx, id).await?;

        check_renewable(&loan, policy.max_renewals, now)?;
        if self
            .repository
            .reservations
            .has_pending(&mut *tx, loan.material_id)
            .await?
        {
            return Err(AppError::rule("Material is reserved by another user"));
        }

        let due_date = loan.due_date + policy.loan_period(borrower.user_type);
        let renewed = self.repository.loans.renew(&mut *tx, id, due_date).await?;
        tx.commit().await?;

        tracing::info!(
            loan_id = id,
            renewal_count = renewed.renewal_count,
            due_date = %renewed.due_date,
            "Loan renewed"
        );
        self.repository.loans.get_details(id).await
    }

    /// Check a copy back in, fining a late return and serving the queue
    pub async fn return_loan(&self, id: i32) -> AppResult<ReturnOutcome> {
        let found = self.repository.loans.get_by_id(id).await?;
        let policy = self.settings.policy().await?;
        let now = Utc::now();

        let mut tx = self.repository.pool.begin().await?;
        let material = self.repository.materials.lock(&mut *tx, found.material_id).await?;
        let loan = self.repository.loans.lock(&mut *tx, id).await?;

        if !loan.status.can_transition_to(LoanStatus::Returned) {
            return Err(AppError::BusinessRule(
                ErrorCode::InvalidTransition,
                format!("Cannot return a {} loan", loan.status),
            ));
        }

        let returned = self
            .repository
            .loans
            .close(&mut *tx, id, LoanStatus::Returned, now, None)
            .await?;

        let overdue_days = policy.overdue_days(loan.due_date, now);
        let fine = match policy.fine_for(loan.due_date, now) {
            Some((days, amount)) => Some(
                self.repository
                    .fines
                    .insert(
                        &mut *tx,
                        loan.user_id,
                        Some(loan.id),
                        amount,
                        &format!("Late return: {} day(s) overdue", days),
                        None,
                    )
                    .await?,
            ),
            None => None,
        };

        let hold = pass_copy_on(&self.repository, &mut *tx, &material, &policy, now).await?;
        tx.commit().await?;

        tracing::info!(
            loan_id = id,
            user_id = loan.user_id,
            material_id = material.id,
            overdue_days,
            fine = ?fine.as_ref().map(|f| f.amount),
            "Loan returned"
        );

        if let Some(ref hold) = hold {
            notify_hold(&self.repository, self.notifier.as_ref(), hold.id).await;
        }

        Ok(ReturnOutcome {
            loan: returned,
            overdue_days,
            fine,
            hold_reservation_id: hold.map(|h| h.id),
        })
    }

    /// Void an open loan without a fine; the copy is released as on return
    pub async fn cancel(&self, caller: &UserClaims, id: i32, reason: Option<String>) -> AppResult<LoanDetails> {
        let found = self.repository.loans.get_by_id(id).await?;
        let policy = self.settings.policy().await?;
        let now = Utc::now();

        let mut tx = self.repository.pool.begin().await?;
        let material = self.repository.materials.lock(&mut *tx, found.material_id).await?;
        let loan = self.repository.loans.lock(&mut *tx, id).await?;

        if !loan.status.can_transition_to(LoanStatus::Cancelled) {
            return Err(AppError::BusinessRule(
                ErrorCode::InvalidTransition,
                format!("Cannot cancel a {} loan", loan.status),
            ));
        }

        let note = reason.map(|r| format!("Cancelled: {}", r));
        self.repository
            .loans
            .close(&mut *tx, id, LoanStatus::Cancelled, now, note.as_deref())
            .await?;
        let hold = pass_copy_on(&self.repository, &mut *tx, &material, &policy, now).await?;
        tx.commit().await?;

        tracing::info!(loan_id = id, cancelled_by = caller.user_id, "Loan cancelled");
        if let Some(hold) = hold {
            notify_hold(&self.repository, self.notifier.as_ref(), hold.id).await;
        }

        self.repository.loans.get_details(id).await
    }

    /// Flag loans past their due date and send reminders.
    /// Returns the number of loans newly flagged.
    pub async fn process_overdue(&self) -> AppResult<usize> {
        let flagged = self.repository.loans.mark_overdue(Utc::now()).await?;
        if flagged.is_empty() {
            return Ok(0);
        }

        let notified = send_overdue_notices(self.notifier.as_ref(), &flagged).await;
        tracing::info!(flagged = flagged.len(), notified, "Overdue loans processed");
        Ok(flagged.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn loan(status: LoanStatus, renewal_count: i32, due_in_days: i64) -> Loan {
        let now = Utc::now();
        Loan {
            id: 7,
            user_id: 3,
            material_id: 11,
            loan_date: now - Duration::days(14),
            due_date: now + Duration::days(due_in_days),
            return_date: None,
            status,
            renewal_count,
            notes: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_checkout_refused_at_loan_limit() {
        let err = check_borrowing_limits(5, 5, Decimal::ZERO, Decimal::new(1000, 2)).unwrap_err();
        assert_eq!(err.code(), ErrorCode::MaxLoansReached);
        assert!(check_borrowing_limits(4, 5, Decimal::ZERO, Decimal::new(1000, 2)).is_ok());
    }

    #[test]
    fn test_checkout_refused_above_unpaid_limit() {
        let limit = Decimal::new(1000, 2);
        let err = check_borrowing_limits(0, 5, Decimal::new(1001, 2), limit).unwrap_err();
        assert_eq!(err.code(), ErrorCode::UnpaidFines);
        assert_eq!(err.status_code(), axum::http::StatusCode::UNPROCESSABLE_ENTITY);

        // Owing exactly the limit still allows borrowing
        assert!(check_borrowing_limits(0, 5, limit, limit).is_ok());
    }

    #[test]
    fn test_loan_limit_checked_before_fines() {
        let err = check_borrowing_limits(5, 5, Decimal::new(5000, 2), Decimal::ZERO).unwrap_err();
        assert_eq!(err.code(), ErrorCode::MaxLoansReached);
    }

    #[test]
    fn test_renewal_refused_at_limit() {
        let now = Utc::now();
        let err = check_renewable(&loan(LoanStatus::Renewed, 2, 5), 2, now).unwrap_err();
        assert_eq!(err.code(), ErrorCode::RenewalLimitReached);
        assert!(check_renewable(&loan(LoanStatus::Renewed, 1, 5), 2, now).is_ok());
        assert!(check_renewable(&loan(LoanStatus::Active, 0, 5), 0, now).is_err());
    }

    #[test]
    fn test_renewal_refused_when_past_due_or_closed() {
        let now = Utc::now();
        let err = check_renewable(&loan(LoanStatus::Active, 0, -1), 2, now).unwrap_err();
        assert_eq!(err.code(), ErrorCode::BusinessRule);

        let err = check_renewable(&loan(LoanStatus::Overdue, 0, -3), 2, now).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidTransition);

        let err = check_renewable(&loan(LoanStatus::Returned, 0, 5), 2, now).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidTransition);
    }
}
