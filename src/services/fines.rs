//! Fines service

use chrono::Utc;
use rust_decimal::Decimal;

use crate::{
    error::{AppError, AppResult, ErrorCode},
    models::{
        fine::{CreateFine, Fine, FineQuery, FineStatus, UserFines},
        system_config::MAX_MONEY,
        user::UserClaims,
    },
    repository::Repository,
};

/// Amount rounded to cents, rejected when nothing is left to charge
/// or it does not fit the money column
pub fn checked_fine_amount(amount: Decimal) -> AppResult<Decimal> {
    let amount = amount.round_dp(2);
    if amount <= Decimal::ZERO {
        return Err(AppError::Validation("Amount must be at least 0.01".to_string()));
    }
    if amount > MAX_MONEY {
        return Err(AppError::Validation(format!("Amount must not exceed {}", MAX_MONEY)));
    }
    Ok(amount)
}

#[derive(Clone)]
pub struct FinesService {
    repository: Repository,
}

impl FinesService {
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }

    pub async fn get(&self, caller: &UserClaims, id: i32) -> AppResult<Fine> {
        let fine = self.repository.fines.get_by_id(id).await?;
        caller.require_self_or_staff(fine.user_id)?;
        Ok(fine)
    }

    pub async fn list(&self, query: &FineQuery) -> AppResult<(Vec<Fine>, i64)> {
        self.repository.fines.list(query).await
    }

    /// A user's fines with the amount still owed
    pub async fn user_fines(&self, user_id: i32) -> AppResult<UserFines> {
        self.repository.users.get_by_id(user_id).await?;

        let fines = self.repository.fines.for_user(user_id).await?;
        let pending_total = fines
            .iter()
            .filter(|f| f.status == FineStatus::Pending)
            .map(|f| f.amount)
            .sum();

        Ok(UserFines {
            user_id,
            pending_total,
            fines,
        })
    }

    /// Manual fine, e.g. for a lost or damaged copy
    pub async fn create(&self, caller: &UserClaims, fine: CreateFine) -> AppResult<Fine> {
        let amount = checked_fine_amount(fine.amount)?;

        self.repository.users.get_by_id(fine.user_id).await?;
        if let Some(loan_id) = fine.loan_id {
            let loan = self.repository.loans.get_by_id(loan_id).await?;
            if loan.user_id != fine.user_id {
                return Err(AppError::BadRequest("Loan does not belong to this user".to_string()));
            }
        }

        let mut tx = self.repository.pool.begin().await?;
        let created = self
            .repository
            .fines
            .insert(
                &mut *tx,
                fine.user_id,
                fine.loan_id,
                amount,
                fine.reason.trim(),
                fine.notes.as_deref(),
            )
            .await?;
        tx.commit().await?;

        tracing::info!(fine_id = created.id, user_id = fine.user_id, %amount, issued_by = caller.user_id, "Fine issued");
        Ok(created)
    }

    pub async fn pay(&self, caller: &UserClaims, id: i32) -> AppResult<Fine> {
        let mut tx = self.repository.pool.begin().await?;
        let fine = self.repository.fines.lock(&mut *tx, id).await?;
        caller.require_self_or_staff(fine.user_id)?;
        Self::ensure_pending(&fine)?;

        let paid = self.repository.fines.mark_paid(&mut *tx, id, Utc::now()).await?;
        tx.commit().await?;

        tracing::info!(fine_id = id, user_id = fine.user_id, amount = %fine.amount, "Fine paid");
        Ok(paid)
    }

    pub async fn waive(&self, caller: &UserClaims, id: i32, reason: &str) -> AppResult<Fine> {
        let mut tx = self.repository.pool.begin().await?;
        let fine = self.repository.fines.lock(&mut *tx, id).await?;
        Self::ensure_pending(&fine)?;

        let note = format!("Waived: {}", reason.trim());
        let waived = self
            .repository
            .fines
            .waive(&mut *tx, id, Utc::now(), caller.user_id, &note)
            .await?;
        tx.commit().await?;

        tracing::info!(fine_id = id, waived_by = caller.user_id, "Fine waived");
        Ok(waived)
    }

    fn ensure_pending(fine: &Fine) -> AppResult<()> {
        if fine.status == FineStatus::Pending {
            Ok(())
        } else {
            Err(AppError::BusinessRule(
                ErrorCode::InvalidTransition,
                format!("Fine is already {}", fine.status),
            ))
        }
    }
}
