//! User management service

use crate::{
    error::{AppError, AppResult},
    models::user::{CreateUser, UpdateUser, User, UserClaims, UserQuery, UserStatus, UserSummary, UserType},
    repository::Repository,
    services::{auth::hash_password, redis::RedisService},
};

#[derive(Clone)]
pub struct UsersService {
    repository: Repository,
    redis: RedisService,
}

impl UsersService {
    pub fn new(repository: Repository, redis: RedisService) -> Self {
        Self { repository, redis }
    }

    pub async fn get_by_id(&self, id: i32) -> AppResult<User> {
        self.repository.users.get_by_id(id).await
    }

    pub async fn search_users(&self, query: &UserQuery) -> AppResult<(Vec<UserSummary>, i64)> {
        self.repository.users.search(query).await
    }

    /// Create an account. Only admins may create staff accounts.
    pub async fn create_user(&self, caller: &UserClaims, user: CreateUser) -> AppResult<User> {
        let user_type = user.user_type.unwrap_or(UserType::Student);
        if !user_type.is_patron() {
            caller.require_admin()?;
        }

        if self.repository.users.email_exists(&user.email, None).await? {
            return Err(AppError::Conflict("Email already registered".to_string()));
        }
        if let Some(ref card) = user.card_number {
            if self.repository.users.card_number_exists(card, None).await? {
                return Err(AppError::Conflict("Card number already in use".to_string()));
            }
        }

        let password_hash = hash_password(&user.password)?;
        let created = self.repository.users.create(&user, &password_hash, user_type).await?;

        tracing::info!(user_id = created.id, created_by = caller.user_id, user_type = %user_type, "User created");
        Ok(created)
    }

    /// Update an account. Changing the user type, or touching a staff
    /// account, requires an admin.
    pub async fn update_user(&self, caller: &UserClaims, id: i32, user: UpdateUser) -> AppResult<User> {
        let existing = self.repository.users.get_by_id(id).await?;

        let type_change = user.user_type.is_some_and(|t| t != existing.user_type);
        if type_change || !existing.user_type.is_patron() {
            caller.require_admin()?;
        }

        if let Some(ref email) = user.email {
            if self.repository.users.email_exists(email, Some(id)).await? {
                return Err(AppError::Conflict("Email already registered".to_string()));
            }
        }
        if let Some(ref card) = user.card_number {
            if self.repository.users.card_number_exists(card, Some(id)).await? {
                return Err(AppError::Conflict("Card number already in use".to_string()));
            }
        }

        let updated = self.repository.users.update(id, &user).await?;
        if type_change {
            // Tokens carry the user type
            self.redis.revoke_user_sessions(id).await?;
        }

        tracing::info!(user_id = id, updated_by = caller.user_id, "User updated");
        Ok(updated)
    }

    /// Activate, suspend or deactivate an account. Leaving `active` ends every session.
    pub async fn set_status(&self, caller: &UserClaims, id: i32, status: UserStatus) -> AppResult<User> {
        let existing = self.repository.users.get_by_id(id).await?;
        if !existing.user_type.is_patron() {
            caller.require_admin()?;
        }
        if id == caller.user_id && status != UserStatus::Active {
            return Err(AppError::BadRequest("You cannot deactivate your own account".to_string()));
        }

        let user = self.repository.users.set_status(id, status).await?;
        if status != UserStatus::Active {
            self.redis.revoke_user_sessions(id).await?;
        }

        tracing::info!(user_id = id, status = %status, changed_by = caller.user_id, "User status changed");
        Ok(user)
    }

    /// Soft delete: the account becomes inactive. Refused while loans are open.
    pub async fn delete_user(&self, caller: &UserClaims, id: i32) -> AppResult<()> {
        if id == caller.user_id {
            return Err(AppError::BadRequest("You cannot delete your own account".to_string()));
        }

        self.repository.users.get_by_id(id).await?;

        let open_loans = self.repository.loans.count_open_for_user_pool(id).await?;
        if open_loans > 0 {
            return Err(AppError::rule(format!(
                "User has {} open loan(s); return them first",
                open_loans
            )));
        }

        self.repository.users.set_status(id, UserStatus::Inactive).await?;
        self.redis.revoke_user_sessions(id).await?;

        tracing::info!(user_id = id, deleted_by = caller.user_id, "User deactivated");
        Ok(())
    }
}
