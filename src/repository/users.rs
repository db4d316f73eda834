//! Users repository for database operations

use sqlx::{Pool, Postgres};

use crate::{
    error::{AppError, AppResult},
    models::{
        user::{CreateUser, UpdateProfile, UpdateUser, User, UserQuery, UserStatus, UserSummary, UserType},
        Page,
    },
};

use super::{conflict_on_unique, OPEN_LOAN_STATUSES};

#[derive(Clone)]
pub struct UsersRepository {
    pool: Pool<Postgres>,
}

impl UsersRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Get user by ID
    pub async fn get_by_id(&self, id: i32) -> AppResult<User> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User with id {} not found", id)))
    }

    /// Get user by email (the login, case-insensitive)
    pub async fn get_by_email(&self, email: &str) -> AppResult<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE LOWER(email) = LOWER($1)")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;

        Ok(user)
    }

    /// Check if email already exists
    pub async fn email_exists(&self, email: &str, exclude_id: Option<i32>) -> AppResult<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM users WHERE LOWER(email) = LOWER($1) AND ($2::int IS NULL OR id != $2))",
        )
        .bind(email)
        .bind(exclude_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    /// Check if a library card number is already assigned
    pub async fn card_number_exists(&self, card_number: &str, exclude_id: Option<i32>) -> AppResult<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM users WHERE card_number = $1 AND ($2::int IS NULL OR id != $2))",
        )
        .bind(card_number)
        .bind(exclude_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    /// Whether any active admin account exists
    pub async fn admin_exists(&self) -> AppResult<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM users WHERE user_type = 'admin' AND status = 'active')",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    /// Search users with filters and pagination
    pub async fn search(&self, query: &UserQuery) -> AppResult<(Vec<UserSummary>, i64)> {
        let page = Page::new(query.page, query.per_page);
        let pattern = query
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| format!("%{}%", s));

        const FILTER: &str = r#"
            ($1::text IS NULL
                OR u.first_name ILIKE $1 OR u.last_name ILIKE $1
                OR (u.first_name || ' ' || u.last_name) ILIKE $1
                OR u.email ILIKE $1 OR u.card_number ILIKE $1)
            AND ($2::text IS NULL OR u.user_type = $2)
            AND ($3::text IS NULL OR u.status = $3)
        "#;

        let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM users u WHERE {}", FILTER))
            .bind(&pattern)
            .bind(query.user_type)
            .bind(query.status)
            .fetch_one(&self.pool)
            .await?;

        let users = sqlx::query_as::<_, UserSummary>(&format!(
            r#"
            SELECT u.id, u.email, u.first_name, u.last_name, u.user_type, u.status, u.card_number,
                   (SELECT COUNT(*) FROM loans l
                    WHERE l.user_id = u.id AND l.status IN {open}) AS open_loans
            FROM users u
            WHERE {filter}
            ORDER BY u.last_name, u.first_name, u.id
            LIMIT $4 OFFSET $5
            "#,
            open = OPEN_LOAN_STATUSES,
            filter = FILTER,
        ))
        .bind(&pattern)
        .bind(query.user_type)
        .bind(query.status)
        .bind(page.per_page)
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await?;

        Ok((users, total))
    }

    /// Create a new user with an already hashed password
    pub async fn create(&self, user: &CreateUser, password_hash: &str, user_type: UserType) -> AppResult<User> {
        sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (email, password_hash, first_name, last_name, user_type,
                               card_number, department, phone)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(user.email.trim())
        .bind(password_hash)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(user_type)
        .bind(&user.card_number)
        .bind(&user.department)
        .bind(&user.phone)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, "Email or card number already in use"))
    }

    /// Update an existing user; absent fields are left unchanged
    pub async fn update(&self, id: i32, user: &UpdateUser) -> AppResult<User> {
        sqlx::query_as::<_, User>(
            r#"
            UPDATE users SET
                email = COALESCE($2, email),
                first_name = COALESCE($3, first_name),
                last_name = COALESCE($4, last_name),
                user_type = COALESCE($5, user_type),
                card_number = COALESCE($6, card_number),
                department = COALESCE($7, department),
                phone = COALESCE($8, phone),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(user.email.as_deref().map(str::trim))
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(user.user_type)
        .bind(&user.card_number)
        .bind(&user.department)
        .bind(&user.phone)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, "Email or card number already in use"))?
        .ok_or_else(|| AppError::NotFound(format!("User with id {} not found", id)))
    }

    /// Update the fields a user may change on their own profile
    pub async fn update_profile(&self, id: i32, profile: &UpdateProfile) -> AppResult<User> {
        sqlx::query_as::<_, User>(
            r#"
            UPDATE users SET
                first_name = COALESCE($2, first_name),
                last_name = COALESCE($3, last_name),
                department = COALESCE($4, department),
                phone = COALESCE($5, phone),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&profile.first_name)
        .bind(&profile.last_name)
        .bind(&profile.department)
        .bind(&profile.phone)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User with id {} not found", id)))
    }

    pub async fn update_password(&self, id: i32, password_hash: &str) -> AppResult<()> {
        sqlx::query("UPDATE users SET password_hash = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(password_hash)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn set_status(&self, id: i32, status: UserStatus) -> AppResult<User> {
        sqlx::query_as::<_, User>(
            "UPDATE users SET status = $2, updated_at = NOW() WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(status)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User with id {} not found", id)))
    }

    pub async fn touch_last_login(&self, id: i32) -> AppResult<()> {
        sqlx::query("UPDATE users SET last_login_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
