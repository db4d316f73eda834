//! Authentication service: passwords, token issuance and refresh sessions

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};

use crate::{
    config::AuthConfig,
    error::{AppError, AppResult},
    models::user::{
        ChangePassword, CreateUser, LoginRequest, RegisterUser, TokenResponse, TokenType, UpdateProfile, User,
        UserClaims, UserStatus, UserType,
    },
    repository::Repository,
    services::redis::RedisService,
};

/// Hash a password using Argon2
pub fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AppError::Internal(format!("Failed to hash password: {}", e)))?;
    Ok(hash.to_string())
}

/// Check a password against a stored Argon2 hash
pub fn verify_password(hash: &str, password: &str) -> AppResult<bool> {
    let parsed_hash =
        PasswordHash::new(hash).map_err(|_| AppError::Internal("Invalid password hash".to_string()))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

#[derive(Clone)]
pub struct AuthService {
    repository: Repository,
    config: AuthConfig,
    redis: RedisService,
}

impl AuthService {
    pub fn new(repository: Repository, config: AuthConfig, redis: RedisService) -> Self {
        Self {
            repository,
            config,
            redis,
        }
    }

    pub fn jwt_secret(&self) -> &str {
        &self.config.jwt_secret
    }

    /// Self-service registration; new accounts are students
    pub async fn register(&self, request: RegisterUser) -> AppResult<User> {
        if !self.config.allow_registration {
            return Err(AppError::Authorization("Self-registration is disabled".to_string()));
        }

        if self.repository.users.email_exists(&request.email, None).await? {
            return Err(AppError::Conflict("Email already registered".to_string()));
        }
        if let Some(ref card) = request.card_number {
            if self.repository.users.card_number_exists(card, None).await? {
                return Err(AppError::Conflict("Card number already in use".to_string()));
            }
        }

        let password_hash = hash_password(&request.password)?;
        let user = CreateUser {
            email: request.email,
            password: request.password,
            first_name: request.first_name,
            last_name: request.last_name,
            user_type: None,
            card_number: request.card_number,
            department: request.department,
            phone: request.phone,
        };

        let user = self
            .repository
            .users
            .create(&user, &password_hash, UserType::Student)
            .await?;

        tracing::info!(user_id = user.id, "User registered");
        Ok(user)
    }

    /// Check credentials and open a session
    pub async fn login(&self, request: &LoginRequest) -> AppResult<TokenResponse> {
        let user = self
            .repository
            .users
            .get_by_email(request.email.trim())
            .await?
            .ok_or_else(|| AppError::Authentication("Invalid email or password".to_string()))?;

        if !verify_password(&user.password_hash, &request.password)? {
            tracing::info!(user_id = user.id, "Login failed: wrong password");
            return Err(AppError::Authentication("Invalid email or password".to_string()));
        }

        Self::ensure_active(&user)?;

        self.repository.users.touch_last_login(user.id).await?;
        let user = self.repository.users.get_by_id(user.id).await?;

        tracing::info!(user_id = user.id, user_type = %user.user_type, "User logged in");
        self.issue_tokens(user).await
    }

    /// Exchange a refresh token for a new pair; the old session is consumed
    pub async fn refresh(&self, refresh_token: &str) -> AppResult<TokenResponse> {
        let claims = UserClaims::from_token(refresh_token, &self.config.jwt_secret, TokenType::Refresh)?;

        let session_user = self.redis.take_session(&claims.jti).await?;
        if session_user != Some(claims.user_id) {
            tracing::warn!(user_id = claims.user_id, "Refresh with revoked or unknown session");
            return Err(AppError::Authentication("Session has been revoked".to_string()));
        }

        let user = self.repository.users.get_by_id(claims.user_id).await?;
        Self::ensure_active(&user)?;

        self.issue_tokens(user).await
    }

    /// Revoke the session of a refresh token
    pub async fn logout(&self, refresh_token: &str) -> AppResult<()> {
        let claims = UserClaims::from_token(refresh_token, &self.config.jwt_secret, TokenType::Refresh)?;
        self.redis.revoke_session(&claims.jti).await?;
        tracing::info!(user_id = claims.user_id, "User logged out");
        Ok(())
    }

    pub async fn me(&self, user_id: i32) -> AppResult<User> {
        self.repository.users.get_by_id(user_id).await
    }

    pub async fn update_profile(&self, user_id: i32, profile: UpdateProfile) -> AppResult<User> {
        self.repository.users.update_profile(user_id, &profile).await
    }

    /// Change own password and sign out every session
    pub async fn change_password(&self, user_id: i32, request: ChangePassword) -> AppResult<()> {
        let user = self.repository.users.get_by_id(user_id).await?;

        if !verify_password(&user.password_hash, &request.current_password)? {
            return Err(AppError::Authentication("Current password is incorrect".to_string()));
        }

        let password_hash = hash_password(&request.new_password)?;
        self.repository.users.update_password(user_id, &password_hash).await?;

        let revoked = self.redis.revoke_user_sessions(user_id).await?;
        tracing::info!(user_id, revoked, "Password changed, sessions revoked");
        Ok(())
    }

    /// Create the configured admin account when no admin exists yet
    pub async fn bootstrap_admin(&self) -> AppResult<()> {
        let (Some(email), Some(password)) = (
            self.config.bootstrap_admin_email.as_deref(),
            self.config.bootstrap_admin_password.as_deref(),
        ) else {
            return Ok(());
        };

        if self.repository.users.admin_exists().await? {
            return Ok(());
        }

        if self.repository.users.email_exists(email, None).await? {
            tracing::warn!(email, "Bootstrap admin email belongs to an existing user, skipping");
            return Ok(());
        }

        let admin = CreateUser {
            email: email.to_string(),
            password: password.to_string(),
            first_name: "Library".to_string(),
            last_name: "Administrator".to_string(),
            user_type: Some(UserType::Admin),
            card_number: None,
            department: None,
            phone: None,
        };

        let password_hash = hash_password(password)?;
        let user = self
            .repository
            .users
            .create(&admin, &password_hash, UserType::Admin)
            .await?;

        tracing::info!(user_id = user.id, email, "Bootstrap admin account created");
        Ok(())
    }

    fn ensure_active(user: &User) -> AppResult<()> {
        match user.status {
            UserStatus::Active => Ok(()),
            UserStatus::Suspended => Err(AppError::Authentication("Account is suspended".to_string())),
            UserStatus::Inactive => Err(AppError::Authentication("Invalid email or password".to_string())),
        }
    }

    async fn issue_tokens(&self, user: User) -> AppResult<TokenResponse> {
        let access_lifetime = self.config.access_token_minutes as i64 * 60;
        let refresh_lifetime = self.config.refresh_token_days as i64 * 24 * 3600;

        let access = UserClaims::new(&user, TokenType::Access, access_lifetime);
        let refresh = UserClaims::new(&user, TokenType::Refresh, refresh_lifetime);

        let access_token = access
            .create_token(&self.config.jwt_secret)
            .map_err(|e| AppError::Internal(format!("Failed to create token: {}", e)))?;
        let refresh_token = refresh
            .create_token(&self.config.jwt_secret)
            .map_err(|e| AppError::Internal(format!("Failed to create token: {}", e)))?;

        self.redis
            .store_session(user.id, &refresh.jti, refresh_lifetime as u64)
            .await?;

        Ok(TokenResponse {
            access_token,
            refresh_token,
            token_type: "Bearer".to_string(),
            expires_in: access_lifetime,
            user,
        })
    }
}
