//! User model, JWT claims and role guards

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::error::AppError;

text_enum! {
    /// User role; drives loan limits, loan period, reservation priority and permissions
    pub enum UserType {
        Student => "student",
        Professor => "professor",
        Librarian => "librarian",
        Admin => "admin",
        Staff => "staff",
    }
}

impl UserType {
    /// Circulation desk: may read users and check materials in/out
    pub fn is_staff(&self) -> bool {
        matches!(self, UserType::Staff | UserType::Librarian | UserType::Admin)
    }

    /// May manage the catalog, waive fines and cancel loans
    pub fn is_librarian(&self) -> bool {
        matches!(self, UserType::Librarian | UserType::Admin)
    }

    pub fn is_patron(&self) -> bool {
        matches!(self, UserType::Student | UserType::Professor)
    }
}

text_enum! {
    pub enum UserStatus {
        Active => "active",
        Suspended => "suspended",
        Inactive => "inactive",
    }
}

/// Full user model from database
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct User {
    pub id: i32,
    pub email: String,
    /// Argon2 hash
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub user_type: UserType,
    pub status: UserStatus,
    pub card_number: Option<String>,
    pub department: Option<String>,
    pub phone: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
}

impl User {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// Short user representation for lists
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct UserSummary {
    pub id: i32,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub user_type: UserType,
    pub status: UserStatus,
    pub card_number: Option<String>,
    /// Number of open loans
    pub open_loans: i64,
}

/// User query parameters
#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct UserQuery {
    /// Matches name, email or card number
    pub search: Option<String>,
    pub user_type: Option<UserType>,
    pub status: Option<UserStatus>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

/// Self-service registration request
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct RegisterUser {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,
    #[validate(length(min = 1, max = 100))]
    pub first_name: String,
    #[validate(length(min = 1, max = 100))]
    pub last_name: String,
    pub card_number: Option<String>,
    pub department: Option<String>,
    pub phone: Option<String>,
}

/// Create user request (staff)
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateUser {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,
    #[validate(length(min = 1, max = 100))]
    pub first_name: String,
    #[validate(length(min = 1, max = 100))]
    pub last_name: String,
    /// Defaults to student
    pub user_type: Option<UserType>,
    pub card_number: Option<String>,
    pub department: Option<String>,
    pub phone: Option<String>,
}

/// Update user request (staff)
#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateUser {
    #[validate(email(message = "Invalid email format"))]
    pub email: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub first_name: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub last_name: Option<String>,
    pub user_type: Option<UserType>,
    pub card_number: Option<String>,
    pub department: Option<String>,
    pub phone: Option<String>,
}

/// Update own profile request
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateProfile {
    #[validate(length(min = 1, max = 100))]
    pub first_name: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub last_name: Option<String>,
    pub department: Option<String>,
    pub phone: Option<String>,
}

/// Change own password request
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ChangePassword {
    pub current_password: String,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub new_password: String,
}

/// Update account status request
#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateStatus {
    pub status: UserStatus,
}

/// Login request
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct LoginRequest {
    #[validate(length(min = 1, message = "Email is required"))]
    pub email: String,
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

/// Refresh or logout request
#[derive(Debug, Deserialize, ToSchema)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Issued token pair
#[derive(Debug, Serialize, ToSchema)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    /// Always "Bearer"
    pub token_type: String,
    /// Access token lifetime in seconds
    pub expires_in: i64,
    pub user: User,
}

text_enum! {
    pub enum TokenType {
        Access => "access",
        Refresh => "refresh",
    }
}

/// JWT Claims for authenticated users
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserClaims {
    pub sub: String,
    pub user_id: i32,
    pub user_type: UserType,
    pub token_type: TokenType,
    /// Token id; refresh sessions are keyed on it
    pub jti: String,
    pub exp: i64,
    pub iat: i64,
}

impl UserClaims {
    pub fn new(user: &User, token_type: TokenType, lifetime_secs: i64) -> Self {
        let now = Utc::now().timestamp();
        Self {
            sub: user.email.clone(),
            user_id: user.id,
            user_type: user.user_type,
            token_type,
            jti: uuid::Uuid::new_v4().to_string(),
            exp: now + lifetime_secs,
            iat: now,
        }
    }

    /// Create a new JWT token
    pub fn create_token(&self, secret: &str) -> Result<String, jsonwebtoken::errors::Error> {
        use jsonwebtoken::{encode, EncodingKey, Header};
        encode(
            &Header::default(),
            self,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
    }

    /// Parse and verify a JWT token of the expected type
    pub fn from_token(token: &str, secret: &str, expected: TokenType) -> Result<Self, AppError> {
        use jsonwebtoken::{decode, DecodingKey, Validation};
        let claims = decode::<Self>(
            token,
            &DecodingKey::from_secret(secret.as_bytes()),
            &Validation::default(),
        )
        .map_err(|e| AppError::Authentication(format!("Invalid token: {}", e)))?
        .claims;

        if claims.token_type != expected {
            return Err(AppError::Authentication(format!(
                "Expected {} token, got {} token",
                expected, claims.token_type
            )));
        }
        Ok(claims)
    }

    // Authorization checks
    pub fn require_staff(&self) -> Result<(), AppError> {
        if self.user_type.is_staff() {
            Ok(())
        } else {
            Err(AppError::Authorization("Library staff privileges required".to_string()))
        }
    }

    pub fn require_librarian(&self) -> Result<(), AppError> {
        if self.user_type.is_librarian() {
            Ok(())
        } else {
            Err(AppError::Authorization("Librarian privileges required".to_string()))
        }
    }

    pub fn is_admin(&self) -> bool {
        self.user_type == UserType::Admin
    }

    pub fn require_admin(&self) -> Result<(), AppError> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(AppError::Authorization("Administrator privileges required".to_string()))
        }
    }

    /// The user themself, or anyone from the circulation staff
    pub fn require_self_or_staff(&self, user_id: i32) -> Result<(), AppError> {
        if self.user_id == user_id || self.user_type.is_staff() {
            Ok(())
        } else {
            Err(AppError::Authorization(
                "Cannot access another user's records".to_string(),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret";

    fn user(user_type: UserType) -> User {
        User {
            id: 7,
            email: "ada@university.edu".to_string(),
            password_hash: String::new(),
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            user_type,
            status: UserStatus::Active,
            card_number: None,
            department: None,
            phone: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            last_login_at: None,
        }
    }

    #[test]
    fn test_token_round_trip() {
        let claims = UserClaims::new(&user(UserType::Professor), TokenType::Access, 600);
        let token = claims.create_token(SECRET).unwrap();

        let parsed = UserClaims::from_token(&token, SECRET, TokenType::Access).unwrap();
        assert_eq!(parsed.user_id, 7);
        assert_eq!(parsed.user_type, UserType::Professor);
        assert_eq!(parsed.jti, claims.jti);
    }

    #[test]
    fn test_refresh_token_rejected_as_access() {
        let claims = UserClaims::new(&user(UserType::Student), TokenType::Refresh, 600);
        let token = claims.create_token(SECRET).unwrap();

        let err = UserClaims::from_token(&token, SECRET, TokenType::Access).unwrap_err();
        assert!(matches!(err, AppError::Authentication(_)));
    }

    #[test]
    fn test_expired_token_rejected() {
        let claims = UserClaims::new(&user(UserType::Student), TokenType::Access, -3600);
        let token = claims.create_token(SECRET).unwrap();
        assert!(UserClaims::from_token(&token, SECRET, TokenType::Access).is_err());
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let claims = UserClaims::new(&user(UserType::Student), TokenType::Access, 600);
        let token = claims.create_token(SECRET).unwrap();
        assert!(UserClaims::from_token(&token, "other", TokenType::Access).is_err());
    }

    #[test]
    fn test_role_guards() {
        let student = UserClaims::new(&user(UserType::Student), TokenType::Access, 600);
        assert!(student.require_staff().is_err());
        assert!(student.require_librarian().is_err());
        assert!(student.require_admin().is_err());
        assert!(student.require_self_or_staff(7).is_ok());
        assert!(student.require_self_or_staff(8).is_err());

        let staff = UserClaims::new(&user(UserType::Staff), TokenType::Access, 600);
        assert!(staff.require_staff().is_ok());
        assert!(staff.require_librarian().is_err());
        assert!(staff.require_self_or_staff(8).is_ok());

        let librarian = UserClaims::new(&user(UserType::Librarian), TokenType::Access, 600);
        assert!(librarian.require_librarian().is_ok());
        assert!(librarian.require_admin().is_err());

        let admin = UserClaims::new(&user(UserType::Admin), TokenType::Access, 600);
        assert!(admin.require_staff().is_ok());
        assert!(admin.require_librarian().is_ok());
        assert!(admin.require_admin().is_ok());
    }

    #[test]
    fn test_user_type_parsing() {
        assert_eq!("Professor".parse::<UserType>().unwrap(), UserType::Professor);
        assert!("janitor".parse::<UserType>().is_err());
        assert_eq!(UserType::ALL.len(), 5);
        assert_eq!(
            serde_json::to_string(&UserType::Librarian).unwrap(),
            "\"librarian\""
        );
    }

    #[test]
    fn test_password_hash_not_serialized() {
        let mut u = user(UserType::Student);
        u.password_hash = "$argon2id$secret".to_string();
        let json = serde_json::to_value(&u).unwrap();
        assert!(json.get("password_hash").is_none());
        assert_eq!(json["user_type"], "student");
    }
}
