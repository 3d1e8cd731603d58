//! Authentication Models
//! Mission: Define user, claim, and session data structures

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// User account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String, // bcrypt hash - never serialize
    pub role: UserRole,
    pub created_at: String,
    pub updated_at: String,
}

/// User roles
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum UserRole {
    #[serde(rename = "customer")]
    Customer, // Browse, order, review
    #[serde(rename = "admin")]
    Admin, // Dashboard and user management
    #[serde(rename = "driver")]
    Driver, // Delivery assignments
}

impl UserRole {
    pub fn as_str(&self) -> &str {
        match self {
            UserRole::Customer => "customer",
            UserRole::Admin => "admin",
            UserRole::Driver => "driver",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "customer" => Some(UserRole::Customer),
            "admin" => Some(UserRole::Admin),
            "driver" => Some(UserRole::Driver),
            _ => None,
        }
    }
}

/// Access-token claims. Verified statelessly by signature and expiry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    pub sub: String, // subject (user id)
    pub role: UserRole,
    pub exp: usize, // expiration timestamp
}

/// Refresh-token claims. The `jti` makes every issued token distinct so
/// rotation always invalidates the previous value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshClaims {
    pub sub: String,
    pub jti: String,
    pub exp: usize,
}

/// Server-side mirror of an authenticated identity. Built once per
/// login/refresh and replaced whole - downstream code never mutates it.
#[derive(Debug, Clone, Serialize)]
pub struct SessionContext {
    pub user_id: Uuid,
    pub email: String,
    pub username: String,
    pub role: UserRole,
    pub authenticated: bool,
    pub established_at: String,
}

impl SessionContext {
    pub fn for_user(user: &User) -> Self {
        Self {
            user_id: user.id,
            email: user.email.clone(),
            username: user.username.clone(),
            role: user.role.clone(),
            authenticated: true,
            established_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Registration request body. Fields default to empty so a missing field
/// surfaces as a validation error, not a deserialization rejection.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub username: String,
}

/// Login request body
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Refresh request body
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Logout request body (token optional - logout never fails)
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogoutRequest {
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// Forgot-password request body
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

/// Reset-password request body
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    pub token: String,
    pub new_password: String,
}

/// User payload on auth responses (sanitized)
#[derive(Debug, Serialize)]
pub struct UserPublic {
    pub id: String,
    pub email: String,
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<UserRole>,
}

impl UserPublic {
    /// Registration shape: id, email, username.
    pub fn from_user(user: &User) -> Self {
        Self {
            id: user.id.to_string(),
            email: user.email.clone(),
            username: user.username.clone(),
            role: None,
        }
    }

    /// Login shape: registration shape plus role.
    pub fn with_role(user: &User) -> Self {
        Self {
            role: Some(user.role.clone()),
            ..Self::from_user(user)
        }
    }
}

/// Register/login response data
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthData {
    pub user: UserPublic,
    pub token: String,
    pub refresh_token: String,
}

/// Refresh response data
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub token: String,
    pub refresh_token: String,
}

/// Admin role-change request body
#[derive(Debug, Deserialize)]
pub struct UpdateRoleRequest {
    pub email: String,
    pub role: UserRole,
}
