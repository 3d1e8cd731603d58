//! Authentication API Endpoints
//! Mission: Expose the auth lifecycle and admin user management over REST

use crate::auth::{
    middleware::extract_claims,
    models::{
        AuthData, ForgotPasswordRequest, LoginRequest, LogoutRequest, RefreshRequest,
        RegisterRequest, ResetPasswordRequest, TokenPair, UpdateRoleRequest, UserPublic,
        UserRole,
    },
    service::AuthService,
    sessions::SessionStore,
    store::CredentialStore,
};
use crate::errors::AuthError;
use crate::response::ApiResponse;
use axum::{
    extract::{Request, State},
    http::StatusCode,
    Json,
};
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

lazy_static! {
    static ref EMAIL_RE: Regex =
        Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").unwrap();
}

/// Shared auth state
#[derive(Clone)]
pub struct AuthState {
    pub auth: Arc<AuthService>,
    pub store: Arc<CredentialStore>,
    pub sessions: Arc<SessionStore>,
}

/// Register endpoint - POST /auth/register
pub async fn register(
    State(state): State<AuthState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<ApiResponse<AuthData>>), AuthError> {
    require_fields(&[
        (&payload.email, "email"),
        (&payload.password, "password"),
        (&payload.username, "username"),
    ])?;
    validate_email(&payload.email)?;
    validate_password(&payload.password)?;

    let outcome = state
        .auth
        .register(&payload.email, &payload.password, &payload.username)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(
            "User registered successfully",
            AuthData {
                user: UserPublic::from_user(&outcome.user),
                token: outcome.access_token,
                refresh_token: outcome.refresh_token,
            },
        )),
    ))
}

/// Login endpoint - POST /auth/login
pub async fn login(
    State(state): State<AuthState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<ApiResponse<AuthData>>, AuthError> {
    require_fields(&[(&payload.email, "email"), (&payload.password, "password")])?;

    let outcome = state.auth.login(&payload.email, &payload.password).await?;

    Ok(Json(ApiResponse::success(
        "Login successful",
        AuthData {
            user: UserPublic::with_role(&outcome.user),
            token: outcome.access_token,
            refresh_token: outcome.refresh_token,
        },
    )))
}

/// Refresh endpoint - POST /auth/refresh-token
pub async fn refresh_token(
    State(state): State<AuthState>,
    Json(payload): Json<RefreshRequest>,
) -> Result<Json<ApiResponse<TokenPair>>, AuthError> {
    require_fields(&[(&payload.refresh_token, "refreshToken")])?;

    let (token, refresh_token) = state.auth.refresh(&payload.refresh_token).await?;

    Ok(Json(ApiResponse::success(
        "Token refreshed",
        TokenPair {
            token,
            refresh_token,
        },
    )))
}

/// Logout endpoint - POST /auth/logout
///
/// Always 200: a missing or already-deleted token is not a client-visible
/// failure.
pub async fn logout(
    State(state): State<AuthState>,
    payload: Option<Json<LogoutRequest>>,
) -> Json<ApiResponse<()>> {
    let token = payload.and_then(|Json(p)| p.refresh_token);
    state.auth.logout(token.as_deref()).await;

    Json(ApiResponse::message("Logged out"))
}

/// Forgot-password endpoint - POST /auth/forgot-password
///
/// The reply never depends on whether the account exists.
pub async fn forgot_password(
    State(state): State<AuthState>,
    Json(payload): Json<ForgotPasswordRequest>,
) -> Result<Json<ApiResponse<()>>, AuthError> {
    require_fields(&[(&payload.email, "email")])?;

    state.auth.forgot_password(&payload.email).await;

    Ok(Json(ApiResponse::message(
        "If an account exists for that email, password reset instructions have been sent",
    )))
}

/// Reset-password endpoint - POST /auth/reset-password
pub async fn reset_password(
    State(state): State<AuthState>,
    Json(payload): Json<ResetPasswordRequest>,
) -> Result<Json<ApiResponse<()>>, AuthError> {
    require_fields(&[(&payload.token, "token"), (&payload.new_password, "newPassword")])?;

    state
        .auth
        .reset_password(&payload.token, &payload.new_password)
        .await;

    Ok(Json(ApiResponse::message(
        "If the reset token is valid, the password has been updated",
    )))
}

/// Current identity - GET /api/auth/me
///
/// Prefers the server-side session mirror; falls back to the store when the
/// session was lost (e.g. a restart) but the bearer token is still good.
pub async fn get_current_user(
    State(state): State<AuthState>,
    req: Request,
) -> Result<Json<ApiResponse<Value>>, AuthError> {
    let claims = extract_claims(&req).ok_or(AuthError::Internal)?;
    let user_id = Uuid::parse_str(&claims.sub).map_err(|_| AuthError::Internal)?;

    if let Some(session) = state.sessions.get(&user_id) {
        return Ok(Json(ApiResponse::success(
            "Authenticated",
            json!({ "user": session }),
        )));
    }

    let user = state
        .store
        .find_user_by_id(&user_id)
        .map_err(|_| AuthError::Internal)?
        .ok_or(AuthError::UserNotFound)?;

    Ok(Json(ApiResponse::success(
        "Authenticated",
        json!({ "user": UserPublic::with_role(&user) }),
    )))
}

/// List all users - GET /api/admin/users (Admin only)
pub async fn list_users(
    State(state): State<AuthState>,
    req: Request,
) -> Result<Json<ApiResponse<Vec<UserPublic>>>, AuthError> {
    require_admin(&req)?;

    let users = state.store.list_users().map_err(|_| AuthError::Internal)?;
    let users: Vec<UserPublic> = users.iter().map(UserPublic::with_role).collect();

    Ok(Json(ApiResponse::success("User listing", users)))
}

/// Change a user's role - PUT /api/admin/users/role (Admin only)
pub async fn update_user_role(
    State(state): State<AuthState>,
    req: Request,
) -> Result<Json<ApiResponse<()>>, AuthError> {
    require_admin(&req)?;

    let payload: UpdateRoleRequest = read_json_body(req).await?;
    require_fields(&[(&payload.email, "email")])?;

    let updated = state
        .store
        .update_user_role(
            &crate::auth::service::normalize_email(&payload.email),
            payload.role.clone(),
        )
        .map_err(|_| AuthError::Internal)?;

    if !updated {
        return Err(AuthError::UserNotFound);
    }

    info!(email = %payload.email, role = payload.role.as_str(), "Role updated by admin");

    Ok(Json(ApiResponse::message("Role updated")))
}

fn require_admin(req: &Request) -> Result<(), AuthError> {
    let claims = extract_claims(req).ok_or(AuthError::Internal)?;
    if claims.role != UserRole::Admin {
        return Err(AuthError::Forbidden);
    }
    Ok(())
}

/// Handlers that also need the raw request (for claims) deserialize their
/// body manually; the sanitizer has already scrubbed it.
async fn read_json_body<T: serde::de::DeserializeOwned>(req: Request) -> Result<T, AuthError> {
    let bytes = axum::body::to_bytes(req.into_body(), 64 * 1024)
        .await
        .map_err(|_| AuthError::Validation("Request body too large".to_string()))?;
    serde_json::from_slice(&bytes)
        .map_err(|_| AuthError::Validation("Malformed JSON body".to_string()))
}

fn require_fields(fields: &[(&str, &str)]) -> Result<(), AuthError> {
    for (value, name) in fields {
        if value.trim().is_empty() {
            return Err(AuthError::Validation(format!("{name} is required")));
        }
    }
    Ok(())
}

fn validate_email(email: &str) -> Result<(), AuthError> {
    if !EMAIL_RE.is_match(email.trim()) {
        return Err(AuthError::Validation("Invalid email address".to_string()));
    }
    Ok(())
}

fn validate_password(password: &str) -> Result<(), AuthError> {
    if password.len() < 8 {
        return Err(AuthError::Validation(
            "Password must be at least 8 characters".to_string(),
        ));
    }
    Ok(())
}
