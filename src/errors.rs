//! Error Taxonomy
//! Mission: Classify every failure into a stable, client-safe response

use crate::response::ApiResponse;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

/// Every failure the auth core can surface. Each variant maps to one stable
/// status/message pair; only `Internal` hides its cause (logged server-side,
/// generic message client-side).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// Malformed input: missing fields, bad email shape, short password.
    Validation(String),
    EmailAlreadyExists,
    InvalidCredentials,
    InvalidRefreshToken,
    UserNotFound,
    /// Caller lacks the role a route requires.
    Forbidden,
    RateLimited { retry_after_secs: u64 },
    /// Injection-pattern match in a sanitized field.
    SuspiciousInput,
    Internal,
}

impl AuthError {
    fn status(&self) -> StatusCode {
        match self {
            AuthError::Validation(_) => StatusCode::BAD_REQUEST,
            AuthError::EmailAlreadyExists => StatusCode::BAD_REQUEST,
            AuthError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            AuthError::InvalidRefreshToken => StatusCode::UNAUTHORIZED,
            AuthError::UserNotFound => StatusCode::NOT_FOUND,
            AuthError::Forbidden => StatusCode::FORBIDDEN,
            AuthError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            AuthError::SuspiciousInput => StatusCode::BAD_REQUEST,
            AuthError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn message(&self) -> String {
        match self {
            AuthError::Validation(msg) => msg.clone(),
            AuthError::EmailAlreadyExists => "Email already registered".to_string(),
            AuthError::InvalidCredentials => "Invalid email or password".to_string(),
            AuthError::InvalidRefreshToken => "Invalid or expired refresh token".to_string(),
            AuthError::UserNotFound => "User not found".to_string(),
            AuthError::Forbidden => "Insufficient permissions".to_string(),
            AuthError::RateLimited { .. } => {
                "Too many requests, please try again later".to_string()
            }
            AuthError::SuspiciousInput => "Invalid input".to_string(),
            AuthError::Internal => "Internal server error".to_string(),
        }
    }
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for AuthError {}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(ApiResponse::error(self.message()));

        if let AuthError::RateLimited { retry_after_secs } = self {
            return (
                status,
                [("Retry-After", retry_after_secs.to_string())],
                body,
            )
                .into_response();
        }

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            AuthError::EmailAlreadyExists.status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AuthError::InvalidCredentials.status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AuthError::InvalidRefreshToken.status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AuthError::RateLimited {
                retry_after_secs: 60
            }
            .status(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(AuthError::SuspiciousInput.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            AuthError::Internal.status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_internal_error_is_generic() {
        // The internal variant must never leak a cause.
        assert_eq!(AuthError::Internal.message(), "Internal server error");
    }

    #[test]
    fn test_rate_limited_sets_retry_after() {
        let resp = AuthError::RateLimited {
            retry_after_secs: 42,
        }
        .into_response();
        assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(resp.headers().get("Retry-After").unwrap(), "42");
    }
}
