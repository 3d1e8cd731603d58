//! Bearer Authentication Middleware
//! Mission: Protect API endpoints with access-token validation

use crate::auth::models::AccessClaims;
use crate::auth::tokens::TokenIssuer;
use crate::response::ApiResponse;
use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;

/// Validates `Authorization: Bearer <token>` and stashes the claims in the
/// request extensions for handlers. A 401 here tells the client to try the
/// refresh endpoint, and failing that, to re-authenticate.
pub async fn auth_middleware(
    State(tokens): State<Arc<TokenIssuer>>,
    mut req: Request,
    next: Next,
) -> Result<Response, BearerError> {
    let token = req
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(|t| t.to_string())
        .ok_or(BearerError::MissingToken)?;

    let claims = tokens
        .verify_access_token(&token)
        .map_err(|_| BearerError::InvalidToken)?;

    req.extensions_mut().insert(claims);

    Ok(next.run(req).await)
}

/// Extract claims from request (use after auth middleware)
pub fn extract_claims(req: &Request) -> Option<&AccessClaims> {
    req.extensions().get::<AccessClaims>()
}

/// Bearer gate errors
#[derive(Debug)]
pub enum BearerError {
    MissingToken,
    InvalidToken,
}

impl IntoResponse for BearerError {
    fn into_response(self) -> Response {
        let message = match self {
            BearerError::MissingToken => "Missing authorization token",
            BearerError::InvalidToken => "Invalid or expired token",
        };

        (
            StatusCode::UNAUTHORIZED,
            Json(ApiResponse::error(message)),
        )
            .into_response()
    }
}
