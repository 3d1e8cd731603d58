//! Router Assembly
//! Mission: Wire routes, state, and the security middleware chain in order

use crate::auth::{api as auth_api, auth_middleware, AuthState, TokenIssuer};
use crate::middleware::{
    rate_limit_middleware, request_logging, sanitize_request, speed_limit_middleware,
    RateLimitLayer, SpeedLimitLayer,
};
use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer};

/// Overall per-request budget; a stuck request fails instead of hanging.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Assemble the full application router.
///
/// Layer order (outermost first): CORS → logging → timeout → general rate
/// limit → progressive delay → per-route guards → sanitizer → handler.
/// Every limiter runs before the sanitizer so a flood is rejected before
/// any body parsing; the auth routes carry the stricter auth-tier limiter
/// on top of the general one.
pub fn build_router(
    auth_state: AuthState,
    tokens: Arc<TokenIssuer>,
    general_limiter: RateLimitLayer,
    auth_limiter: RateLimitLayer,
    speed_limiter: SpeedLimitLayer,
) -> Router {
    let auth_routes = Router::new()
        .route("/auth/register", post(auth_api::register))
        .route("/auth/login", post(auth_api::login))
        .route("/auth/refresh-token", post(auth_api::refresh_token))
        .route("/auth/logout", post(auth_api::logout))
        .route("/auth/forgot-password", post(auth_api::forgot_password))
        .route("/auth/reset-password", post(auth_api::reset_password))
        .route_layer(middleware::from_fn(sanitize_request))
        .route_layer(middleware::from_fn_with_state(
            auth_limiter,
            rate_limit_middleware,
        ))
        .with_state(auth_state.clone());

    // Bearer-protected API surface. The gate sits outside the sanitizer:
    // an unauthenticated request is rejected before its body is touched.
    let protected_routes = Router::new()
        .route("/api/auth/me", get(auth_api::get_current_user))
        .route("/api/admin/users", get(auth_api::list_users))
        .route("/api/admin/users/role", put(auth_api::update_user_role))
        .route_layer(middleware::from_fn(sanitize_request))
        .route_layer(middleware::from_fn_with_state(tokens, auth_middleware))
        .with_state(auth_state);

    let public_routes = Router::new()
        .route("/health", get(health_check))
        .route_layer(middleware::from_fn(sanitize_request));

    Router::new()
        .merge(public_routes)
        .merge(auth_routes)
        .merge(protected_routes)
        .layer(middleware::from_fn_with_state(
            speed_limiter,
            speed_limit_middleware,
        ))
        .layer(middleware::from_fn_with_state(
            general_limiter,
            rate_limit_middleware,
        ))
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .layer(middleware::from_fn(request_logging))
        .layer(CorsLayer::permissive())
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "🍜 Plateful Operational"
}
