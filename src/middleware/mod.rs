//! Security middleware chain.
//!
//! Per-request gatekeeping that wraps every handler:
//! - Rate limiting per IP (general tier + stricter auth tier)
//! - Progressive delay for bursty clients
//! - Input sanitization and injection-pattern rejection
//! - Request logging with latency tracking
//!
//! Ordering matters: the limiters run first (cheapest, and floods must be
//! rejected before any parsing cost), then sanitation, then the handler.

pub mod logging;
pub mod rate_limit;
pub mod sanitize;
pub mod speed_limit;

pub use logging::request_logging;
pub use rate_limit::{rate_limit_middleware, RateLimitConfig, RateLimitLayer};
pub use sanitize::sanitize_request;
pub use speed_limit::{speed_limit_middleware, SpeedLimitConfig, SpeedLimitLayer};

use axum::{body::Body, extract::ConnectInfo, http::Request};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

/// Client identity for the limiters. Reads the connect info the server
/// attaches; tests exercising a bare router fall back to localhost.
pub fn client_ip(request: &Request<Body>) -> IpAddr {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
}
