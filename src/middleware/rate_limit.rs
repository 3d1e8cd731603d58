//! Rate limiting middleware.
//!
//! Fixed-window request counting per client IP. Two tiers share the
//! implementation: a general cap for the whole API and a much stricter cap
//! for the authentication endpoints, which are brute-force targets.

use crate::errors::AuthError;
use crate::middleware::client_ip;
use axum::{
    body::Body,
    http::{HeaderValue, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::warn;

/// Configuration for rate limiting.
#[derive(Clone)]
pub struct RateLimitConfig {
    /// Maximum requests per window.
    pub max_requests: u32,
    /// Window duration.
    pub window: Duration,
}

impl RateLimitConfig {
    /// Whole-API tier: 100 requests per 15 minutes.
    pub fn general() -> Self {
        Self {
            max_requests: 100,
            window: Duration::from_secs(15 * 60),
        }
    }

    /// Auth tier: 5 requests per 15 minutes.
    pub fn auth() -> Self {
        Self {
            max_requests: 5,
            window: Duration::from_secs(15 * 60),
        }
    }
}

/// Rate limiter state tracking requests per IP.
#[derive(Clone)]
pub struct RateLimitLayer {
    config: RateLimitConfig,
    state: Arc<Mutex<HashMap<IpAddr, RateLimitEntry>>>,
}

struct RateLimitEntry {
    count: u32,
    window_start: Instant,
}

impl RateLimitLayer {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            state: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Count this request and decide. Increment-under-lock, so concurrent
    /// requests for one client never undercount.
    fn check(&self, ip: IpAddr) -> RateLimitResult {
        let mut state = self.state.lock();
        let now = Instant::now();

        let entry = state.entry(ip).or_insert(RateLimitEntry {
            count: 0,
            window_start: now,
        });

        // Reset window if expired
        if now.duration_since(entry.window_start) >= self.config.window {
            entry.count = 0;
            entry.window_start = now;
        }

        entry.count += 1;

        let remaining = self.config.max_requests.saturating_sub(entry.count);
        let reset_at = entry.window_start + self.config.window;

        if entry.count > self.config.max_requests {
            RateLimitResult::Exceeded {
                retry_after: reset_at.duration_since(now),
            }
        } else {
            RateLimitResult::Allowed { remaining }
        }
    }

    /// Periodic cleanup of old entries (call from a background task).
    pub fn cleanup(&self) {
        let mut state = self.state.lock();
        let now = Instant::now();
        let window = self.config.window;

        state.retain(|_, entry| now.duration_since(entry.window_start) < window * 2);
    }

    pub fn limit(&self) -> u32 {
        self.config.max_requests
    }
}

enum RateLimitResult {
    Allowed { remaining: u32 },
    Exceeded { retry_after: Duration },
}

/// Rate limiting middleware function. Allowed responses carry the quota
/// headers; rejections are immediate and never reach the handler.
pub async fn rate_limit_middleware(
    axum::extract::State(limiter): axum::extract::State<RateLimitLayer>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let ip = client_ip(&request);

    match limiter.check(ip) {
        RateLimitResult::Allowed { remaining } => {
            let mut response = next.run(request).await;

            let headers = response.headers_mut();
            if let Ok(v) = HeaderValue::from_str(&limiter.limit().to_string()) {
                headers.insert("X-RateLimit-Limit", v);
            }
            if let Ok(v) = HeaderValue::from_str(&remaining.to_string()) {
                headers.insert("X-RateLimit-Remaining", v);
            }

            response
        }
        RateLimitResult::Exceeded { retry_after } => {
            warn!(
                ip = %ip,
                retry_after_secs = retry_after.as_secs(),
                "Rate limit exceeded"
            );

            AuthError::RateLimited {
                retry_after_secs: retry_after.as_secs().max(1),
            }
            .into_response()
        }
    }
}
