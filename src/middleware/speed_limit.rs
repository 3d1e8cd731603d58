//! Progressive delay middleware.
//!
//! After a threshold of requests in the window, each further request is
//! slowed by a growing artificial delay instead of being rejected. Throttles
//! automated bursts without fully blocking a legitimate client; the hard
//! rate limiter still applies independently.

use crate::middleware::client_ip;
use axum::{body::Body, http::Request, middleware::Next, response::Response};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

#[derive(Clone)]
pub struct SpeedLimitConfig {
    /// Requests in the window before delays start.
    pub delay_after: u32,
    /// Added per request over the threshold.
    pub base_delay: Duration,
    /// Upper bound on the injected delay.
    pub max_delay: Duration,
    /// Window duration.
    pub window: Duration,
}

impl Default for SpeedLimitConfig {
    fn default() -> Self {
        Self {
            delay_after: 5,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(20),
            window: Duration::from_secs(15 * 60),
        }
    }
}

#[derive(Clone)]
pub struct SpeedLimitLayer {
    config: SpeedLimitConfig,
    state: Arc<Mutex<HashMap<IpAddr, SpeedLimitEntry>>>,
}

struct SpeedLimitEntry {
    count: u32,
    window_start: Instant,
}

impl SpeedLimitLayer {
    pub fn new(config: SpeedLimitConfig) -> Self {
        Self {
            config,
            state: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Count this request; return the delay to inject, if any.
    fn delay_for(&self, ip: IpAddr) -> Option<Duration> {
        let mut state = self.state.lock();
        let now = Instant::now();

        let entry = state.entry(ip).or_insert(SpeedLimitEntry {
            count: 0,
            window_start: now,
        });

        if now.duration_since(entry.window_start) >= self.config.window {
            entry.count = 0;
            entry.window_start = now;
        }

        entry.count += 1;

        let over = entry.count.checked_sub(self.config.delay_after)?;
        if over == 0 {
            return None;
        }

        Some((self.config.base_delay * over).min(self.config.max_delay))
    }

    /// Periodic cleanup of old entries (call from a background task).
    pub fn cleanup(&self) {
        let mut state = self.state.lock();
        let now = Instant::now();
        let window = self.config.window;

        state.retain(|_, entry| now.duration_since(entry.window_start) < window * 2);
    }
}

/// Speed limiting middleware function.
pub async fn speed_limit_middleware(
    axum::extract::State(limiter): axum::extract::State<SpeedLimitLayer>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let ip = client_ip(&request);

    if let Some(delay) = limiter.delay_for(ip) {
        debug!(ip = %ip, delay_ms = delay.as_millis() as u64, "Slowing request");
        tokio::time::sleep(delay).await;
    }

    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_layer() -> SpeedLimitLayer {
        SpeedLimitLayer::new(SpeedLimitConfig {
            delay_after: 5,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(2),
            window: Duration::from_secs(60),
        })
    }

    #[test]
    fn test_no_delay_under_threshold() {
        let layer = test_layer();
        let ip: IpAddr = "127.0.0.1".parse().unwrap();

        for _ in 0..5 {
            assert_eq!(layer.delay_for(ip), None);
        }
    }

    #[test]
    fn test_delay_grows_past_threshold() {
        let layer = test_layer();
        let ip: IpAddr = "127.0.0.1".parse().unwrap();

        for _ in 0..5 {
            layer.delay_for(ip);
        }

        assert_eq!(layer.delay_for(ip), Some(Duration::from_millis(500)));
        assert_eq!(layer.delay_for(ip), Some(Duration::from_millis(1000)));
        assert_eq!(layer.delay_for(ip), Some(Duration::from_millis(1500)));
    }

    #[test]
    fn test_delay_is_capped() {
        let layer = test_layer();
        let ip: IpAddr = "127.0.0.1".parse().unwrap();

        for _ in 0..50 {
            layer.delay_for(ip);
        }

        assert_eq!(layer.delay_for(ip), Some(Duration::from_secs(2)));
    }

    #[test]
    fn test_window_reset_clears_delay() {
        let layer = SpeedLimitLayer::new(SpeedLimitConfig {
            delay_after: 1,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(2),
            window: Duration::from_millis(10),
        });
        let ip: IpAddr = "127.0.0.1".parse().unwrap();

        layer.delay_for(ip);
        assert!(layer.delay_for(ip).is_some());

        std::thread::sleep(Duration::from_millis(15));
        assert_eq!(layer.delay_for(ip), None);
    }
}
