//! Per-client login throttle (fixed window).
//!
//! The only in-process mutable state in the service. It lives at the HTTP
//! edge and runs before any credential verification.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::{
    extract::{ConnectInfo, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};

use crate::app::errors::json_error;

/// Windows are swept once the map grows past this many clients.
const SWEEP_THRESHOLD: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThrottleConfig {
    pub max_attempts: u32,
    pub window: Duration,
}

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    attempts: u32,
}

#[derive(Debug)]
pub struct LoginThrottle {
    config: ThrottleConfig,
    windows: Mutex<HashMap<Option<IpAddr>, Window>>,
}

impl LoginThrottle {
    pub fn new(config: ThrottleConfig) -> Self {
        Self {
            config,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Count one attempt for `client`; `false` once the window's budget is spent.
    pub fn try_acquire(&self, client: Option<IpAddr>, now: Instant) -> bool {
        let Ok(mut windows) = self.windows.lock() else {
            // Fail open rather than lock everyone out.
            return true;
        };

        if windows.len() > SWEEP_THRESHOLD {
            let window = self.config.window;
            windows.retain(|_, w| now.duration_since(w.started) < window);
        }

        let entry = windows.entry(client).or_insert(Window {
            started: now,
            attempts: 0,
        });
        if now.duration_since(entry.started) >= self.config.window {
            *entry = Window {
                started: now,
                attempts: 0,
            };
        }

        if entry.attempts >= self.config.max_attempts {
            return false;
        }
        entry.attempts += 1;
        true
    }
}

pub async fn login_throttle(
    State(throttle): State<Arc<LoginThrottle>>,
    req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Response {
    let client = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());

    if !throttle.try_acquire(client, Instant::now()) {
        tracing::warn!(client = ?client, "login throttled");
        return json_error(
            StatusCode::TOO_MANY_REQUESTS,
            "too_many_attempts",
            "too many login attempts, try again later",
        );
    }

    next.run(req).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn throttle(max: u32, secs: u64) -> LoginThrottle {
        LoginThrottle::new(ThrottleConfig {
            max_attempts: max,
            window: Duration::from_secs(secs),
        })
    }

    #[test]
    fn budget_is_per_client() {
        let t = throttle(2, 60);
        let now = Instant::now();
        let a = Some(IpAddr::from([10, 0, 0, 1]));
        let b = Some(IpAddr::from([10, 0, 0, 2]));

        assert!(t.try_acquire(a, now));
        assert!(t.try_acquire(a, now));
        assert!(!t.try_acquire(a, now));
        assert!(t.try_acquire(b, now));
    }

    #[test]
    fn window_resets_after_it_elapses() {
        let t = throttle(1, 60);
        let now = Instant::now();
        let a = Some(IpAddr::from([10, 0, 0, 1]));

        assert!(t.try_acquire(a, now));
        assert!(!t.try_acquire(a, now + Duration::from_secs(59)));
        assert!(t.try_acquire(a, now + Duration::from_secs(60)));
    }
}
