//! Per-route token-bucket rate limiting (spec §6/§6.1), keyed by remote IP.
//! Exhaustion maps to HTTP 429 at the handler boundary.

use std::net::{IpAddr, SocketAddr};
use std::num::NonZeroU32;
use std::sync::Arc;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use governor::state::keyed::DefaultKeyedStateStore;
use governor::{Quota, RateLimiter};

type KeyedLimiter = RateLimiter<IpAddr, DefaultKeyedStateStore<IpAddr>, governor::clock::DefaultClock>;

/// A single route class's limiter, e.g. "30 requests per minute per IP".
#[derive(Clone)]
pub struct RouteLimiter {
    inner: Arc<KeyedLimiter>,
}

impl RouteLimiter {
    pub fn per_minute(count: u32) -> Self {
        let quota = Quota::per_minute(NonZeroU32::new(count.max(1)).expect("count clamped to >=1"));
        RouteLimiter { inner: Arc::new(RateLimiter::keyed(quota)) }
    }

    pub fn check(&self, ip: IpAddr) -> bool {
        self.inner.check_key(&ip).is_ok()
    }
}

/// Axum middleware, installed per route with `middleware::from_fn_with_state`:
/// returns 429 when the caller's IP has exhausted its bucket.
pub async fn enforce(
    State(limiter): State<RouteLimiter>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request,
    next: Next,
) -> Response {
    if !limiter.check(addr.ip()) {
        return StatusCode::TOO_MANY_REQUESTS.into_response();
    }
    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_up_to_the_configured_rate() {
        let limiter = RouteLimiter::per_minute(2);
        let ip: IpAddr = "127.0.0.1".parse().unwrap();
        assert!(limiter.check(ip));
        assert!(limiter.check(ip));
        assert!(!limiter.check(ip));
    }

    #[test]
    fn limits_are_independent_per_ip() {
        let limiter = RouteLimiter::per_minute(1);
        let a: IpAddr = "127.0.0.1".parse().unwrap();
        let b: IpAddr = "127.0.0.2".parse().unwrap();
        assert!(limiter.check(a));
        assert!(limiter.check(b));
        assert!(!limiter.check(a));
    }
}
