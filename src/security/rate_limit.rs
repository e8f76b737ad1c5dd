//! Per-IP rate limiting middleware.
//!
//! Reset-style window semantics: a counter restarts only when the window
//! has fully elapsed since the actor's last allowed attempt, rather than
//! tracking per-request timestamps. Counters are created lazily and live
//! for the process lifetime.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{HeaderValue, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::observability::metrics;

// Standard draft rate-limit headers. The legacy X-RateLimit-* family is
// deliberately never emitted.
const LIMIT_HEADER: &str = "ratelimit-limit";
const REMAINING_HEADER: &str = "ratelimit-remaining";
const RESET_HEADER: &str = "ratelimit-reset";

/// Per-actor counter.
struct WindowCounter {
    attempts: u32,
    last_attempt: Instant,
}

/// Outcome of a limiter check, carrying what the response headers need.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    pub reset_after: Duration,
}

/// A fixed-ceiling, reset-window rate limiter keyed by remote IP.
///
/// Counter updates are serialized under one mutex so parallel requests
/// from the same actor cannot exceed the ceiling through lost updates.
pub struct RateLimiter {
    tier: &'static str,
    max_requests: u32,
    window: Duration,
    counters: Mutex<HashMap<IpAddr, WindowCounter>>,
}

impl RateLimiter {
    pub fn new(tier: &'static str, max_requests: u32, window: Duration) -> Self {
        Self {
            tier,
            max_requests,
            window,
            counters: Mutex::new(HashMap::new()),
        }
    }

    /// Check and record an attempt for `actor`.
    pub fn check(&self, actor: IpAddr) -> RateLimitDecision {
        self.check_at(actor, Instant::now())
    }

    fn check_at(&self, actor: IpAddr, now: Instant) -> RateLimitDecision {
        let mut counters = self.counters.lock().expect("rate limiter mutex poisoned");
        let counter = counters.entry(actor).or_insert(WindowCounter {
            attempts: 0,
            last_attempt: now,
        });

        if now.duration_since(counter.last_attempt) > self.window {
            counter.attempts = 0;
        }

        if counter.attempts >= self.max_requests {
            return RateLimitDecision {
                allowed: false,
                limit: self.max_requests,
                remaining: 0,
                reset_after: self
                    .window
                    .saturating_sub(now.duration_since(counter.last_attempt)),
            };
        }

        counter.attempts += 1;
        counter.last_attempt = now;
        RateLimitDecision {
            allowed: true,
            limit: self.max_requests,
            remaining: self.max_requests - counter.attempts,
            reset_after: self.window,
        }
    }

    /// Tier label used in logs and metrics.
    pub fn tier(&self) -> &'static str {
        self.tier
    }
}

/// Middleware applying one limiter tier to all requests flowing through it.
pub async fn rate_limit_middleware(
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(limiter): State<Arc<RateLimiter>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let decision = limiter.check(addr.ip());

    if decision.allowed {
        let mut response = next.run(request).await;
        apply_headers(&mut response, &decision);
        response
    } else {
        tracing::warn!(client = %addr.ip(), tier = limiter.tier(), "Rate limit exceeded");
        metrics::record_rate_limited(limiter.tier());
        let mut response = (
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({"error": "Too many requests"})),
        )
            .into_response();
        apply_headers(&mut response, &decision);
        response
    }
}

/// Attach standard rate-limit headers, unless an inner (more specific)
/// tier already did.
fn apply_headers(response: &mut Response, decision: &RateLimitDecision) {
    let headers = response.headers_mut();
    if headers.contains_key(LIMIT_HEADER) {
        return;
    }
    headers.insert(LIMIT_HEADER, header_value(decision.limit));
    headers.insert(REMAINING_HEADER, header_value(decision.remaining));
    headers.insert(
        RESET_HEADER,
        header_value(decision.reset_after.as_secs().max(1) as u32),
    );
}

fn header_value(n: u32) -> HeaderValue {
    HeaderValue::from_str(&n.to_string()).expect("numeric header value")
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_secs(60);

    #[test]
    fn ceiling_enforced_within_one_window() {
        let limiter = RateLimiter::new("test", 5, WINDOW);
        let actor: IpAddr = "10.0.0.1".parse().unwrap();
        let t0 = Instant::now();

        for i in 0..5 {
            let decision = limiter.check_at(actor, t0 + Duration::from_secs(i));
            assert!(decision.allowed, "attempt {i} should pass");
            assert_eq!(decision.remaining, 4 - i as u32);
        }

        let sixth = limiter.check_at(actor, t0 + Duration::from_secs(5));
        assert!(!sixth.allowed);
        assert_eq!(sixth.remaining, 0);
    }

    #[test]
    fn window_elapse_resets_counter_to_one() {
        let limiter = RateLimiter::new("test", 5, WINDOW);
        let actor: IpAddr = "10.0.0.2".parse().unwrap();
        let t0 = Instant::now();

        for _ in 0..5 {
            assert!(limiter.check_at(actor, t0).allowed);
        }
        assert!(!limiter.check_at(actor, t0).allowed);

        let later = t0 + WINDOW + Duration::from_secs(1);
        let decision = limiter.check_at(actor, later);
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 4, "counter restarted at 1");
    }

    #[test]
    fn denied_attempts_do_not_extend_the_window() {
        let limiter = RateLimiter::new("test", 1, WINDOW);
        let actor: IpAddr = "10.0.0.3".parse().unwrap();
        let t0 = Instant::now();

        assert!(limiter.check_at(actor, t0).allowed);
        // Hammering while denied must not push the reset point forward.
        for i in 1..30 {
            assert!(!limiter.check_at(actor, t0 + Duration::from_secs(i)).allowed);
        }
        assert!(limiter.check_at(actor, t0 + WINDOW + Duration::from_secs(1)).allowed);
    }

    #[test]
    fn actors_are_tracked_independently() {
        let limiter = RateLimiter::new("test", 1, WINDOW);
        let t0 = Instant::now();
        let a: IpAddr = "10.0.0.4".parse().unwrap();
        let b: IpAddr = "10.0.0.5".parse().unwrap();

        assert!(limiter.check_at(a, t0).allowed);
        assert!(!limiter.check_at(a, t0).allowed);
        assert!(limiter.check_at(b, t0).allowed);
    }

    #[test]
    fn denial_reports_time_until_reset() {
        let limiter = RateLimiter::new("test", 1, WINDOW);
        let actor: IpAddr = "10.0.0.6".parse().unwrap();
        let t0 = Instant::now();

        assert!(limiter.check_at(actor, t0).allowed);
        let denied = limiter.check_at(actor, t0 + Duration::from_secs(20));
        assert!(!denied.allowed);
        assert_eq!(denied.reset_after, Duration::from_secs(40));
    }
}
