//! Per-client request rate limiting.
//!
//! The limiter is an injected service so the HTTP layer does not care where
//! counts live. The in-memory implementation is per process; several
//! replicas each enforce their own budget.

use crate::error::{DbError, DbResult};
use async_trait::async_trait;
use axum::extract::{ConnectInfo, Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::warn;

pub const DEFAULT_MAX_REQUESTS: u32 = 60;
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60);

#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Count one request for `client`; `RateLimited` once the budget is spent.
    async fn check(&self, client: &str) -> DbResult<()>;
}

#[derive(Debug, Clone)]
struct Counter {
    count: u32,
    window_start: Instant,
}

#[derive(Debug)]
struct LimiterState {
    counters: HashMap<String, Counter>,
    last_sweep: Instant,
}

/// Fixed-window counter per client, held in memory.
#[derive(Debug)]
pub struct InMemoryRateLimiter {
    max_requests: u32,
    window: Duration,
    state: Mutex<LimiterState>,
}

impl InMemoryRateLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            state: Mutex::new(LimiterState {
                counters: HashMap::new(),
                last_sweep: Instant::now(),
            }),
        }
    }

    /// Number of clients with a live counter.
    pub async fn tracked_clients(&self) -> usize {
        self.state.lock().await.counters.len()
    }
}

impl Default for InMemoryRateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_REQUESTS, DEFAULT_WINDOW)
    }
}

#[async_trait]
impl RateLimiter for InMemoryRateLimiter {
    async fn check(&self, client: &str) -> DbResult<()> {
        let now = Instant::now();
        let window = self.window;
        let mut state = self.state.lock().await;

        // Expired counters are dropped at most once per window
        if now.saturating_duration_since(state.last_sweep) >= window {
            state
                .counters
                .retain(|_, c| now.saturating_duration_since(c.window_start) < window);
            state.last_sweep = now;
        }

        let entry = state
            .counters
            .entry(client.to_string())
            .or_insert_with(|| Counter {
                count: 0,
                window_start: now,
            });

        let elapsed = now.saturating_duration_since(entry.window_start);
        if elapsed >= window {
            entry.window_start = now;
            entry.count = 0;
        }

        if entry.count >= self.max_requests {
            let retry_after = window
                .checked_sub(elapsed)
                .unwrap_or_default()
                .max(Duration::from_secs(1));
            warn!(
                client_fingerprint = %fingerprint(client),
                limit = self.max_requests,
                "Rate limit exceeded"
            );
            return Err(DbError::rate_limited(retry_after.as_secs_f64().ceil() as u64));
        }

        entry.count += 1;
        Ok(())
    }
}

/// Short stable hash of a client id, so addresses stay out of logs.
fn fingerprint(client: &str) -> String {
    let digest = Sha256::digest(client.as_bytes());
    digest[..6].iter().map(|b| format!("{:02x}", b)).collect()
}

/// Limiter and client-identity policy, as middleware state.
#[derive(Clone)]
pub struct RateLimitGate {
    pub limiter: Arc<dyn RateLimiter>,
    /// Key on the first `X-Forwarded-For` hop. Only safe behind a proxy that
    /// overwrites the header.
    pub trust_proxy: bool,
}

fn forwarded_for(request: &Request) -> Option<&str> {
    request
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Client identity: the peer address, or the first `X-Forwarded-For` hop
/// when the proxy is trusted.
pub fn client_id(request: &Request, trust_proxy: bool) -> String {
    if trust_proxy {
        if let Some(forwarded) = forwarded_for(request) {
            return forwarded.to_string();
        }
    }
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Axum middleware rejecting over-budget clients with 429 and `Retry-After`.
pub async fn rate_limit_middleware(
    State(gate): State<RateLimitGate>,
    request: Request,
    next: Next,
) -> Response {
    let client = client_id(&request, gate.trust_proxy);
    match gate.limiter.check(&client).await {
        Ok(()) => next.run(request).await,
        Err(e) => e.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http;

    #[tokio::test]
    async fn test_allows_up_to_limit() {
        let limiter = InMemoryRateLimiter::new(3, Duration::from_secs(60));
        for _ in 0..3 {
            assert!(limiter.check("a").await.is_ok());
        }
        match limiter.check("a").await {
            Err(DbError::RateLimited { retry_after_secs }) => {
                assert!((1..=60).contains(&retry_after_secs));
            }
            other => panic!("expected RateLimited, got {:?}", other),
        }
        // Other clients have their own budget
        assert!(limiter.check("b").await.is_ok());
    }

    #[tokio::test]
    async fn test_window_resets_and_sweeps() {
        let limiter = InMemoryRateLimiter::new(1, Duration::from_millis(50));
        assert!(limiter.check("a").await.is_ok());
        assert!(limiter.check("a").await.is_err());

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(limiter.check("b").await.is_ok());
        // "a" expired and was swept when "b" arrived
        assert_eq!(limiter.tracked_clients().await, 1);
        assert!(limiter.check("a").await.is_ok());
    }

    fn request_from(peer: [u8; 4], forwarded: Option<&str>) -> Request {
        let mut builder = http::Request::builder();
        if let Some(forwarded) = forwarded {
            builder = builder.header("x-forwarded-for", forwarded);
        }
        let mut request = builder.body(Body::empty()).unwrap();
        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::from((peer, 4000))));
        request
    }

    #[test]
    fn test_client_id_uses_peer_address() {
        let request = request_from([192, 0, 2, 1], Some("203.0.113.7"));
        assert_eq!(client_id(&request, false), "192.0.2.1");

        let request = http::Request::builder().body(Body::empty()).unwrap();
        assert_eq!(client_id(&request, false), "unknown");
    }

    #[test]
    fn test_client_id_behind_trusted_proxy() {
        let request = request_from([10, 0, 0, 1], Some("203.0.113.7, 10.0.0.1"));
        assert_eq!(client_id(&request, true), "203.0.113.7");

        let request = request_from([10, 0, 0, 1], None);
        assert_eq!(client_id(&request, true), "10.0.0.1");
    }

    #[test]
    fn test_fingerprint_hides_address() {
        let fp = fingerprint("203.0.113.7");
        assert_eq!(fp.len(), 12);
        assert!(fp.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(fp, fingerprint("203.0.113.7"));
        assert_ne!(fp, fingerprint("203.0.113.8"));
    }
}
