//! Per-client sliding-window rate limiting for the query routes.

use crate::error::ApiError;
use axum::extract::{ConnectInfo, Request, State};
use axum::middleware::Next;
use axum::response::Response;
use dashmap::DashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub const WINDOW: Duration = Duration::from_secs(60);

/// Idle clients are dropped from the map once every this many checks.
pub const SWEEP_EVERY: u64 = 1024;

/// Sliding window of request times keyed by client address. Requests
/// without a peer address share the `None` bucket.
pub struct RateLimiter {
    max_requests: u32,
    window: Duration,
    clients: DashMap<Option<IpAddr>, Vec<Instant>>,
    checks: AtomicU64,
}

impl RateLimiter {
    pub fn new(max_requests: u32) -> Self {
        Self::with_window(max_requests, WINDOW)
    }

    pub fn with_window(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            clients: DashMap::new(),
            checks: AtomicU64::new(0),
        }
    }

    pub fn check(&self, client: Option<IpAddr>) -> Result<(), ApiError> {
        self.check_at(client, Instant::now())
    }

    /// Record a request at `now`, or reject it with the seconds until the
    /// oldest request in the window expires.
    pub fn check_at(&self, client: Option<IpAddr>, now: Instant) -> Result<(), ApiError> {
        if self.checks.fetch_add(1, Ordering::Relaxed) % SWEEP_EVERY == SWEEP_EVERY - 1 {
            self.sweep(now);
        }

        let mut times = self.clients.entry(client).or_default();

        // Drop requests that have left the window
        times.retain(|t| now.saturating_duration_since(*t) < self.window);

        if times.len() >= self.max_requests as usize {
            let oldest = times.iter().min().copied().unwrap_or(now);
            let wait = self
                .window
                .saturating_sub(now.saturating_duration_since(oldest));
            let retry_after_secs = wait.as_secs() + u64::from(wait.subsec_nanos() > 0);
            log::warn!(
                "Rate limit exceeded for {:?}: {} requests in {}s",
                client,
                times.len(),
                self.window.as_secs()
            );
            return Err(ApiError::RateLimited {
                retry_after_secs: retry_after_secs.max(1),
            });
        }

        times.push(now);
        Ok(())
    }

    /// Drop clients with no request left inside the window.
    pub fn sweep(&self, now: Instant) {
        let before = self.clients.len();
        self.clients.retain(|_, times| {
            times.retain(|t| now.saturating_duration_since(*t) < self.window);
            !times.is_empty()
        });
        log::debug!(
            "Rate limiter sweep: {} -> {} tracked clients",
            before,
            self.clients.len()
        );
    }

    pub fn tracked_clients(&self) -> usize {
        self.clients.len()
    }
}

pub async fn limit_requests(
    State(limiter): State<Arc<RateLimiter>>,
    peer: Option<ConnectInfo<SocketAddr>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    limiter.check(peer.map(|ConnectInfo(addr)| addr.ip()))?;
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn ip(last: u8) -> Option<IpAddr> {
        Some(IpAddr::V4(Ipv4Addr::new(10, 0, 0, last)))
    }

    #[test]
    fn test_limit_per_client() {
        let limiter = RateLimiter::new(5);
        let now = Instant::now();
        for _ in 0..5 {
            assert!(limiter.check_at(ip(1), now).is_ok());
        }
        match limiter.check_at(ip(1), now) {
            Err(ApiError::RateLimited { retry_after_secs }) => assert_eq!(retry_after_secs, 60),
            other => panic!("expected rate limit, got {:?}", other),
        }
        // Other clients have their own window
        assert!(limiter.check_at(ip(2), now).is_ok());
        assert!(limiter.check_at(None, now).is_ok());
    }

    #[test]
    fn test_window_slides() {
        let limiter = RateLimiter::with_window(2, Duration::from_secs(10));
        let start = Instant::now();
        assert!(limiter.check_at(ip(1), start).is_ok());
        assert!(limiter
            .check_at(ip(1), start + Duration::from_secs(4))
            .is_ok());

        match limiter.check_at(ip(1), start + Duration::from_secs(6)) {
            Err(ApiError::RateLimited { retry_after_secs }) => assert_eq!(retry_after_secs, 4),
            other => panic!("expected rate limit, got {:?}", other),
        }

        // The first request has expired
        assert!(limiter
            .check_at(ip(1), start + Duration::from_secs(10))
            .is_ok());
    }

    #[test]
    fn test_idle_clients_are_forgotten() {
        let limiter = RateLimiter::with_window(5, Duration::from_secs(10));
        let start = Instant::now();
        for last in 1..=3 {
            assert!(limiter.check_at(ip(last), start).is_ok());
        }
        assert_eq!(limiter.tracked_clients(), 3);

        limiter.sweep(start + Duration::from_secs(5));
        assert_eq!(limiter.tracked_clients(), 3);

        limiter.sweep(start + Duration::from_secs(10));
        assert_eq!(limiter.tracked_clients(), 0);
    }

    #[test]
    fn test_sweep_runs_during_checks() {
        let limiter = RateLimiter::with_window(5, Duration::from_secs(10));
        let start = Instant::now();
        assert!(limiter.check_at(ip(1), start).is_ok());
        assert!(limiter.check_at(ip(2), start).is_ok());

        let later = start + Duration::from_secs(30);
        for _ in 0..SWEEP_EVERY {
            let _ = limiter.check_at(None, later);
        }
        // Only the anonymous bucket is still active.
        assert_eq!(limiter.tracked_clients(), 1);
    }
}
