use async_trait::async_trait;
use axum::{
    extract::{ConnectInfo, Request},
    http::{header, HeaderMap, HeaderValue},
    response::{IntoResponse, Response},
};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

use super::{PipelineOutcome, PipelineStage};
use crate::config::RuntimeConfig;
use crate::error::ApiError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub max_requests: u32,
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 100,
            window: Duration::from_secs(60 * 60),
        }
    }
}

impl From<&RuntimeConfig> for RateLimitConfig {
    fn from(config: &RuntimeConfig) -> Self {
        Self {
            max_requests: config.api.rate_limit_requests,
            window: config.rate_limit_window(),
        }
    }
}

/// Request count for one client within its current window.
#[derive(Debug, Clone, Copy)]
struct RateWindow {
    count: u32,
    resets_at: Instant,
}

struct Windows {
    by_client: HashMap<String, RateWindow>,
    next_sweep: Instant,
}

/// Outcome of counting one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    pub reset_after: Duration,
}

/// Fixed-window limiter keyed by client address.
///
/// A client's window starts with its first request and ends `window` later
/// regardless of traffic; expired windows are swept at most once per window.
pub struct RateLimiter {
    config: RateLimitConfig,
    windows: Mutex<Windows>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            windows: Mutex::new(Windows {
                by_client: HashMap::new(),
                next_sweep: Instant::now() + config.window,
            }),
        }
    }

    pub fn config(&self) -> RateLimitConfig {
        self.config
    }

    /// Count one request from `client`.
    pub async fn hit(&self, client: &str) -> Decision {
        let now = Instant::now();
        let mut windows = self.windows.lock().await;

        if now >= windows.next_sweep {
            windows.by_client.retain(|_, w| w.resets_at > now);
            windows.next_sweep = now + self.config.window;
        }

        let window = windows
            .by_client
            .entry(client.to_string())
            .or_insert(RateWindow {
                count: 0,
                resets_at: now + self.config.window,
            });

        if now >= window.resets_at {
            window.count = 0;
            window.resets_at = now + self.config.window;
        }
        window.count = window.count.saturating_add(1);

        Decision {
            allowed: window.count <= self.config.max_requests,
            limit: self.config.max_requests,
            remaining: self.config.max_requests.saturating_sub(window.count),
            reset_after: window.resets_at - now,
        }
    }

    /// Clients currently tracked.
    pub async fn tracked_clients(&self) -> usize {
        self.windows.lock().await.by_client.len()
    }

    fn write_headers(&self, decision: &Decision, headers: &mut HeaderMap) {
        let reset_secs = decision.reset_after.as_secs() + u64::from(decision.reset_after.subsec_nanos() > 0);
        let policy = format!("{};w={}", self.config.max_requests, self.config.window.as_secs());

        if let Ok(value) = HeaderValue::from_str(&policy) {
            headers.insert("ratelimit-policy", value);
        }
        headers.insert("ratelimit-limit", HeaderValue::from(decision.limit));
        headers.insert("ratelimit-remaining", HeaderValue::from(decision.remaining));
        headers.insert("ratelimit-reset", HeaderValue::from(reset_secs));
        if !decision.allowed {
            headers.insert(header::RETRY_AFTER, HeaderValue::from(reset_secs));
        }
    }
}

/// Network address of the caller, as recorded by the listener.
pub fn client_key(request: &Request) -> String {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

#[async_trait]
impl PipelineStage for RateLimiter {
    type Ticket = Decision;

    async fn before(&self, request: Request) -> PipelineOutcome<Decision> {
        let client = client_key(&request);
        let decision = self.hit(&client).await;

        if decision.allowed {
            return PipelineOutcome::Continue(request, decision);
        }

        tracing::warn!(
            "Rate limit exceeded for {} on {} {}",
            client,
            request.method(),
            request.uri().path()
        );
        let mut response = ApiError::TooManyRequests.into_response();
        self.write_headers(&decision, response.headers_mut());
        PipelineOutcome::ShortCircuit(response)
    }

    fn after(&self, decision: Decision, response: &mut Response) {
        self.write_headers(&decision, response.headers_mut());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(max_requests: u32, window_secs: u64) -> RateLimiter {
        RateLimiter::new(RateLimitConfig {
            max_requests,
            window: Duration::from_secs(window_secs),
        })
    }

    #[tokio::test(start_paused = true)]
    async fn blocks_after_ceiling() {
        let limiter = limiter(3, 60);
        for expected_remaining in [2, 1, 0] {
            let decision = limiter.hit("10.0.0.1").await;
            assert!(decision.allowed);
            assert_eq!(decision.remaining, expected_remaining);
        }
        let blocked = limiter.hit("10.0.0.1").await;
        assert!(!blocked.allowed);
        assert_eq!(blocked.remaining, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn clients_are_counted_separately() {
        let limiter = limiter(1, 60);
        assert!(limiter.hit("10.0.0.1").await.allowed);
        assert!(limiter.hit("10.0.0.2").await.allowed);
        assert!(!limiter.hit("10.0.0.1").await.allowed);
    }

    #[tokio::test(start_paused = true)]
    async fn window_resets_with_time() {
        let limiter = limiter(1, 60);
        assert!(limiter.hit("10.0.0.1").await.allowed);
        assert!(!limiter.hit("10.0.0.1").await.allowed);

        tokio::time::advance(Duration::from_secs(59)).await;
        let still_blocked = limiter.hit("10.0.0.1").await;
        assert!(!still_blocked.allowed);
        assert_eq!(still_blocked.reset_after, Duration::from_secs(1));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(limiter.hit("10.0.0.1").await.allowed);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_windows_are_swept() {
        let limiter = limiter(5, 10);
        limiter.hit("a").await;
        limiter.hit("b").await;
        assert_eq!(limiter.tracked_clients().await, 2);

        tokio::time::advance(Duration::from_secs(11)).await;
        limiter.hit("c").await;
        assert_eq!(limiter.tracked_clients().await, 1);
    }
}
