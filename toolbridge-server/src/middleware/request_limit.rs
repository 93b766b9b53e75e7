// Copyright 2025 Sushanth (https://github.com/sushanthpy)
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Per-IP request ceiling for every route.
//!
//! A token bucket per caller IP, held in a bounded moka cache so idle clients
//! are evicted on their own. This sits in front of the per-tool limits and
//! only protects the server as a whole.

use crate::api::ApiError;
use crate::config::RequestLimitConfig;
use axum::extract::{ConnectInfo, Request, State};
use axum::http::{HeaderMap, HeaderValue};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use moka::sync::Cache;
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug)]
struct TokenBucket {
    tokens: f64,
    capacity: f64,
    /// Tokens per second
    refill_rate: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn new(capacity: u32, window: Duration) -> Self {
        Self {
            tokens: capacity as f64,
            capacity: capacity as f64,
            refill_rate: capacity as f64 / window.as_secs_f64(),
            last_refill: Instant::now(),
        }
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.capacity);
        self.last_refill = now;
    }

    fn try_consume(&mut self) -> bool {
        self.refill();
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    fn retry_after(&self) -> Duration {
        if self.tokens >= 1.0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64((1.0 - self.tokens) / self.refill_rate)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RequestLimitResult {
    Allowed { remaining: u32 },
    Limited { retry_after: Duration },
}

pub struct RequestLimiter {
    config: RequestLimitConfig,
    buckets: Cache<String, Arc<Mutex<TokenBucket>>>,
}

impl RequestLimiter {
    pub fn new(config: RequestLimitConfig) -> Self {
        // Idle buckets are full again after one window, so they can go.
        let ttl = Duration::from_secs(config.window_secs.max(1) * 2);
        let buckets = Cache::builder()
            .max_capacity(config.max_clients)
            .time_to_idle(ttl)
            .build();
        Self { config, buckets }
    }

    pub fn check(&self, client: &str) -> RequestLimitResult {
        if !self.config.enabled {
            return RequestLimitResult::Allowed {
                remaining: self.config.max_requests,
            };
        }

        let bucket = self.buckets.get_with(client.to_string(), || {
            Arc::new(Mutex::new(TokenBucket::new(
                self.config.max_requests,
                Duration::from_secs(self.config.window_secs),
            )))
        });

        let mut bucket = bucket.lock();
        if bucket.try_consume() {
            RequestLimitResult::Allowed {
                remaining: bucket.tokens.floor() as u32,
            }
        } else {
            RequestLimitResult::Limited {
                retry_after: bucket.retry_after(),
            }
        }
    }

    #[cfg(test)]
    fn client_count(&self) -> u64 {
        self.buckets.run_pending_tasks();
        self.buckets.entry_count()
    }
}

/// Caller IP from proxy headers, if present.
pub fn extract_client_ip(headers: &HeaderMap) -> Option<String> {
    if let Some(forwarded) = headers.get("X-Forwarded-For") {
        if let Ok(forwarded_str) = forwarded.to_str() {
            if let Some(first_ip) = forwarded_str.split(',').next() {
                let ip = first_ip.trim();
                if !ip.is_empty() {
                    return Some(ip.to_string());
                }
            }
        }
    }

    if let Some(real_ip) = headers.get("X-Real-IP") {
        if let Ok(ip_str) = real_ip.to_str() {
            return Some(ip_str.trim().to_string());
        }
    }

    None
}

/// Caller IP from headers, then the socket peer, then `"unknown"`.
pub fn caller_ip(req: &Request) -> String {
    extract_client_ip(req.headers())
        .or_else(|| {
            req.extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip().to_string())
        })
        .unwrap_or_else(|| "unknown".to_string())
}

pub async fn request_limit_middleware(
    State(limiter): State<Arc<RequestLimiter>>,
    req: Request,
    next: Next,
) -> Response {
    let ip = caller_ip(&req);
    let limit = HeaderValue::from(limiter.config.max_requests);
    match limiter.check(&ip) {
        RequestLimitResult::Allowed { remaining } => {
            let mut response = next.run(req).await;
            if limiter.config.enabled {
                let headers = response.headers_mut();
                headers.insert("X-RateLimit-Limit", limit);
                headers.insert("X-RateLimit-Remaining", HeaderValue::from(remaining));
            }
            response
        }
        RequestLimitResult::Limited { retry_after } => {
            tracing::warn!("Request limit exceeded for {}", ip);
            let mut response = ApiError::RateLimited {
                message: "Too many requests from this IP, please try again later".to_string(),
                retry_after_ms: retry_after.as_millis() as u64,
            }
            .into_response();
            let headers = response.headers_mut();
            headers.insert(
                "Retry-After",
                HeaderValue::from(retry_after.as_secs_f64().ceil() as u64),
            );
            headers.insert("X-RateLimit-Limit", limit);
            headers.insert("X-RateLimit-Remaining", HeaderValue::from(0u32));
            response
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{HeaderValue, StatusCode};
    use axum::routing::get;
    use axum::Router;
    use tower::ServiceExt;

    fn config(max_requests: u32) -> RequestLimitConfig {
        RequestLimitConfig {
            enabled: true,
            max_requests,
            window_secs: 60,
            max_clients: 1000,
        }
    }

    #[test]
    fn test_bucket_allows_capacity_then_limits() {
        let limiter = RequestLimiter::new(config(5));
        for _ in 0..5 {
            assert!(matches!(
                limiter.check("1.2.3.4"),
                RequestLimitResult::Allowed { .. }
            ));
        }
        match limiter.check("1.2.3.4") {
            RequestLimitResult::Limited { retry_after } => {
                assert!(retry_after > Duration::ZERO);
                assert!(retry_after <= Duration::from_secs(12));
            }
            other => panic!("expected limit, got {other:?}"),
        }
        assert!(matches!(
            limiter.check("5.6.7.8"),
            RequestLimitResult::Allowed { .. }
        ));
    }

    #[test]
    fn test_disabled_limiter_allows_everything() {
        let limiter = RequestLimiter::new(RequestLimitConfig {
            enabled: false,
            ..config(1)
        });
        for _ in 0..50 {
            assert!(matches!(
                limiter.check("1.2.3.4"),
                RequestLimitResult::Allowed { .. }
            ));
        }
    }

    #[test]
    fn test_client_tracking_is_bounded() {
        let limiter = RequestLimiter::new(RequestLimitConfig {
            max_clients: 10,
            ..config(10)
        });
        for i in 0..100 {
            limiter.check(&format!("10.0.0.{i}"));
        }
        assert!(limiter.client_count() <= 10);
    }

    #[test]
    fn test_extract_client_ip_prefers_forwarded_for() {
        let mut headers = HeaderMap::new();
        headers.insert("X-Real-IP", HeaderValue::from_static("9.9.9.9"));
        assert_eq!(extract_client_ip(&headers).as_deref(), Some("9.9.9.9"));

        headers.insert(
            "X-Forwarded-For",
            HeaderValue::from_static("1.1.1.1, 10.0.0.1"),
        );
        assert_eq!(extract_client_ip(&headers).as_deref(), Some("1.1.1.1"));
    }

    #[tokio::test]
    async fn test_middleware_returns_429_envelope() {
        let limiter = Arc::new(RequestLimiter::new(config(1)));
        let app = Router::new()
            .route("/", get(|| async { "ok" }))
            .layer(axum::middleware::from_fn_with_state(
                limiter,
                request_limit_middleware,
            ));

        let first = app
            .clone()
            .oneshot(axum::http::Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(first.status(), StatusCode::OK);
        assert_eq!(first.headers()["x-ratelimit-limit"], "1");
        assert_eq!(first.headers()["x-ratelimit-remaining"], "0");

        let second = app
            .oneshot(axum::http::Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(second.headers()["retry-after"], "60");
        assert_eq!(second.headers()["x-ratelimit-remaining"], "0");

        let bytes = axum::body::to_bytes(second.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["isError"], true);
        assert!(body["retryAfterMs"].as_u64().unwrap() > 0);
    }
}
