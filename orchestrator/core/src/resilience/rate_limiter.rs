// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Sliding-Window Rate Limiter
//!
//! Per-identity log of recent request timestamps. The backend performs
//! "drop entries older than the window, count, record if under the limit,
//! refresh expiry" as one atomic step, so concurrent requests from the same
//! identity cannot both observe the same under-limit count.
//!
//! Backend failures admit the request.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, warn};

use crate::domain::cache::CacheError;
use crate::domain::node_config::RateLimitConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    pub allowed: bool,
    /// Requests counted in the window, including this one when allowed.
    pub count: u64,
}

#[async_trait]
pub trait RateLimitBackend: Send + Sync {
    async fn check_and_record(
        &self,
        key: &str,
        limit: u64,
        window: Duration,
    ) -> Result<RateDecision, CacheError>;
}

pub fn rate_limit_key(identity: &str) -> String {
    format!("ratelimit:{identity}")
}

pub struct SlidingWindowRateLimiter {
    backend: Arc<dyn RateLimitBackend>,
    max_requests: u64,
    window: Duration,
}

impl SlidingWindowRateLimiter {
    pub fn new(backend: Arc<dyn RateLimitBackend>, max_requests: u64, window: Duration) -> Self {
        Self {
            backend,
            max_requests,
            window,
        }
    }

    pub fn from_config(backend: Arc<dyn RateLimitBackend>, config: &RateLimitConfig) -> Self {
        Self::new(
            backend,
            config.max_requests,
            Duration::from_secs(config.window_secs),
        )
    }

    pub async fn allow(&self, identity: &str) -> bool {
        match self
            .backend
            .check_and_record(&rate_limit_key(identity), self.max_requests, self.window)
            .await
        {
            Ok(decision) => {
                if !decision.allowed {
                    warn!(identity = %identity, count = decision.count, "Rate limit exceeded");
                }
                decision.allowed
            }
            Err(e) => {
                error!(identity = %identity, error = %e, "Rate limiter backend unavailable, admitting request");
                true
            }
        }
    }
}
