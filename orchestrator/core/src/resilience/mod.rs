// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Request Admission and Resilience
//!
//! Framework-free primitives that decide whether a request may run:
//!
//! | Stage | Type | Rejection |
//! |-------|------|-----------|
//! | Circuit breaker (per route) | [`CircuitBreakerRegistry`] | 503 `CIRCUIT_OPEN` |
//! | Rate limit (per client) | [`SlidingWindowRateLimiter`] | 429 `RATE_LIMITED` |
//! | Bulkhead (per workload class) | [`BulkheadRegistry`] | 503 `CAPACITY_EXCEEDED` |
//! | Idempotent replay | [`IdempotencyCache`] | never rejects |
//!
//! [`ResiliencePipeline`] owns one instance of each. It is built once per
//! process (or per test) and handed to the HTTP layer; nothing here is global.
//! The axum bindings live in `crate::presentation::middleware`.

pub mod bulkhead;
pub mod circuit_breaker;
pub mod idempotency;
pub mod rate_limiter;

pub use bulkhead::{BulkheadPermit, BulkheadRegistry, WorkloadClass};
pub use circuit_breaker::{
    BreakerSettings, BreakerState, BreakerTicket, CallOutcome, CircuitBreaker,
    CircuitBreakerRegistry,
};
pub use idempotency::{CachedResponse, IdempotencyCache, IdempotencyStore, IDEMPOTENCY_HEADER};
pub use rate_limiter::{RateDecision, RateLimitBackend, SlidingWindowRateLimiter};

use std::sync::Arc;

use crate::domain::node_config::ResilienceConfig;

pub struct ResiliencePipeline {
    pub breakers: CircuitBreakerRegistry,
    pub bulkheads: BulkheadRegistry,
    pub rate_limiter: SlidingWindowRateLimiter,
    pub idempotency: IdempotencyCache,
}

impl ResiliencePipeline {
    pub fn new(
        breakers: CircuitBreakerRegistry,
        bulkheads: BulkheadRegistry,
        rate_limiter: SlidingWindowRateLimiter,
        idempotency: IdempotencyCache,
    ) -> Self {
        Self {
            breakers,
            bulkheads,
            rate_limiter,
            idempotency,
        }
    }

    pub fn from_config(
        config: &ResilienceConfig,
        rate_backend: Arc<dyn RateLimitBackend>,
        idempotency_store: Arc<dyn IdempotencyStore>,
    ) -> Self {
        Self::new(
            CircuitBreakerRegistry::from_config(&config.circuit_breaker),
            BulkheadRegistry::from_config(&config.bulkhead),
            SlidingWindowRateLimiter::from_config(rate_backend, &config.rate_limit),
            IdempotencyCache::from_config(idempotency_store, &config.idempotency),
        )
    }
}
