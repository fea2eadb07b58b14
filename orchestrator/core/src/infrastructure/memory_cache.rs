// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! In-process versions of the shared cache contracts.
//!
//! Used by tests and by `skyhaul serve` when no Redis URL is configured.
//! Expiry is measured with `tokio::time::Instant`, so paused-clock tests can
//! advance past a TTL or rate window without sleeping.
//!
//! Redis expires keys on its own; here a [`Sweeper`] drops dead entries at
//! most once per interval, piggybacked on regular calls.

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;

use crate::domain::cache::{drone_location_key, CacheError, DroneLocationCache};
use crate::domain::drone::DroneId;
use crate::domain::location::Location;
use crate::resilience::idempotency::{CachedResponse, IdempotencyStore};
use crate::resilience::rate_limiter::{RateDecision, RateLimitBackend};

#[derive(Debug, Clone)]
struct Expiring<T> {
    value: T,
    expires_at: Instant,
}

impl<T> Expiring<T> {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

const IDEMPOTENCY_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Decides when a map is due for a full expiry pass.
#[derive(Debug)]
struct Sweeper {
    next: Mutex<Instant>,
}

impl Sweeper {
    fn new() -> Self {
        Self {
            next: Mutex::new(Instant::now()),
        }
    }

    /// At most one caller per interval gets `true`.
    fn due(&self, now: Instant, interval: Duration) -> bool {
        let mut next = self.next.lock();
        if now < *next {
            return false;
        }
        *next = now + interval;
        true
    }
}

/// Sliding-window log per key. The DashMap entry lock makes
/// trim/count/record atomic per identity.
#[derive(Debug)]
pub struct InMemoryRateLimitBackend {
    windows: DashMap<String, VecDeque<Instant>>,
    sweeper: Sweeper,
}

impl InMemoryRateLimitBackend {
    pub fn new() -> Self {
        Self {
            windows: DashMap::new(),
            sweeper: Sweeper::new(),
        }
    }

    /// Drops identities with no request inside `window`.
    fn sweep(&self, now: Instant, window: Duration) {
        self.windows.retain(|_, log| {
            log.back()
                .is_some_and(|ts| now.saturating_duration_since(*ts) < window)
        });
    }
}

impl Default for InMemoryRateLimitBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RateLimitBackend for InMemoryRateLimitBackend {
    async fn check_and_record(
        &self,
        key: &str,
        limit: u64,
        window: Duration,
    ) -> Result<RateDecision, CacheError> {
        let now = Instant::now();
        if self.sweeper.due(now, window) {
            self.sweep(now, window);
        }
        let mut log = self.windows.entry(key.to_string()).or_default();
        while log
            .front()
            .is_some_and(|ts| now.saturating_duration_since(*ts) >= window)
        {
            log.pop_front();
        }

        let count = log.len() as u64;
        if count < limit {
            log.push_back(now);
            Ok(RateDecision {
                allowed: true,
                count: count + 1,
            })
        } else {
            Ok(RateDecision {
                allowed: false,
                count,
            })
        }
    }
}

#[derive(Debug)]
pub struct InMemoryIdempotencyStore {
    entries: DashMap<String, Expiring<CachedResponse>>,
    sweeper: Sweeper,
}

impl InMemoryIdempotencyStore {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            sweeper: Sweeper::new(),
        }
    }
}

impl Default for InMemoryIdempotencyStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IdempotencyStore for InMemoryIdempotencyStore {
    async fn get(&self, key: &str) -> Result<Option<CachedResponse>, CacheError> {
        let now = Instant::now();
        Ok(self
            .entries
            .get(key)
            .filter(|e| e.is_live(now))
            .map(|e| e.value.clone()))
    }

    async fn put_if_absent(
        &self,
        key: &str,
        response: &CachedResponse,
        ttl: Duration,
    ) -> Result<bool, CacheError> {
        let now = Instant::now();
        if self.sweeper.due(now, IDEMPOTENCY_SWEEP_INTERVAL) {
            self.entries.retain(|_, e| e.is_live(now));
        }
        let mut entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| Expiring {
                value: response.clone(),
                expires_at: now,
            });
        // freshly inserted placeholders carry expires_at == now
        if entry.is_live(now) {
            return Ok(false);
        }
        *entry = Expiring {
            value: response.clone(),
            expires_at: now + ttl,
        };
        Ok(true)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryDroneLocationCache {
    entries: DashMap<String, Expiring<Location>>,
}

impl InMemoryDroneLocationCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DroneLocationCache for InMemoryDroneLocationCache {
    async fn get(&self, drone_id: &DroneId) -> Result<Option<Location>, CacheError> {
        let now = Instant::now();
        Ok(self
            .entries
            .get(&drone_location_key(drone_id))
            .filter(|e| e.is_live(now))
            .map(|e| e.value))
    }

    async fn set(
        &self,
        drone_id: &DroneId,
        location: Location,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        self.entries.insert(
            drone_location_key(drone_id),
            Expiring {
                value: location,
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn ping(&self) -> Result<(), CacheError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_sliding_window_admits_after_window_passes() {
        let backend = InMemoryRateLimitBackend::new();
        let window = Duration::from_secs(60);

        for i in 1..=3 {
            let d = backend.check_and_record("ratelimit:ip", 3, window).await.unwrap();
            assert!(d.allowed);
            assert_eq!(d.count, i);
        }
        let d = backend.check_and_record("ratelimit:ip", 3, window).await.unwrap();
        assert!(!d.allowed);
        assert_eq!(d.count, 3);

        // rejected requests are not recorded
        tokio::time::advance(Duration::from_secs(60)).await;
        let d = backend.check_and_record("ratelimit:ip", 3, window).await.unwrap();
        assert!(d.allowed);
        assert_eq!(d.count, 1);
    }

    #[tokio::test]
    async fn test_rate_windows_are_per_key() {
        let backend = InMemoryRateLimitBackend::new();
        let window = Duration::from_secs(60);
        assert!(backend.check_and_record("a", 1, window).await.unwrap().allowed);
        assert!(!backend.check_and_record("a", 1, window).await.unwrap().allowed);
        assert!(backend.check_and_record("b", 1, window).await.unwrap().allowed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_idempotency_set_if_absent_and_expiry() {
        let store = InMemoryIdempotencyStore::new();
        let first = CachedResponse {
            status: 201,
            content_type: None,
            body: b"first".to_vec(),
        };
        let second = CachedResponse {
            body: b"second".to_vec(),
            ..first.clone()
        };
        let ttl = Duration::from_secs(300);

        assert!(store.put_if_absent("k", &first, ttl).await.unwrap());
        assert!(!store.put_if_absent("k", &second, ttl).await.unwrap());
        assert_eq!(store.get("k").await.unwrap().unwrap().body, b"first");

        tokio::time::advance(ttl).await;
        assert!(store.get("k").await.unwrap().is_none());
        assert!(store.put_if_absent("k", &second, ttl).await.unwrap());
        assert_eq!(store.get("k").await.unwrap().unwrap().body, b"second");
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_state_is_swept() {
        let rates = InMemoryRateLimitBackend::new();
        let store = InMemoryIdempotencyStore::new();
        let window = Duration::from_secs(1);
        let response = CachedResponse {
            status: 201,
            content_type: None,
            body: b"{}".to_vec(),
        };

        for i in 0..1_000 {
            rates
                .check_and_record(&format!("ratelimit:10.0.{}.{}", i / 256, i % 256), 5, window)
                .await
                .unwrap();
            store
                .put_if_absent(&format!("idempotency:alice:{i}"), &response, window)
                .await
                .unwrap();
        }
        assert_eq!(rates.windows.len(), 1_000);
        assert_eq!(store.entries.len(), 1_000);

        tokio::time::advance(Duration::from_secs(3600)).await;
        rates.check_and_record("ratelimit:fresh", 5, window).await.unwrap();
        store
            .put_if_absent("idempotency:alice:fresh", &response, window)
            .await
            .unwrap();

        assert_eq!(rates.windows.len(), 1);
        assert_eq!(store.entries.len(), 1);
    }

    #[tokio::test]
    async fn test_sweep_keeps_live_windows() {
        let rates = InMemoryRateLimitBackend::new();
        let window = Duration::from_secs(60);
        assert!(rates.check_and_record("a", 1, window).await.unwrap().allowed);
        rates.sweep(Instant::now(), window);
        assert!(!rates.check_and_record("a", 1, window).await.unwrap().allowed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drone_location_ttl() {
        let cache = InMemoryDroneLocationCache::new();
        let id = DroneId::new("d1");
        cache
            .set(&id, Location::new(24.7, 46.6), Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(cache.get(&id).await.unwrap(), Some(Location::new(24.7, 46.6)));

        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(cache.get(&id).await.unwrap().is_none());
    }
}
