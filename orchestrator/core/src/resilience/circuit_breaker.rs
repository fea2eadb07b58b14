// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Per-Route Circuit Breaker
//!
//! ```text
//!            failures >= threshold
//!   CLOSED ─────────────────────────► OPEN
//!     ▲                                 │ cooldown elapsed
//!     │ probe succeeded                 ▼ (one request admitted)
//!     └──────────────────────────── HALF_OPEN
//!                 probe failed ──► OPEN (cooldown restarts)
//! ```
//!
//! Every admitted request gets a [`BreakerTicket`] stamped with the breaker's
//! generation. The generation advances on each state change, so an outcome
//! reported for a request that was admitted before the last change is
//! discarded. Only the probe can close or re-open a half-open breaker.
//!
//! All `*_at` methods take the current instant explicitly; the plain variants
//! call them with `Instant::now()`.

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::domain::node_config::CircuitBreakerConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerSettings {
    pub failure_threshold: u32,
    pub cooldown: Duration,
}

/// How a finished request should count against its breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallOutcome {
    Success,
    Failure,
    /// Rejected by admission control before any real work happened.
    Ignored,
}

impl CallOutcome {
    pub fn from_status(status: u16) -> Self {
        if status >= 500 {
            Self::Failure
        } else {
            Self::Success
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use = "report the outcome with CircuitBreaker::record"]
pub struct BreakerTicket {
    generation: u64,
    probe: bool,
}

impl BreakerTicket {
    pub fn is_probe(&self) -> bool {
        self.probe
    }
}

#[derive(Debug)]
struct BreakerInner {
    state: BreakerState,
    consecutive_failures: u32,
    /// When the breaker last opened, or when the current probe was admitted.
    since: Instant,
    generation: u64,
}

#[derive(Debug)]
pub struct CircuitBreaker {
    settings: BreakerSettings,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(settings: BreakerSettings) -> Self {
        Self {
            settings,
            inner: Mutex::new(BreakerInner {
                state: BreakerState::Closed,
                consecutive_failures: 0,
                since: Instant::now(),
                generation: 0,
            }),
        }
    }

    pub fn settings(&self) -> BreakerSettings {
        self.settings
    }

    pub fn state(&self) -> BreakerState {
        self.inner.lock().state
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.inner.lock().consecutive_failures
    }

    pub fn try_acquire(&self) -> Option<BreakerTicket> {
        self.try_acquire_at(Instant::now())
    }

    /// `None` means the request must be rejected without reaching downstream.
    pub fn try_acquire_at(&self, now: Instant) -> Option<BreakerTicket> {
        let mut inner = self.inner.lock();
        match inner.state {
            BreakerState::Closed => Some(BreakerTicket {
                generation: inner.generation,
                probe: false,
            }),
            // A probe that never reported back (client went away) is
            // considered lost after another cooldown and replaced.
            BreakerState::Open | BreakerState::HalfOpen
                if now.saturating_duration_since(inner.since) >= self.settings.cooldown =>
            {
                Self::transition(&mut inner, BreakerState::HalfOpen, now);
                Some(BreakerTicket {
                    generation: inner.generation,
                    probe: true,
                })
            }
            BreakerState::Open | BreakerState::HalfOpen => None,
        }
    }

    pub fn record(&self, ticket: BreakerTicket, outcome: CallOutcome) -> BreakerState {
        self.record_at(ticket, outcome, Instant::now())
    }

    /// Returns the state after applying the outcome.
    pub fn record_at(&self, ticket: BreakerTicket, outcome: CallOutcome, now: Instant) -> BreakerState {
        let mut inner = self.inner.lock();
        if ticket.generation != inner.generation {
            return inner.state;
        }

        match (inner.state, outcome) {
            (_, CallOutcome::Ignored) if ticket.probe => {
                // The probe never exercised the route. Reopen without a new
                // cooldown so the next request probes instead.
                let cooled = now
                    .checked_sub(self.settings.cooldown)
                    .unwrap_or(inner.since);
                Self::transition(&mut inner, BreakerState::Open, cooled);
            }
            (_, CallOutcome::Ignored) => {}
            (BreakerState::Closed, CallOutcome::Success) => {
                inner.consecutive_failures = 0;
            }
            (BreakerState::Closed, CallOutcome::Failure) => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.settings.failure_threshold {
                    Self::transition(&mut inner, BreakerState::Open, now);
                }
            }
            (BreakerState::HalfOpen, CallOutcome::Success) => {
                Self::transition(&mut inner, BreakerState::Closed, now);
            }
            (BreakerState::HalfOpen, CallOutcome::Failure) => {
                Self::transition(&mut inner, BreakerState::Open, now);
            }
            (BreakerState::Open, _) => {}
        }
        inner.state
    }

    fn transition(inner: &mut BreakerInner, to: BreakerState, now: Instant) {
        inner.state = to;
        inner.since = now;
        inner.generation += 1;
        if to != BreakerState::HalfOpen {
            inner.consecutive_failures = 0;
        }
    }
}

/// Lazily creates one breaker per route key.
#[derive(Debug)]
pub struct CircuitBreakerRegistry {
    defaults: BreakerSettings,
    overrides: HashMap<String, BreakerSettings>,
    breakers: DashMap<String, Arc<CircuitBreaker>>,
}

impl CircuitBreakerRegistry {
    pub fn new(defaults: BreakerSettings) -> Self {
        Self {
            defaults,
            overrides: HashMap::new(),
            breakers: DashMap::new(),
        }
    }

    pub fn from_config(config: &CircuitBreakerConfig) -> Self {
        let defaults = BreakerSettings {
            failure_threshold: config.failure_threshold,
            cooldown: config.cooldown(),
        };
        let overrides = config
            .overrides
            .iter()
            .map(|(route, o)| {
                (
                    route.clone(),
                    BreakerSettings {
                        failure_threshold: o.failure_threshold.unwrap_or(defaults.failure_threshold),
                        cooldown: o
                            .cooldown_secs
                            .map(Duration::from_secs)
                            .unwrap_or(defaults.cooldown),
                    },
                )
            })
            .collect();
        Self {
            defaults,
            overrides,
            breakers: DashMap::new(),
        }
    }

    pub fn with_override(mut self, route: impl Into<String>, settings: BreakerSettings) -> Self {
        self.overrides.insert(route.into(), settings);
        self
    }

    pub fn get(&self, route: &str) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.breakers.get(route) {
            return existing.clone();
        }
        self.breakers
            .entry(route.to_string())
            .or_insert_with(|| {
                let settings = self.overrides.get(route).copied().unwrap_or(self.defaults);
                Arc::new(CircuitBreaker::new(settings))
            })
            .clone()
    }

    /// Current state of every breaker created so far, ordered by route.
    pub fn snapshot(&self) -> Vec<(String, BreakerState)> {
        let mut states: Vec<_> = self
            .breakers
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().state()))
            .collect();
        states.sort_by(|a, b| a.0.cmp(&b.0));
        states
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(threshold: u32, cooldown_secs: u64) -> CircuitBreaker {
        CircuitBreaker::new(BreakerSettings {
            failure_threshold: threshold,
            cooldown: Duration::from_secs(cooldown_secs),
        })
    }

    fn fail(cb: &CircuitBreaker, now: Instant) -> BreakerState {
        let ticket = cb.try_acquire_at(now).expect("admitted");
        cb.record_at(ticket, CallOutcome::Failure, now)
    }

    #[test]
    fn test_trips_after_threshold_consecutive_failures() {
        let cb = breaker(5, 30);
        let t0 = Instant::now();
        for _ in 0..4 {
            assert_eq!(fail(&cb, t0), BreakerState::Closed);
        }
        assert_eq!(fail(&cb, t0), BreakerState::Open);
        assert!(cb.try_acquire_at(t0 + Duration::from_secs(1)).is_none());
    }

    #[test]
    fn test_success_resets_consecutive_count() {
        let cb = breaker(3, 30);
        let t0 = Instant::now();
        fail(&cb, t0);
        fail(&cb, t0);
        let ok = cb.try_acquire_at(t0).unwrap();
        cb.record_at(ok, CallOutcome::Success, t0);
        assert_eq!(cb.consecutive_failures(), 0);
        fail(&cb, t0);
        fail(&cb, t0);
        assert_eq!(cb.state(), BreakerState::Closed);
    }

    #[test]
    fn test_single_probe_after_cooldown() {
        let cb = breaker(1, 30);
        let t0 = Instant::now();
        fail(&cb, t0);

        assert!(cb.try_acquire_at(t0 + Duration::from_secs(29)).is_none());

        let after = t0 + Duration::from_secs(30);
        let probe = cb.try_acquire_at(after).expect("probe admitted");
        assert!(probe.is_probe());
        assert_eq!(cb.state(), BreakerState::HalfOpen);
        assert!(cb.try_acquire_at(after).is_none(), "only one probe");

        assert_eq!(cb.record_at(probe, CallOutcome::Success, after), BreakerState::Closed);
        assert!(cb.try_acquire_at(after).is_some());
    }

    #[test]
    fn test_failed_probe_restarts_cooldown() {
        let cb = breaker(1, 30);
        let t0 = Instant::now();
        fail(&cb, t0);

        let t1 = t0 + Duration::from_secs(31);
        let probe = cb.try_acquire_at(t1).unwrap();
        assert_eq!(cb.record_at(probe, CallOutcome::Failure, t1), BreakerState::Open);
        assert!(cb.try_acquire_at(t1 + Duration::from_secs(29)).is_none());
        assert!(cb.try_acquire_at(t1 + Duration::from_secs(30)).is_some());
    }

    #[test]
    fn test_stale_outcomes_are_ignored() {
        let cb = breaker(2, 30);
        let t0 = Instant::now();
        let slow = cb.try_acquire_at(t0).unwrap();
        fail(&cb, t0);
        fail(&cb, t0);
        assert_eq!(cb.state(), BreakerState::Open);

        // A request admitted while closed finishes after the trip.
        assert_eq!(cb.record_at(slow, CallOutcome::Success, t0), BreakerState::Open);

        let t1 = t0 + Duration::from_secs(30);
        let probe = cb.try_acquire_at(t1).unwrap();
        // Same stale ticket cannot close the half-open breaker either.
        assert_eq!(cb.record_at(slow, CallOutcome::Success, t1), BreakerState::HalfOpen);
        assert_eq!(cb.record_at(probe, CallOutcome::Success, t1), BreakerState::Closed);
    }

    #[test]
    fn test_ignored_probe_lets_next_request_probe() {
        let cb = breaker(1, 30);
        let t0 = Instant::now();
        fail(&cb, t0);

        let t1 = t0 + Duration::from_secs(40);
        let probe = cb.try_acquire_at(t1).unwrap();
        assert_eq!(cb.record_at(probe, CallOutcome::Ignored, t1), BreakerState::Open);
        let next = cb.try_acquire_at(t1).expect("next request probes");
        assert!(next.is_probe());
    }

    #[test]
    fn test_lost_probe_is_replaced_after_cooldown() {
        let cb = breaker(1, 30);
        let t0 = Instant::now();
        fail(&cb, t0);
        let t1 = t0 + Duration::from_secs(30);
        let _lost = cb.try_acquire_at(t1).unwrap();
        assert!(cb.try_acquire_at(t1 + Duration::from_secs(10)).is_none());
        assert!(cb.try_acquire_at(t1 + Duration::from_secs(30)).is_some());
    }

    #[test]
    fn test_registry_isolates_routes_and_applies_overrides() {
        let registry = CircuitBreakerRegistry::new(BreakerSettings {
            failure_threshold: 5,
            cooldown: Duration::from_secs(30),
        })
        .with_override(
            "/drone/me/heartbeat",
            BreakerSettings {
                failure_threshold: 2,
                cooldown: Duration::from_secs(5),
            },
        );

        let orders = registry.get("/orders");
        let again = registry.get("/orders");
        assert!(Arc::ptr_eq(&orders, &again));
        assert_eq!(registry.get("/drone/me/heartbeat").settings().failure_threshold, 2);

        let t0 = Instant::now();
        for _ in 0..5 {
            fail(&orders, t0);
        }
        assert_eq!(orders.state(), BreakerState::Open);
        assert_eq!(registry.get("/admin/orders").state(), BreakerState::Closed);
        assert_eq!(
            registry.snapshot(),
            vec![
                ("/admin/orders".to_string(), BreakerState::Closed),
                ("/drone/me/heartbeat".to_string(), BreakerState::Closed),
                ("/orders".to_string(), BreakerState::Open),
            ]
        );
    }
}
