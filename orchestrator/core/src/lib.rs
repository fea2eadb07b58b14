// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Skyhaul Core
//!
//! Drone delivery dispatch: order, drone and job aggregates, the delivery
//! orchestrator that moves them together atomically, and the admission
//! pipeline (circuit breaker, bulkhead, rate limit, idempotent replay) that
//! guards the HTTP API.
//!
//! # Architecture
//!
//! - **domain** - aggregates, state machines and storage/cache contracts
//! - **application** - orchestrator and per-aggregate services
//! - **infrastructure** - PostgreSQL, Redis, in-memory and routing adapters
//! - **resilience** - framework-free admission primitives
//! - **presentation** - axum router and middleware

pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod presentation;
pub mod resilience;
