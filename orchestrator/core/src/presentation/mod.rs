// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Presentation Layer (`skyhaul-core`)
//!
//! HTTP surface that translates external requests into application service
//! calls. **No business logic lives here**; all real work is delegated to
//! `crate::application`.
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`api`] | Axum router, route groups and JSON handlers |
//! | [`auth`] | HS256 bearer tokens and caller roles |
//! | [`middleware`] | Breaker, rate limit, auth, role, bulkhead and idempotency layers |
//! | [`error`] | `{"error": {"code", "message"}}` envelope |

pub mod api;
pub mod auth;
pub mod error;
pub mod middleware;
