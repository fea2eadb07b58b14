// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Domain layer: dispatch aggregates, their errors, and the ports the
//! application layer drives (storage, caches, routing).
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** State machines and persistence contracts

pub mod cache;
pub mod drone;
pub mod error;
pub mod job;
pub mod location;
pub mod node_config;
pub mod order;
pub mod repository;
pub mod routing;
