// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod db;
pub mod memory_cache;
pub mod redis;
pub mod repositories;
pub mod routing;

pub use memory_cache::{InMemoryDroneLocationCache, InMemoryIdempotencyStore, InMemoryRateLimitBackend};
pub use repositories::InMemoryDeliveryStore;
pub use routing::MapboxRouteClient;
