// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Redis-backed implementations of the shared cache contracts.
//!
//! All three adapters share one multiplexed [`ConnectionManager`], which
//! reconnects on its own after a dropped connection. Callers treat every
//! error as a cache outage.

pub mod drone_location;
pub mod idempotency;
pub mod rate_limiter;

pub use drone_location::RedisDroneLocationCache;
pub use idempotency::RedisIdempotencyStore;
pub use rate_limiter::RedisRateLimitBackend;

use anyhow::{Context, Result};
use redis::aio::ConnectionManager;

pub async fn connect(url: &str) -> Result<ConnectionManager> {
    let client = redis::Client::open(url).context("Invalid Redis URL")?;
    let manager = ConnectionManager::new(client)
        .await
        .context("Failed to connect to Redis")?;
    tracing::info!("Connected to Redis");
    Ok(manager)
}
