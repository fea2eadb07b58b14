// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Shared fast key-value cache contracts.
//!
//! The cache is lossy by contract: callers treat every [`CacheError`] as a
//! miss (or a skipped write) and fall back to the durable store.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use crate::domain::drone::DroneId;
use crate::domain::location::Location;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CacheError {
    #[error("Cache backend error: {0}")]
    Backend(String),

    #[error("Cache serialization error: {0}")]
    Serialization(String),
}

impl From<redis::RedisError> for CacheError {
    fn from(err: redis::RedisError) -> Self {
        CacheError::Backend(err.to_string())
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        CacheError::Serialization(err.to_string())
    }
}

/// Last-known drone positions, keyed `drone:location:{id}`.
#[async_trait]
pub trait DroneLocationCache: Send + Sync {
    async fn get(&self, drone_id: &DroneId) -> Result<Option<Location>, CacheError>;

    async fn set(
        &self,
        drone_id: &DroneId,
        location: Location,
        ttl: Duration,
    ) -> Result<(), CacheError>;

    async fn ping(&self) -> Result<(), CacheError>;
}

pub fn drone_location_key(drone_id: &DroneId) -> String {
    format!("drone:location:{drone_id}")
}
