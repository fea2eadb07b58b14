// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::time::Duration;

use crate::domain::cache::{drone_location_key, CacheError, DroneLocationCache};
use crate::domain::drone::DroneId;
use crate::domain::location::Location;

pub struct RedisDroneLocationCache {
    conn: ConnectionManager,
}

impl RedisDroneLocationCache {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl DroneLocationCache for RedisDroneLocationCache {
    async fn get(&self, drone_id: &DroneId) -> Result<Option<Location>, CacheError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(drone_location_key(drone_id)).await?;
        raw.map(|json| serde_json::from_str(&json).map_err(CacheError::from))
            .transpose()
    }

    async fn set(
        &self,
        drone_id: &DroneId,
        location: Location,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let payload = serde_json::to_string(&location)?;
        let mut conn = self.conn.clone();
        let _: () = redis::cmd("SET")
            .arg(drone_location_key(drone_id))
            .arg(payload)
            .arg("EX")
            .arg(ttl.as_secs().max(1))
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn ping(&self) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}
