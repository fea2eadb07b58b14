// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Postgres Drone
//!
//! Read-side queries over the `drones` table.

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;
use uuid::Uuid;

use crate::domain::drone::{Drone, DroneId, DroneStatus};
use crate::domain::location::Location;
use crate::domain::order::OrderId;
use crate::domain::repository::{DroneRepository, Page, PageRequest, RepositoryError};

pub(crate) const DRONE_COLUMNS: &str =
    "id, status, latitude, longitude, current_order_id, last_heartbeat, created_at, updated_at";

pub struct PostgresDroneRepository {
    pool: PgPool,
}

impl PostgresDroneRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DroneRepository for PostgresDroneRepository {
    async fn find_by_id(&self, id: &DroneId) -> Result<Option<Drone>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {DRONE_COLUMNS} FROM drones WHERE id = $1"))
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| RepositoryError::Database(e.to_string()))?;

        row.as_ref().map(parse_drone_row).transpose()
    }

    async fn list(
        &self,
        status: Option<DroneStatus>,
        page: PageRequest,
    ) -> Result<Page<Drone>, RepositoryError> {
        let status = status.map(|s| s.as_str());

        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM drones WHERE ($1::text IS NULL OR status = $1)",
        )
        .bind(status)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(format!("Failed to count drones: {}", e)))?;

        let rows = sqlx::query(&format!(
            r#"
            SELECT {DRONE_COLUMNS}
            FROM drones
            WHERE ($1::text IS NULL OR status = $1)
            ORDER BY id
            LIMIT $2 OFFSET $3
            "#
        ))
        .bind(status)
        .bind(i64::from(page.limit))
        .bind(page.offset() as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(format!("Failed to list drones: {}", e)))?;

        Ok(Page {
            items: rows.iter().map(parse_drone_row).collect::<Result<_, _>>()?,
            total: total.max(0) as u64,
            page: page.page,
            limit: page.limit,
        })
    }
}

pub(crate) fn parse_drone_row(row: &PgRow) -> Result<Drone, RepositoryError> {
    let status: String = row.try_get("status")?;
    let status = status
        .parse::<DroneStatus>()
        .map_err(|e| RepositoryError::Serialization(e.to_string()))?;
    let current_order: Option<Uuid> = row.try_get("current_order_id")?;

    Ok(Drone::restore(
        DroneId(row.try_get("id")?),
        status,
        Location::new(row.try_get("latitude")?, row.try_get("longitude")?),
        current_order.map(OrderId),
        row.try_get("last_heartbeat")?,
        row.try_get("created_at")?,
        row.try_get("updated_at")?,
    ))
}
