// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Postgres Order
//!
//! Read-side queries over the `orders` table. Writes go through
//! `PostgresDeliveryStore`.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure Layer
//! - **Purpose:** Implements `OrderRepository`

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;

use crate::domain::drone::DroneId;
use crate::domain::location::Location;
use crate::domain::order::{Order, OrderId, OrderStatus};
use crate::domain::repository::{OrderRepository, Page, PageRequest, RepositoryError};

pub(crate) const ORDER_COLUMNS: &str = "id, submitted_by, origin_lat, origin_lng, dest_lat, dest_lng, \
     status, assigned_drone_id, created_at, updated_at";

pub struct PostgresOrderRepository {
    pool: PgPool,
}

impl PostgresOrderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OrderRepository for PostgresOrderRepository {
    async fn find_by_id(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| RepositoryError::Database(e.to_string()))?;

        row.as_ref().map(parse_order_row).transpose()
    }

    async fn find_by_submitter(&self, submitted_by: &str) -> Result<Vec<Order>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE submitted_by = $1 ORDER BY created_at DESC"
        ))
        .bind(submitted_by)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(e.to_string()))?;

        rows.iter().map(parse_order_row).collect()
    }

    async fn list(
        &self,
        status: Option<OrderStatus>,
        page: PageRequest,
    ) -> Result<Page<Order>, RepositoryError> {
        let status = status.map(|s| s.as_str());

        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM orders WHERE ($1::text IS NULL OR status = $1)",
        )
        .bind(status)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(format!("Failed to count orders: {}", e)))?;

        let rows = sqlx::query(&format!(
            r#"
            SELECT {ORDER_COLUMNS}
            FROM orders
            WHERE ($1::text IS NULL OR status = $1)
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#
        ))
        .bind(status)
        .bind(i64::from(page.limit))
        .bind(page.offset() as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(format!("Failed to list orders: {}", e)))?;

        Ok(Page {
            items: rows.iter().map(parse_order_row).collect::<Result<_, _>>()?,
            total: total.max(0) as u64,
            page: page.page,
            limit: page.limit,
        })
    }
}

pub(crate) fn parse_order_row(row: &PgRow) -> Result<Order, RepositoryError> {
    let status: String = row.try_get("status")?;
    let status = status
        .parse::<OrderStatus>()
        .map_err(|e| RepositoryError::Serialization(e.to_string()))?;
    let assigned: Option<String> = row.try_get("assigned_drone_id")?;
    let created_at: DateTime<Utc> = row.try_get("created_at")?;
    let updated_at: DateTime<Utc> = row.try_get("updated_at")?;

    Ok(Order::restore(
        OrderId(row.try_get("id")?),
        row.try_get("submitted_by")?,
        Location::new(row.try_get("origin_lat")?, row.try_get("origin_lng")?),
        Location::new(row.try_get("dest_lat")?, row.try_get("dest_lng")?),
        status,
        assigned.map(DroneId),
        created_at,
        updated_at,
    ))
}
