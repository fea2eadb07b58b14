// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Postgres Delivery Store
//!
//! Each [`UnitOfWork`] wraps one `sqlx` transaction. `lock_*` reads use
//! `SELECT ... FOR UPDATE`, so a competing transaction on the same row blocks
//! until this one finishes and then re-reads the committed state. The
//! withdraw and job-cancel helpers are single guarded `UPDATE`s.
//!
//! Dropping the unit drops the `Transaction`, which rolls back.

use async_trait::async_trait;
use sqlx::postgres::{PgPool, Postgres};
use sqlx::Transaction;

use super::postgres_drone::{parse_drone_row, DRONE_COLUMNS};
use super::postgres_job::{parse_job_row, JOB_COLUMNS};
use super::postgres_order::{parse_order_row, ORDER_COLUMNS};
use crate::domain::drone::{Drone, DroneId};
use crate::domain::job::{Job, JobId};
use crate::domain::order::{Order, OrderId};
use crate::domain::repository::{DeliveryStore, RepositoryError, UnitOfWork};

#[derive(Clone)]
pub struct PostgresDeliveryStore {
    pool: PgPool,
}

impl PostgresDeliveryStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DeliveryStore for PostgresDeliveryStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, RepositoryError> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| RepositoryError::from_sqlx("Failed to begin transaction", e))?;
        Ok(Box::new(PostgresUnitOfWork { tx }))
    }

    async fn ping(&self) -> Result<(), RepositoryError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

pub struct PostgresUnitOfWork {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl UnitOfWork for PostgresUnitOfWork {
    async fn lock_order(&mut self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1 FOR UPDATE"
        ))
        .bind(id.0)
        .fetch_optional(&mut *self.tx)
        .await?;

        row.as_ref().map(parse_order_row).transpose()
    }

    async fn lock_job(&mut self, id: JobId) -> Result<Option<Job>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = $1 FOR UPDATE"))
            .bind(id.0)
            .fetch_optional(&mut *self.tx)
            .await?;

        row.as_ref().map(parse_job_row).transpose()
    }

    async fn lock_drone(&mut self, id: &DroneId) -> Result<Option<Drone>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {DRONE_COLUMNS} FROM drones WHERE id = $1 FOR UPDATE"
        ))
        .bind(id.as_str())
        .fetch_optional(&mut *self.tx)
        .await?;

        row.as_ref().map(parse_drone_row).transpose()
    }

    async fn lock_latest_job_for_order(
        &mut self,
        order_id: OrderId,
    ) -> Result<Option<Job>, RepositoryError> {
        let row = sqlx::query(&format!(
            r#"
            SELECT {JOB_COLUMNS}
            FROM jobs
            WHERE order_id = $1 AND status <> 'CANCELLED'
            ORDER BY created_at DESC
            LIMIT 1
            FOR UPDATE
            "#
        ))
        .bind(order_id.0)
        .fetch_optional(&mut *self.tx)
        .await?;

        row.as_ref().map(parse_job_row).transpose()
    }

    async fn insert_order(&mut self, order: &Order) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO orders (
                id, submitted_by, origin_lat, origin_lng, dest_lat, dest_lng,
                status, assigned_drone_id, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(order.id.0)
        .bind(&order.submitted_by)
        .bind(order.origin.lat)
        .bind(order.origin.lng)
        .bind(order.destination.lat)
        .bind(order.destination.lng)
        .bind(order.status().as_str())
        .bind(order.assigned_drone().map(|d| d.as_str()))
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| RepositoryError::from_sqlx("Failed to insert order", e))?;

        Ok(())
    }

    async fn update_order(&mut self, order: &Order) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r#"
            UPDATE orders
            SET origin_lat = $2, origin_lng = $3, dest_lat = $4, dest_lng = $5,
                status = $6, assigned_drone_id = $7, updated_at = $8
            WHERE id = $1
            "#,
        )
        .bind(order.id.0)
        .bind(order.origin.lat)
        .bind(order.origin.lng)
        .bind(order.destination.lat)
        .bind(order.destination.lng)
        .bind(order.status().as_str())
        .bind(order.assigned_drone().map(|d| d.as_str()))
        .bind(order.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| RepositoryError::from_sqlx("Failed to update order", e))?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound {
                entity: "order",
                id: order.id.to_string(),
            });
        }
        Ok(())
    }

    async fn insert_job(&mut self, job: &Job) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO jobs (id, order_id, status, reserved_by_drone_id, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(job.id.0)
        .bind(job.order_id.0)
        .bind(job.status().as_str())
        .bind(job.reserved_by().map(|d| d.as_str()))
        .bind(job.created_at)
        .bind(job.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| RepositoryError::from_sqlx("Failed to insert job", e))?;

        Ok(())
    }

    async fn update_job(&mut self, job: &Job) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET status = $2, reserved_by_drone_id = $3, updated_at = $4
            WHERE id = $1
            "#,
        )
        .bind(job.id.0)
        .bind(job.status().as_str())
        .bind(job.reserved_by().map(|d| d.as_str()))
        .bind(job.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| RepositoryError::from_sqlx("Failed to update job", e))?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound {
                entity: "job",
                id: job.id.to_string(),
            });
        }
        Ok(())
    }

    async fn save_drone(&mut self, drone: &Drone) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO drones (
                id, status, latitude, longitude, current_order_id,
                last_heartbeat, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (id) DO UPDATE SET
                status = EXCLUDED.status,
                latitude = EXCLUDED.latitude,
                longitude = EXCLUDED.longitude,
                current_order_id = EXCLUDED.current_order_id,
                last_heartbeat = EXCLUDED.last_heartbeat,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(drone.id.as_str())
        .bind(drone.status().as_str())
        .bind(drone.location.lat)
        .bind(drone.location.lng)
        .bind(drone.current_order().map(|o| o.0))
        .bind(drone.last_heartbeat)
        .bind(drone.created_at)
        .bind(drone.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| RepositoryError::from_sqlx("Failed to save drone", e))?;

        Ok(())
    }

    async fn withdraw_order_if_pending(
        &mut self,
        id: OrderId,
        requester: &str,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            r#"
            UPDATE orders
            SET status = 'WITHDRAWN', updated_at = NOW()
            WHERE id = $1 AND status = 'PENDING' AND submitted_by = $2
            "#,
        )
        .bind(id.0)
        .bind(requester)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| RepositoryError::from_sqlx("Failed to withdraw order", e))?;

        Ok(result.rows_affected() > 0)
    }

    async fn cancel_active_jobs(&mut self, order_id: OrderId) -> Result<u64, RepositoryError> {
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'CANCELLED', reserved_by_drone_id = NULL, updated_at = NOW()
            WHERE order_id = $1 AND status IN ('OPEN', 'RESERVED')
            "#,
        )
        .bind(order_id.0)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| RepositoryError::from_sqlx("Failed to cancel jobs", e))?;

        Ok(result.rows_affected())
    }

    async fn commit(self: Box<Self>) -> Result<(), RepositoryError> {
        self.tx
            .commit()
            .await
            .map_err(|e| RepositoryError::from_sqlx("Failed to commit", e))
    }
}
