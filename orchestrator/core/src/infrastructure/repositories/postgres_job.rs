// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Postgres Job
//!
//! Read-side queries over the `jobs` table.

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;

use crate::domain::drone::DroneId;
use crate::domain::job::{Job, JobId, JobStatus};
use crate::domain::order::OrderId;
use crate::domain::repository::{JobRepository, RepositoryError};

pub(crate) const JOB_COLUMNS: &str =
    "id, order_id, status, reserved_by_drone_id, created_at, updated_at";

pub struct PostgresJobRepository {
    pool: PgPool,
}

impl PostgresJobRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobRepository for PostgresJobRepository {
    async fn find_by_id(&self, id: JobId) -> Result<Option<Job>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = $1"))
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| RepositoryError::Database(e.to_string()))?;

        row.as_ref().map(parse_job_row).transpose()
    }

    async fn list_open(&self) -> Result<Vec<Job>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs WHERE status = 'OPEN' ORDER BY created_at ASC"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(e.to_string()))?;

        rows.iter().map(parse_job_row).collect()
    }
}

pub(crate) fn parse_job_row(row: &PgRow) -> Result<Job, RepositoryError> {
    let status: String = row.try_get("status")?;
    let status = status
        .parse::<JobStatus>()
        .map_err(|e| RepositoryError::Serialization(e.to_string()))?;
    let reserved_by: Option<String> = row.try_get("reserved_by_drone_id")?;

    Ok(Job::restore(
        JobId(row.try_get("id")?),
        OrderId(row.try_get("order_id")?),
        status,
        reserved_by.map(DroneId),
        row.try_get("created_at")?,
        row.try_get("updated_at")?,
    ))
}
