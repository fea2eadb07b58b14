// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Domain Repository Interfaces
//!
//! Persistence contracts for the three dispatch aggregates. Reads that only
//! serve queries go through the per-aggregate repositories; anything that
//! changes state goes through a [`UnitOfWork`] opened from a [`DeliveryStore`].
//!
//! | Trait | Aggregate | Implementations |
//! |-------|-----------|----------------|
//! | `OrderRepository` | `Order` | `InMemoryDeliveryStore`, `PostgresOrderRepository` |
//! | `DroneRepository` | `Drone` | `InMemoryDeliveryStore`, `PostgresDroneRepository` |
//! | `JobRepository` | `Job` | `InMemoryDeliveryStore`, `PostgresJobRepository` |
//! | `DeliveryStore` | all three | `InMemoryDeliveryStore`, `PostgresDeliveryStore` |
//!
//! ## Unit of work
//!
//! Every `lock_*` read inside a unit is load-for-update: a concurrent unit
//! touching the same row waits until this one commits or is dropped. Dropping
//! a unit without calling [`UnitOfWork::commit`] rolls back every write made
//! through it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::drone::{Drone, DroneId, DroneStatus};
use crate::domain::job::{Job, JobId};
use crate::domain::order::{Order, OrderId, OrderStatus};

/// 1-based page selector used by the admin listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub page: u32,
    pub limit: u32,
}

impl PageRequest {
    pub const MAX_LIMIT: u32 = 100;

    pub fn new(page: u32, limit: u32) -> Self {
        Self {
            page: page.max(1),
            limit: limit.clamp(1, Self::MAX_LIMIT),
        }
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.limit)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(1, 20)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub limit: u32,
}

#[async_trait]
pub trait OrderRepository: Send + Sync {
    async fn find_by_id(&self, id: OrderId) -> Result<Option<Order>, RepositoryError>;

    /// Newest first.
    async fn find_by_submitter(&self, submitted_by: &str) -> Result<Vec<Order>, RepositoryError>;

    async fn list(
        &self,
        status: Option<OrderStatus>,
        page: PageRequest,
    ) -> Result<Page<Order>, RepositoryError>;
}

#[async_trait]
pub trait DroneRepository: Send + Sync {
    async fn find_by_id(&self, id: &DroneId) -> Result<Option<Drone>, RepositoryError>;

    async fn list(
        &self,
        status: Option<DroneStatus>,
        page: PageRequest,
    ) -> Result<Page<Drone>, RepositoryError>;
}

#[async_trait]
pub trait JobRepository: Send + Sync {
    async fn find_by_id(&self, id: JobId) -> Result<Option<Job>, RepositoryError>;

    /// Oldest first, so long-waiting work is offered before fresh work.
    async fn list_open(&self) -> Result<Vec<Job>, RepositoryError>;
}

/// Factory for atomic units of work spanning orders, jobs and drones.
#[async_trait]
pub trait DeliveryStore: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, RepositoryError>;

    /// Cheap liveness probe for `/health`.
    async fn ping(&self) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait UnitOfWork: Send {
    async fn lock_order(&mut self, id: OrderId) -> Result<Option<Order>, RepositoryError>;

    async fn lock_job(&mut self, id: JobId) -> Result<Option<Job>, RepositoryError>;

    async fn lock_drone(&mut self, id: &DroneId) -> Result<Option<Drone>, RepositoryError>;

    /// Most recently created job of the order that is not `CANCELLED`.
    async fn lock_latest_job_for_order(
        &mut self,
        order_id: OrderId,
    ) -> Result<Option<Job>, RepositoryError>;

    async fn insert_order(&mut self, order: &Order) -> Result<(), RepositoryError>;

    async fn update_order(&mut self, order: &Order) -> Result<(), RepositoryError>;

    async fn insert_job(&mut self, job: &Job) -> Result<(), RepositoryError>;

    async fn update_job(&mut self, job: &Job) -> Result<(), RepositoryError>;

    /// Insert or overwrite.
    async fn save_drone(&mut self, drone: &Drone) -> Result<(), RepositoryError>;

    /// Move the order to `WITHDRAWN` only if it is still `PENDING` and was
    /// submitted by `requester`. Returns whether a row matched.
    async fn withdraw_order_if_pending(
        &mut self,
        id: OrderId,
        requester: &str,
    ) -> Result<bool, RepositoryError>;

    /// Cancel every `OPEN` or `RESERVED` job of the order, returning how many
    /// changed.
    async fn cancel_active_jobs(&mut self, order_id: OrderId) -> Result<u64, RepositoryError>;

    async fn commit(self: Box<Self>) -> Result<(), RepositoryError>;
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RepositoryError {
    #[error("{entity} with id {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("Database error: {0}")]
    Database(String),

    /// The database aborted the transaction to break a lock cycle or a
    /// serialization conflict. Retrying the whole unit is safe.
    #[error("Lock contention: {0}")]
    Contention(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

/// Postgres SQLSTATEs for `deadlock_detected` and `serialization_failure`.
pub(crate) fn is_contention_code(code: &str) -> bool {
    matches!(code, "40P01" | "40001")
}

impl RepositoryError {
    pub fn from_sqlx(context: &str, err: sqlx::Error) -> Self {
        let contended = err
            .as_database_error()
            .and_then(|db| db.code())
            .is_some_and(|code| is_contention_code(&code));
        let message = format!("{context}: {err}");
        if contended {
            RepositoryError::Contention(message)
        } else {
            RepositoryError::Database(message)
        }
    }
}

impl From<sqlx::Error> for RepositoryError {
    fn from(err: sqlx::Error) -> Self {
        RepositoryError::from_sqlx("Query failed", err)
    }
}

impl From<serde_json::Error> for RepositoryError {
    fn from(err: serde_json::Error) -> Self {
        RepositoryError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_request_clamps() {
        let page = PageRequest::new(0, 0);
        assert_eq!(page.page, 1);
        assert_eq!(page.limit, 1);
        assert_eq!(page.offset(), 0);

        let page = PageRequest::new(3, 500);
        assert_eq!(page.limit, PageRequest::MAX_LIMIT);
        assert_eq!(page.offset(), 200);
    }

    #[test]
    fn test_contention_codes() {
        assert!(is_contention_code("40P01"));
        assert!(is_contention_code("40001"));
        assert!(!is_contention_code("23505"));

        let err = RepositoryError::from_sqlx("Failed to lock order", sqlx::Error::RowNotFound);
        assert!(matches!(err, RepositoryError::Database(msg) if msg.starts_with("Failed to lock order")));
    }
}
