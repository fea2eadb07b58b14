// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Repository Implementations
//!
//! Infrastructure implementations of the repository and unit-of-work
//! contracts defined in `crate::domain::repository`.
//!
//! # Available Implementations
//!
//! ## PostgreSQL
//!
//! - **PostgresOrderRepository** / **PostgresDroneRepository** /
//!   **PostgresJobRepository** - read-side queries
//! - **PostgresDeliveryStore** - transactional units of work using
//!   `SELECT ... FOR UPDATE` and guarded `UPDATE`s
//!
//! ## In-Memory
//!
//! - **InMemoryDeliveryStore** - single store implementing every contract,
//!   used by tests and `skyhaul serve --in-memory`
//!
//! The in-memory unit of work holds the store mutex for its whole lifetime and
//! mutates a private copy of the tables that replaces the shared tables on
//! commit. Units therefore run strictly one after another, which gives the
//! same observable outcome as row locking for every race the orchestrator
//! cares about.

pub mod postgres_drone;
pub mod postgres_job;
pub mod postgres_order;
pub mod postgres_unit_of_work;

pub use postgres_drone::PostgresDroneRepository;
pub use postgres_job::PostgresJobRepository;
pub use postgres_order::PostgresOrderRepository;
pub use postgres_unit_of_work::PostgresDeliveryStore;

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::domain::drone::{Drone, DroneId, DroneStatus};
use crate::domain::job::{Job, JobId, JobStatus};
use crate::domain::order::{Order, OrderId, OrderStatus};
use crate::domain::repository::{
    DeliveryStore, DroneRepository, JobRepository, OrderRepository, Page, PageRequest,
    RepositoryError, UnitOfWork,
};

#[derive(Debug, Clone, Default)]
struct Tables {
    orders: HashMap<OrderId, Order>,
    drones: HashMap<DroneId, Drone>,
    jobs: HashMap<JobId, Job>,
}

#[derive(Clone, Default)]
pub struct InMemoryDeliveryStore {
    tables: Arc<Mutex<Tables>>,
}

impl InMemoryDeliveryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn paginate<T: Clone>(mut items: Vec<T>, page: PageRequest) -> Page<T> {
    let total = items.len() as u64;
    let start = usize::try_from(page.offset()).unwrap_or(usize::MAX).min(items.len());
    let end = start.saturating_add(page.limit as usize).min(items.len());
    Page {
        items: items.drain(start..end).collect(),
        total,
        page: page.page,
        limit: page.limit,
    }
}

#[async_trait]
impl OrderRepository for InMemoryDeliveryStore {
    async fn find_by_id(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        Ok(self.tables.lock().await.orders.get(&id).cloned())
    }

    async fn find_by_submitter(&self, submitted_by: &str) -> Result<Vec<Order>, RepositoryError> {
        let tables = self.tables.lock().await;
        let mut orders: Vec<Order> = tables
            .orders
            .values()
            .filter(|o| o.submitted_by == submitted_by)
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }

    async fn list(
        &self,
        status: Option<OrderStatus>,
        page: PageRequest,
    ) -> Result<Page<Order>, RepositoryError> {
        let tables = self.tables.lock().await;
        let mut orders: Vec<Order> = tables
            .orders
            .values()
            .filter(|o| status.is_none_or(|s| o.status() == s))
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(paginate(orders, page))
    }
}

#[async_trait]
impl DroneRepository for InMemoryDeliveryStore {
    async fn find_by_id(&self, id: &DroneId) -> Result<Option<Drone>, RepositoryError> {
        Ok(self.tables.lock().await.drones.get(id).cloned())
    }

    async fn list(
        &self,
        status: Option<DroneStatus>,
        page: PageRequest,
    ) -> Result<Page<Drone>, RepositoryError> {
        let tables = self.tables.lock().await;
        let mut drones: Vec<Drone> = tables
            .drones
            .values()
            .filter(|d| status.is_none_or(|s| d.status() == s))
            .cloned()
            .collect();
        drones.sort_by(|a, b| a.id.0.cmp(&b.id.0));
        Ok(paginate(drones, page))
    }
}

#[async_trait]
impl JobRepository for InMemoryDeliveryStore {
    async fn find_by_id(&self, id: JobId) -> Result<Option<Job>, RepositoryError> {
        Ok(self.tables.lock().await.jobs.get(&id).cloned())
    }

    async fn list_open(&self) -> Result<Vec<Job>, RepositoryError> {
        let tables = self.tables.lock().await;
        let mut jobs: Vec<Job> = tables
            .jobs
            .values()
            .filter(|j| j.status() == JobStatus::Open)
            .cloned()
            .collect();
        jobs.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(jobs)
    }
}

#[async_trait]
impl DeliveryStore for InMemoryDeliveryStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, RepositoryError> {
        let guard = self.tables.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(InMemoryUnitOfWork { guard, working }))
    }

    async fn ping(&self) -> Result<(), RepositoryError> {
        Ok(())
    }
}

pub struct InMemoryUnitOfWork {
    guard: OwnedMutexGuard<Tables>,
    working: Tables,
}

#[async_trait]
impl UnitOfWork for InMemoryUnitOfWork {
    async fn lock_order(&mut self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        Ok(self.working.orders.get(&id).cloned())
    }

    async fn lock_job(&mut self, id: JobId) -> Result<Option<Job>, RepositoryError> {
        Ok(self.working.jobs.get(&id).cloned())
    }

    async fn lock_drone(&mut self, id: &DroneId) -> Result<Option<Drone>, RepositoryError> {
        Ok(self.working.drones.get(id).cloned())
    }

    async fn lock_latest_job_for_order(
        &mut self,
        order_id: OrderId,
    ) -> Result<Option<Job>, RepositoryError> {
        Ok(self
            .working
            .jobs
            .values()
            .filter(|j| j.order_id == order_id && j.status() != JobStatus::Cancelled)
            .max_by_key(|j| j.created_at)
            .cloned())
    }

    async fn insert_order(&mut self, order: &Order) -> Result<(), RepositoryError> {
        if self.working.orders.contains_key(&order.id) {
            return Err(RepositoryError::Database(format!(
                "duplicate order id {}",
                order.id
            )));
        }
        self.working.orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn update_order(&mut self, order: &Order) -> Result<(), RepositoryError> {
        match self.working.orders.get_mut(&order.id) {
            Some(slot) => {
                *slot = order.clone();
                Ok(())
            }
            None => Err(RepositoryError::NotFound {
                entity: "order",
                id: order.id.to_string(),
            }),
        }
    }

    async fn insert_job(&mut self, job: &Job) -> Result<(), RepositoryError> {
        if !self.working.orders.contains_key(&job.order_id) {
            return Err(RepositoryError::Database(format!(
                "job references missing order {}",
                job.order_id
            )));
        }
        if job.status().is_active()
            && self
                .working
                .jobs
                .values()
                .any(|j| j.order_id == job.order_id && j.status().is_active())
        {
            return Err(RepositoryError::Database(format!(
                "order {} already has an active job",
                job.order_id
            )));
        }
        self.working.jobs.insert(job.id, job.clone());
        Ok(())
    }

    async fn update_job(&mut self, job: &Job) -> Result<(), RepositoryError> {
        match self.working.jobs.get_mut(&job.id) {
            Some(slot) => {
                *slot = job.clone();
                Ok(())
            }
            None => Err(RepositoryError::NotFound {
                entity: "job",
                id: job.id.to_string(),
            }),
        }
    }

    async fn save_drone(&mut self, drone: &Drone) -> Result<(), RepositoryError> {
        self.working.drones.insert(drone.id.clone(), drone.clone());
        Ok(())
    }

    async fn withdraw_order_if_pending(
        &mut self,
        id: OrderId,
        requester: &str,
    ) -> Result<bool, RepositoryError> {
        let Some(order) = self.working.orders.get_mut(&id) else {
            return Ok(false);
        };
        if order.status() != OrderStatus::Pending || !order.is_owned_by(requester) {
            return Ok(false);
        }
        order
            .withdraw()
            .map_err(|e| RepositoryError::Unknown(e.to_string()))?;
        Ok(true)
    }

    async fn cancel_active_jobs(&mut self, order_id: OrderId) -> Result<u64, RepositoryError> {
        let mut cancelled = 0;
        for job in self
            .working
            .jobs
            .values_mut()
            .filter(|j| j.order_id == order_id && j.status().is_active())
        {
            job.cancel()
                .map_err(|e| RepositoryError::Unknown(e.to_string()))?;
            cancelled += 1;
        }
        Ok(cancelled)
    }

    async fn commit(self: Box<Self>) -> Result<(), RepositoryError> {
        let InMemoryUnitOfWork { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::location::Location;

    fn order(user: &str) -> Order {
        Order::new(user, Location::new(24.70, 46.67), Location::new(24.75, 46.70))
    }

    #[tokio::test]
    async fn test_commit_publishes_writes() {
        let store = InMemoryDeliveryStore::new();
        let o = order("alice");
        let job = Job::new(o.id);

        let mut uow = store.begin().await.unwrap();
        uow.insert_order(&o).await.unwrap();
        uow.insert_job(&job).await.unwrap();
        uow.commit().await.unwrap();

        assert!(OrderRepository::find_by_id(&store, o.id).await.unwrap().is_some());
        assert_eq!(store.list_open().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_drop_without_commit_rolls_back() {
        let store = InMemoryDeliveryStore::new();
        let o = order("alice");
        {
            let mut uow = store.begin().await.unwrap();
            uow.insert_order(&o).await.unwrap();
        }
        assert!(OrderRepository::find_by_id(&store, o.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_second_active_job_rejected() {
        let store = InMemoryDeliveryStore::new();
        let o = order("alice");
        let mut uow = store.begin().await.unwrap();
        uow.insert_order(&o).await.unwrap();
        uow.insert_job(&Job::new(o.id)).await.unwrap();
        assert!(uow.insert_job(&Job::new(o.id)).await.is_err());
    }

    #[tokio::test]
    async fn test_guarded_withdraw() {
        let store = InMemoryDeliveryStore::new();
        let o = order("alice");
        let mut uow = store.begin().await.unwrap();
        uow.insert_order(&o).await.unwrap();
        uow.insert_job(&Job::new(o.id)).await.unwrap();

        assert!(!uow.withdraw_order_if_pending(o.id, "mallory").await.unwrap());
        assert!(uow.withdraw_order_if_pending(o.id, "alice").await.unwrap());
        assert!(!uow.withdraw_order_if_pending(o.id, "alice").await.unwrap());
        assert_eq!(uow.cancel_active_jobs(o.id).await.unwrap(), 1);
        assert_eq!(uow.cancel_active_jobs(o.id).await.unwrap(), 0);

        let stored = uow.lock_order(o.id).await.unwrap().unwrap();
        assert_eq!(stored.status(), OrderStatus::Withdrawn);
        assert_eq!(stored.submitted_by, "alice");
    }

    #[tokio::test]
    async fn test_pagination_and_filter() {
        let store = InMemoryDeliveryStore::new();
        let mut uow = store.begin().await.unwrap();
        for i in 0..5 {
            let mut d = Drone::new(DroneId::new(format!("d{i}")), Location::new(24.7, 46.6));
            if i % 2 == 0 {
                d.mark_broken().unwrap();
            }
            uow.save_drone(&d).await.unwrap();
        }
        uow.commit().await.unwrap();

        let page = DroneRepository::list(&store, None, PageRequest::new(2, 2)).await.unwrap();
        assert_eq!(page.total, 5);
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.items[0].id, DroneId::new("d2"));

        let broken = DroneRepository::list(&store, Some(DroneStatus::Broken), PageRequest::default())
            .await
            .unwrap();
        assert_eq!(broken.total, 3);
    }
}
