// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Delivery Orchestrator
//!
//! Every multi-aggregate operation of the dispatch flow runs here, each inside
//! exactly one [`UnitOfWork`]. Aggregates are loaded for update, mutated
//! through their state machines and written back; the unit commits only after
//! every step succeeded. An early return drops the unit, which rolls it back.
//!
//! # Step order
//!
//! Transitions run in a fixed order per operation (order before drone), so
//! the first failure reported is deterministic. Row locks follow a
//! different rule: drone-initiated operations (grab, complete, broken) take
//! the drone lock first, then order, then job. Reservation locks
//! job → order → drone and cancellation locks order → jobs, so a reservation
//! racing a cancel of the same order can still deadlock; Postgres aborts one
//! side, which surfaces as a retryable `Conflict` (see
//! `RepositoryError::Contention`).
//!
//! # Errors
//!
//! State-machine rejections (`InvalidTransition`, `Conflict`) propagate
//! unchanged. Storage failures surface as `DomainError::Internal`.

use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use crate::domain::drone::{DroneBrokenEvent, DroneId};
use crate::domain::error::DomainError;
use crate::domain::job::{Job, JobId};
use crate::domain::order::{Order, OrderId, OrderStatus};
use crate::domain::repository::{DeliveryStore, UnitOfWork};

/// Result of [`DeliveryOrchestrator::cancel_order_and_job`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CancelOutcome {
    Withdrawn { jobs_cancelled: u64 },
    /// The order had already reached a terminal state.
    NothingToCancel,
}

/// Result of [`DeliveryOrchestrator::handle_drone_broken`].
#[derive(Debug, Clone, Serialize)]
pub struct BrokenOutcome {
    pub event: DroneBrokenEvent,
    /// Fresh `OPEN` job for the stranded order, if the drone was carrying one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub handoff_job: Option<Job>,
}

pub struct DeliveryOrchestrator {
    store: Arc<dyn DeliveryStore>,
}

impl DeliveryOrchestrator {
    pub fn new(store: Arc<dyn DeliveryStore>) -> Self {
        Self { store }
    }

    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, DomainError> {
        Ok(self.store.begin().await?)
    }

    pub async fn create_order_and_job(&self, order: Order) -> Result<(Order, Job), DomainError> {
        let mut uow = self.begin().await?;

        uow.insert_order(&order).await?;
        let job = Job::new(order.id);
        uow.insert_job(&job).await?;
        uow.commit().await?;

        info!(order_id = %order.id, job_id = %job.id, submitted_by = %order.submitted_by, "Order placed");
        Ok((order, job))
    }

    /// Withdraw a pending order on behalf of its submitter and cancel its
    /// open work.
    pub async fn cancel_order_and_job(
        &self,
        order_id: OrderId,
        requester: &str,
    ) -> Result<CancelOutcome, DomainError> {
        let mut uow = self.begin().await?;

        if uow.withdraw_order_if_pending(order_id, requester).await? {
            let jobs_cancelled = uow.cancel_active_jobs(order_id).await?;
            uow.commit().await?;
            info!(order_id = %order_id, jobs_cancelled, "Order withdrawn");
            return Ok(CancelOutcome::Withdrawn { jobs_cancelled });
        }

        let order = uow
            .lock_order(order_id)
            .await?
            .ok_or_else(|| DomainError::not_found("order", order_id))?;

        if !order.is_owned_by(requester) {
            warn!(order_id = %order_id, requester, "Cancel rejected: not the submitter");
            return Err(DomainError::Forbidden(
                "order was submitted by another user".to_string(),
            ));
        }

        let status = order.status();
        if status.is_terminal() {
            info!(order_id = %order_id, status = %status, "Cancel is a no-op on a finished order");
            return Ok(CancelOutcome::NothingToCancel);
        }

        warn!(order_id = %order_id, status = %status, "Cancel rejected: order already in flight");
        Err(DomainError::InvalidTransition {
            from: status.as_str(),
            to: OrderStatus::Withdrawn.as_str(),
        })
    }

    pub async fn reserve_job_and_assign(
        &self,
        job_id: JobId,
        drone_id: &DroneId,
    ) -> Result<Job, DomainError> {
        let mut uow = self.begin().await?;

        let mut job = uow
            .lock_job(job_id)
            .await?
            .ok_or_else(|| DomainError::not_found("job", job_id))?;
        job.reserve(drone_id.clone())?;
        uow.update_job(&job).await?;

        let mut order = uow
            .lock_order(job.order_id)
            .await?
            .ok_or_else(|| DomainError::not_found("order", job.order_id))?;
        order.assign(drone_id.clone())?;
        uow.update_order(&order).await?;

        let mut drone = uow
            .lock_drone(drone_id)
            .await?
            .ok_or_else(|| DomainError::not_found("drone", drone_id))?;
        drone.reserve(order.id)?;
        uow.save_drone(&drone).await?;

        uow.commit().await?;

        info!(job_id = %job.id, order_id = %order.id, drone_id = %drone_id, "Job reserved");
        Ok(job)
    }

    pub async fn grab_order(&self, order_id: OrderId, drone_id: &DroneId) -> Result<Order, DomainError> {
        let mut uow = self.begin().await?;

        // Lock before the order, report after it.
        let drone = uow.lock_drone(drone_id).await?;

        let mut order = Self::lock_order_for(&mut *uow, order_id, drone_id).await?;
        order.mark_picked_up()?;
        uow.update_order(&order).await?;

        let mut drone = drone.ok_or_else(|| DomainError::not_found("drone", drone_id))?;
        drone.start_delivery()?;
        uow.save_drone(&drone).await?;

        uow.commit().await?;

        info!(order_id = %order_id, drone_id = %drone_id, "Order picked up");
        Ok(order)
    }

    pub async fn complete_delivery(
        &self,
        order_id: OrderId,
        drone_id: &DroneId,
        delivered: bool,
    ) -> Result<Order, DomainError> {
        let mut uow = self.begin().await?;

        // Lock before the order, report after it.
        let drone = uow.lock_drone(drone_id).await?;

        let mut order = Self::lock_order_for(&mut *uow, order_id, drone_id).await?;
        if delivered {
            order.mark_delivered()?;
        } else {
            order.mark_failed()?;
        }
        uow.update_order(&order).await?;

        let mut drone = drone.ok_or_else(|| DomainError::not_found("drone", drone_id))?;
        drone.go_idle();
        uow.save_drone(&drone).await?;

        // Job bookkeeping never blocks the delivery outcome. Storage errors
        // still abort: the transaction cannot be trusted after one.
        match uow.lock_latest_job_for_order(order_id).await? {
            Some(mut job) => match job.complete() {
                Ok(()) => uow.update_job(&job).await?,
                Err(e) => {
                    warn!(order_id = %order_id, job_id = %job.id, error = %e, "Job not completed")
                }
            },
            None => warn!(order_id = %order_id, "No job found to complete"),
        }

        uow.commit().await?;

        info!(
            order_id = %order_id,
            drone_id = %drone_id,
            status = %order.status(),
            "Delivery finished"
        );
        Ok(order)
    }

    pub async fn handle_drone_broken(&self, drone_id: &DroneId) -> Result<BrokenOutcome, DomainError> {
        let mut uow = self.begin().await?;

        let mut drone = uow
            .lock_drone(drone_id)
            .await?
            .ok_or_else(|| DomainError::not_found("drone", drone_id))?;
        let event = drone.mark_broken()?;
        uow.save_drone(&drone).await?;

        let mut handoff_job = None;
        if let Some(order_id) = event.order_id {
            let mut order = uow
                .lock_order(order_id)
                .await?
                .ok_or_else(|| DomainError::not_found("order", order_id))?;
            order.await_handoff()?;
            uow.update_order(&order).await?;

            let cancelled = uow.cancel_active_jobs(order_id).await?;
            let job = Job::new(order_id);
            uow.insert_job(&job).await?;
            info!(
                order_id = %order_id,
                job_id = %job.id,
                previous_jobs_cancelled = cancelled,
                "Handoff job opened"
            );
            handoff_job = Some(job);
        }

        uow.commit().await?;

        warn!(
            drone_id = %drone_id,
            lat = event.location.lat,
            lng = event.location.lng,
            order_id = ?event.order_id,
            "Drone reported broken"
        );
        Ok(BrokenOutcome { event, handoff_job })
    }

    pub async fn mark_drone_fixed(&self, drone_id: &DroneId) -> Result<(), DomainError> {
        let mut uow = self.begin().await?;

        let mut drone = uow
            .lock_drone(drone_id)
            .await?
            .ok_or_else(|| DomainError::not_found("drone", drone_id))?;
        drone.mark_fixed()?;
        uow.save_drone(&drone).await?;
        uow.commit().await?;

        info!(drone_id = %drone_id, "Drone back in service");
        Ok(())
    }

    async fn lock_order_for(
        uow: &mut dyn UnitOfWork,
        order_id: OrderId,
        drone_id: &DroneId,
    ) -> Result<Order, DomainError> {
        let order = uow
            .lock_order(order_id)
            .await?
            .ok_or_else(|| DomainError::not_found("order", order_id))?;
        if order.assigned_drone() != Some(drone_id) {
            warn!(order_id = %order_id, drone_id = %drone_id, "Order is assigned to another drone");
            return Err(DomainError::Forbidden(
                "order is not assigned to this drone".to_string(),
            ));
        }
        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::drone::{Drone, DroneStatus};
    use crate::domain::job::JobStatus;
    use crate::domain::location::Location;
    use crate::domain::repository::{DroneRepository, JobRepository, OrderRepository};
    use crate::infrastructure::repositories::InMemoryDeliveryStore;

    fn setup() -> (InMemoryDeliveryStore, DeliveryOrchestrator) {
        let store = InMemoryDeliveryStore::new();
        let orchestrator = DeliveryOrchestrator::new(Arc::new(store.clone()));
        (store, orchestrator)
    }

    async fn seed_drone(store: &InMemoryDeliveryStore, id: &str) -> DroneId {
        let id = DroneId::new(id);
        let mut uow = store.begin().await.unwrap();
        uow.save_drone(&Drone::new(id.clone(), Location::new(24.71, 46.67)))
            .await
            .unwrap();
        uow.commit().await.unwrap();
        id
    }

    fn order(user: &str) -> Order {
        Order::new(user, Location::new(24.70, 46.60), Location::new(24.75, 46.70))
    }

    #[tokio::test]
    async fn test_create_order_and_job() {
        let (store, orch) = setup();
        let (order, job) = orch.create_order_and_job(order("alice")).await.unwrap();

        assert_eq!(order.status(), OrderStatus::Pending);
        assert_eq!(job.status(), JobStatus::Open);
        assert_eq!(job.order_id, order.id);
        assert!(OrderRepository::find_by_id(&store, order.id).await.unwrap().is_some());
        assert_eq!(store.list_open().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_cancel_pending_order_cancels_job() {
        let (store, orch) = setup();
        let (order, job) = orch.create_order_and_job(order("alice")).await.unwrap();

        let outcome = orch.cancel_order_and_job(order.id, "alice").await.unwrap();
        assert_eq!(outcome, CancelOutcome::Withdrawn { jobs_cancelled: 1 });

        let stored = OrderRepository::find_by_id(&store, order.id).await.unwrap().unwrap();
        assert_eq!(stored.status(), OrderStatus::Withdrawn);
        assert_eq!(stored.submitted_by, "alice");
        let job = JobRepository::find_by_id(&store, job.id).await.unwrap().unwrap();
        assert_eq!(job.status(), JobStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_cancel_by_other_user_is_forbidden() {
        let (store, orch) = setup();
        let (order, _) = orch.create_order_and_job(order("alice")).await.unwrap();

        let err = orch.cancel_order_and_job(order.id, "mallory").await.unwrap_err();
        assert!(matches!(err, DomainError::Forbidden(_)));

        let stored = OrderRepository::find_by_id(&store, order.id).await.unwrap().unwrap();
        assert_eq!(stored.status(), OrderStatus::Pending);
        assert_eq!(stored.submitted_by, "alice");
    }

    #[tokio::test]
    async fn test_cancel_missing_order() {
        let (_, orch) = setup();
        let err = orch.cancel_order_and_job(OrderId::new(), "alice").await.unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_cancel_assigned_order_is_invalid_transition() {
        let (store, orch) = setup();
        let drone = seed_drone(&store, "d1").await;
        let (order, job) = orch.create_order_and_job(order("alice")).await.unwrap();
        orch.reserve_job_and_assign(job.id, &drone).await.unwrap();

        let err = orch.cancel_order_and_job(order.id, "alice").await.unwrap_err();
        assert_eq!(
            err,
            DomainError::InvalidTransition {
                from: "ASSIGNED",
                to: "WITHDRAWN"
            }
        );
    }

    #[tokio::test]
    async fn test_reserve_rolls_back_when_drone_busy() {
        let (store, orch) = setup();
        let drone = seed_drone(&store, "d1").await;
        let (_, first) = orch.create_order_and_job(order("alice")).await.unwrap();
        let (second_order, second) = orch.create_order_and_job(order("bob")).await.unwrap();

        orch.reserve_job_and_assign(first.id, &drone).await.unwrap();
        let err = orch.reserve_job_and_assign(second.id, &drone).await.unwrap_err();
        assert!(matches!(err, DomainError::InvalidTransition { .. }));

        let job = JobRepository::find_by_id(&store, second.id).await.unwrap().unwrap();
        assert_eq!(job.status(), JobStatus::Open);
        assert!(job.reserved_by().is_none());
        let order = OrderRepository::find_by_id(&store, second_order.id).await.unwrap().unwrap();
        assert_eq!(order.status(), OrderStatus::Pending);
    }

    #[tokio::test]
    async fn test_reserve_with_unknown_drone_is_not_found() {
        let (store, orch) = setup();
        let (_, job) = orch.create_order_and_job(order("alice")).await.unwrap();

        let err = orch
            .reserve_job_and_assign(job.id, &DroneId::new("ghost"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");
        let job = JobRepository::find_by_id(&store, job.id).await.unwrap().unwrap();
        assert_eq!(job.status(), JobStatus::Open);
    }

    #[tokio::test]
    async fn test_grab_requires_assigned_drone() {
        let (store, orch) = setup();
        let d1 = seed_drone(&store, "d1").await;
        let d2 = seed_drone(&store, "d2").await;
        let (order, job) = orch.create_order_and_job(order("alice")).await.unwrap();
        orch.reserve_job_and_assign(job.id, &d1).await.unwrap();

        let err = orch.grab_order(order.id, &d2).await.unwrap_err();
        assert!(matches!(err, DomainError::Forbidden(_)));

        let grabbed = orch.grab_order(order.id, &d1).await.unwrap();
        assert_eq!(grabbed.status(), OrderStatus::PickedUp);
        let drone = DroneRepository::find_by_id(&store, &d1).await.unwrap().unwrap();
        assert_eq!(drone.status(), DroneStatus::EnRouteDelivery);
    }

    #[tokio::test]
    async fn test_complete_delivery_frees_drone_and_completes_job() {
        let (store, orch) = setup();
        let drone = seed_drone(&store, "d1").await;
        let (order, job) = orch.create_order_and_job(order("alice")).await.unwrap();
        orch.reserve_job_and_assign(job.id, &drone).await.unwrap();
        orch.grab_order(order.id, &drone).await.unwrap();

        let done = orch.complete_delivery(order.id, &drone, false).await.unwrap();
        assert_eq!(done.status(), OrderStatus::Failed);

        let drone = DroneRepository::find_by_id(&store, &drone).await.unwrap().unwrap();
        assert_eq!(drone.status(), DroneStatus::Idle);
        assert!(drone.current_order().is_none());
        let job = JobRepository::find_by_id(&store, job.id).await.unwrap().unwrap();
        assert_eq!(job.status(), JobStatus::Completed);
    }

    #[tokio::test]
    async fn test_broken_idle_drone_opens_no_job() {
        let (store, orch) = setup();
        let drone = seed_drone(&store, "d1").await;

        let outcome = orch.handle_drone_broken(&drone).await.unwrap();
        assert!(outcome.event.order_id.is_none());
        assert!(outcome.handoff_job.is_none());
        assert!(store.list_open().await.unwrap().is_empty());

        let err = orch.handle_drone_broken(&drone).await.unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));

        orch.mark_drone_fixed(&drone).await.unwrap();
        let drone = DroneRepository::find_by_id(&store, &drone).await.unwrap().unwrap();
        assert_eq!(drone.status(), DroneStatus::Idle);
    }

    #[tokio::test]
    async fn test_fixing_a_working_drone_is_rejected() {
        let (store, orch) = setup();
        let drone = seed_drone(&store, "d1").await;
        let err = orch.mark_drone_fixed(&drone).await.unwrap_err();
        assert!(matches!(err, DomainError::InvalidTransition { .. }));
    }
}
