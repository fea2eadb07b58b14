// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Order Use Cases
//!
//! End-user and admin entry points for orders. Multi-aggregate writes are
//! delegated to the [`DeliveryOrchestrator`]; this service owns coordinate
//! validation, ownership checks and the ETA estimate shown with order details.
//!
//! # ETA
//!
//! Only computed for orders bound to a drone with a known position. The road
//! route duration is preferred; without it the straight-line distance is
//! divided by the configured drone speed. Lookup failures omit the ETA rather
//! than failing the request.

use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

use crate::application::drone_service::DroneService;
use crate::application::orchestrator::{CancelOutcome, DeliveryOrchestrator};
use crate::domain::error::DomainError;
use crate::domain::job::Job;
use crate::domain::location::{DeliveryZone, Location};
use crate::domain::order::{Order, OrderId, OrderStatus};
use crate::domain::repository::{DeliveryStore, OrderRepository, Page, PageRequest};
use crate::domain::routing::RouteDistanceProvider;

#[derive(Debug, Clone, Serialize)]
pub struct OrderDetails {
    pub order: Order,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub drone_location: Option<Location>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eta_minutes: Option<f64>,
}

/// Admin correction of an open order. Absent fields are left unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct OrderUpdate {
    pub origin: Option<Location>,
    pub destination: Option<Location>,
}

pub struct OrderService {
    orchestrator: Arc<DeliveryOrchestrator>,
    store: Arc<dyn DeliveryStore>,
    orders: Arc<dyn OrderRepository>,
    drones: Arc<DroneService>,
    routes: Option<Arc<dyn RouteDistanceProvider>>,
    zone: DeliveryZone,
    drone_speed_kmh: f64,
}

impl OrderService {
    pub fn new(
        orchestrator: Arc<DeliveryOrchestrator>,
        store: Arc<dyn DeliveryStore>,
        orders: Arc<dyn OrderRepository>,
        drones: Arc<DroneService>,
        zone: DeliveryZone,
        drone_speed_kmh: f64,
    ) -> Self {
        Self {
            orchestrator,
            store,
            orders,
            drones,
            routes: None,
            zone,
            drone_speed_kmh,
        }
    }

    pub fn with_routes(mut self, routes: Arc<dyn RouteDistanceProvider>) -> Self {
        self.routes = Some(routes);
        self
    }

    fn validate_location(&self, location: &Location, label: &str) -> Result<(), DomainError> {
        location.validate()?;
        self.zone.validate_in_zone(location, label)
    }

    pub async fn place_order(
        &self,
        submitted_by: &str,
        origin: Location,
        destination: Location,
    ) -> Result<(Order, Job), DomainError> {
        self.validate_location(&origin, "origin")?;
        self.validate_location(&destination, "destination")?;

        self.orchestrator
            .create_order_and_job(Order::new(submitted_by, origin, destination))
            .await
    }

    pub async fn withdraw_order(
        &self,
        order_id: OrderId,
        requester: &str,
    ) -> Result<CancelOutcome, DomainError> {
        self.orchestrator.cancel_order_and_job(order_id, requester).await
    }

    pub async fn order_details(
        &self,
        order_id: OrderId,
        requester: &str,
    ) -> Result<OrderDetails, DomainError> {
        let order = self
            .orders
            .find_by_id(order_id)
            .await?
            .ok_or_else(|| DomainError::not_found("order", order_id))?;
        if !order.is_owned_by(requester) {
            return Err(DomainError::Forbidden(
                "order was submitted by another user".to_string(),
            ));
        }

        let drone_location = match order.assigned_drone() {
            Some(drone_id) => self.drones.location(drone_id).await.unwrap_or_else(|e| {
                debug!(order_id = %order_id, error = %e, "Drone location unavailable");
                None
            }),
            None => None,
        };
        let eta_minutes = match drone_location {
            Some(from) => Some(self.eta_minutes(from, order.destination).await),
            None => None,
        };

        Ok(OrderDetails {
            order,
            drone_location,
            eta_minutes,
        })
    }

    async fn eta_minutes(&self, from: Location, to: Location) -> f64 {
        if let Some(routes) = &self.routes {
            match routes.estimate(from, to).await {
                Ok(estimate) => return estimate.duration_min,
                Err(e) => debug!(error = %e, "Route estimate unavailable, using straight line"),
            }
        }
        from.distance_km(&to) / self.drone_speed_kmh * 60.0
    }

    pub async fn list_mine(&self, submitted_by: &str) -> Result<Vec<Order>, DomainError> {
        Ok(self.orders.find_by_submitter(submitted_by).await?)
    }

    pub async fn list_all(
        &self,
        status: Option<OrderStatus>,
        page: PageRequest,
    ) -> Result<Page<Order>, DomainError> {
        Ok(self.orders.list(status, page).await?)
    }

    pub async fn admin_update(&self, order_id: OrderId, update: OrderUpdate) -> Result<Order, DomainError> {
        if let Some(origin) = &update.origin {
            self.validate_location(origin, "new origin")?;
        }
        if let Some(destination) = &update.destination {
            self.validate_location(destination, "new destination")?;
        }

        let mut uow = self.store.begin().await?;
        let mut order = uow
            .lock_order(order_id)
            .await?
            .ok_or_else(|| DomainError::not_found("order", order_id))?;
        if let Some(origin) = update.origin {
            order.update_origin(origin)?;
        }
        if let Some(destination) = update.destination {
            order.update_destination(destination)?;
        }
        uow.update_order(&order).await?;
        uow.commit().await?;

        info!(order_id = %order_id, "Order updated by admin");
        Ok(order)
    }
}
