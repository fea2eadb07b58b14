// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Drone telemetry and lookups.
//!
//! Heartbeats register unknown drones on first contact and keep the shared
//! location cache warm. The cache is advisory: every cache error is logged
//! and the store stays the source of truth.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

use crate::domain::cache::DroneLocationCache;
use crate::domain::drone::{Drone, DroneId, DroneStatus};
use crate::domain::error::DomainError;
use crate::domain::location::{DeliveryZone, Location};
use crate::domain::order::Order;
use crate::domain::repository::{
    DeliveryStore, DroneRepository, OrderRepository, Page, PageRequest,
};

pub struct DroneService {
    store: Arc<dyn DeliveryStore>,
    drones: Arc<dyn DroneRepository>,
    orders: Arc<dyn OrderRepository>,
    location_cache: Arc<dyn DroneLocationCache>,
    zone: DeliveryZone,
    location_ttl: Duration,
}

impl DroneService {
    pub fn new(
        store: Arc<dyn DeliveryStore>,
        drones: Arc<dyn DroneRepository>,
        orders: Arc<dyn OrderRepository>,
        location_cache: Arc<dyn DroneLocationCache>,
        zone: DeliveryZone,
        location_ttl: Duration,
    ) -> Self {
        Self {
            store,
            drones,
            orders,
            location_cache,
            zone,
            location_ttl,
        }
    }

    pub async fn heartbeat(&self, drone_id: &DroneId, location: Location) -> Result<Drone, DomainError> {
        location.validate()?;
        self.zone.validate_in_zone(&location, "heartbeat location")?;

        let mut uow = self.store.begin().await?;
        let drone = match uow.lock_drone(drone_id).await? {
            Some(mut drone) => {
                drone.update_location(location);
                drone
            }
            None => {
                info!(drone_id = %drone_id, "Registering new drone");
                Drone::new(drone_id.clone(), location)
            }
        };
        uow.save_drone(&drone).await?;
        uow.commit().await?;

        if let Err(e) = self
            .location_cache
            .set(drone_id, location, self.location_ttl)
            .await
        {
            error!(drone_id = %drone_id, error = %e, "Failed to cache drone location");
        }

        debug!(drone_id = %drone_id, status = %drone.status(), "Heartbeat recorded");
        Ok(drone)
    }

    /// Read-through: cache hit, else the stored position (which then
    /// repopulates the cache). `None` for an unknown drone.
    pub async fn location(&self, drone_id: &DroneId) -> Result<Option<Location>, DomainError> {
        match self.location_cache.get(drone_id).await {
            Ok(Some(location)) => return Ok(Some(location)),
            Ok(None) => debug!(drone_id = %drone_id, "Drone location cache miss"),
            Err(e) => error!(drone_id = %drone_id, error = %e, "Drone location cache read failed"),
        }

        let Some(drone) = self.drones.find_by_id(drone_id).await? else {
            return Ok(None);
        };

        if let Err(e) = self
            .location_cache
            .set(drone_id, drone.location, self.location_ttl)
            .await
        {
            error!(drone_id = %drone_id, error = %e, "Failed to cache drone location");
        }
        Ok(Some(drone.location))
    }

    pub async fn get(&self, drone_id: &DroneId) -> Result<Drone, DomainError> {
        self.drones
            .find_by_id(drone_id)
            .await?
            .ok_or_else(|| DomainError::not_found("drone", drone_id))
    }

    /// The order the drone is currently bound to.
    pub async fn current_order(&self, drone_id: &DroneId) -> Result<Order, DomainError> {
        let drone = self.get(drone_id).await?;
        let order_id = drone.current_order().ok_or_else(|| DomainError::NotFound {
            entity: "order",
            id: format!("assigned to drone {}", drone_id),
        })?;
        self.orders
            .find_by_id(order_id)
            .await?
            .ok_or_else(|| DomainError::not_found("order", order_id))
    }

    pub async fn list(
        &self,
        status: Option<DroneStatus>,
        page: PageRequest,
    ) -> Result<Page<Drone>, DomainError> {
        Ok(self.drones.list(status, page).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::memory_cache::InMemoryDroneLocationCache;
    use crate::infrastructure::repositories::InMemoryDeliveryStore;

    fn zone() -> DeliveryZone {
        DeliveryZone {
            center: Location::new(24.7136, 46.6753),
            radius_km: 50.0,
        }
    }

    fn service(store: &InMemoryDeliveryStore, cache: Arc<InMemoryDroneLocationCache>) -> DroneService {
        let store = Arc::new(store.clone());
        DroneService::new(
            store.clone(),
            store.clone(),
            store,
            cache,
            zone(),
            Duration::from_secs(60),
        )
    }

    #[tokio::test]
    async fn test_heartbeat_registers_and_caches() {
        let store = InMemoryDeliveryStore::new();
        let cache = Arc::new(InMemoryDroneLocationCache::new());
        let svc = service(&store, cache.clone());
        let id = DroneId::new("d1");

        let drone = svc.heartbeat(&id, Location::new(24.72, 46.68)).await.unwrap();
        assert_eq!(drone.status(), DroneStatus::Idle);
        assert_eq!(
            cache.get(&id).await.unwrap(),
            Some(Location::new(24.72, 46.68))
        );

        svc.heartbeat(&id, Location::new(24.73, 46.69)).await.unwrap();
        assert_eq!(svc.get(&id).await.unwrap().location, Location::new(24.73, 46.69));
    }

    #[tokio::test]
    async fn test_heartbeat_outside_zone_is_rejected() {
        let store = InMemoryDeliveryStore::new();
        let svc = service(&store, Arc::new(InMemoryDroneLocationCache::new()));

        let err = svc
            .heartbeat(&DroneId::new("d1"), Location::new(21.48, 39.19))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "OUT_OF_ZONE");

        let err = svc
            .heartbeat(&DroneId::new("d1"), Location::new(95.0, 46.0))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "VALIDATION");
    }

    #[tokio::test]
    async fn test_location_reads_through_to_store() {
        let store = InMemoryDeliveryStore::new();
        let warm = Arc::new(InMemoryDroneLocationCache::new());
        let id = DroneId::new("d1");
        service(&store, warm)
            .heartbeat(&id, Location::new(24.72, 46.68))
            .await
            .unwrap();

        let cold = Arc::new(InMemoryDroneLocationCache::new());
        let svc = service(&store, cold.clone());
        assert!(cold.get(&id).await.unwrap().is_none());
        assert_eq!(svc.location(&id).await.unwrap(), Some(Location::new(24.72, 46.68)));
        assert!(cold.get(&id).await.unwrap().is_some());

        assert_eq!(svc.location(&DroneId::new("ghost")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_current_order_of_idle_drone_is_not_found() {
        let store = InMemoryDeliveryStore::new();
        let svc = service(&store, Arc::new(InMemoryDroneLocationCache::new()));
        let id = DroneId::new("d1");
        svc.heartbeat(&id, Location::new(24.72, 46.68)).await.unwrap();

        let err = svc.current_order(&id).await.unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");
    }
}
