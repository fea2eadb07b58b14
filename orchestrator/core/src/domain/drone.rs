// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Drone Aggregate
//!
//! Drones identify themselves (the id is the JWT subject) and are created on
//! their first heartbeat. `current_order` is set only while the drone is
//! `EN_ROUTE_PICKUP` or `EN_ROUTE_DELIVERY`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::domain::error::DomainError;
use crate::domain::location::Location;
use crate::domain::order::OrderId;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DroneId(pub String);

impl DroneId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DroneId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DroneStatus {
    Idle,
    EnRoutePickup,
    EnRouteDelivery,
    Broken,
}

impl DroneStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "IDLE",
            Self::EnRoutePickup => "EN_ROUTE_PICKUP",
            Self::EnRouteDelivery => "EN_ROUTE_DELIVERY",
            Self::Broken => "BROKEN",
        }
    }
}

impl std::fmt::Display for DroneStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DroneStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "IDLE" => Ok(Self::Idle),
            "EN_ROUTE_PICKUP" => Ok(Self::EnRoutePickup),
            "EN_ROUTE_DELIVERY" => Ok(Self::EnRouteDelivery),
            "BROKEN" => Ok(Self::Broken),
            other => Err(DomainError::Validation(format!(
                "unknown drone status: {other}"
            ))),
        }
    }
}

/// Emitted by [`Drone::mark_broken`]; drives the handoff flow.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DroneBrokenEvent {
    pub drone_id: DroneId,
    pub location: Location,
    pub order_id: Option<OrderId>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Drone {
    pub id: DroneId,
    status: DroneStatus,
    pub location: Location,
    #[serde(rename = "current_order_id", skip_serializing_if = "Option::is_none")]
    current_order: Option<OrderId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_heartbeat: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Drone {
    /// A freshly registered drone, idle at its first reported position.
    pub fn new(id: DroneId, location: Location) -> Self {
        let now = Utc::now();
        Self {
            id,
            status: DroneStatus::Idle,
            location,
            current_order: None,
            last_heartbeat: Some(now),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn restore(
        id: DroneId,
        status: DroneStatus,
        location: Location,
        current_order: Option<OrderId>,
        last_heartbeat: Option<DateTime<Utc>>,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            status,
            location,
            current_order,
            last_heartbeat,
            created_at,
            updated_at,
        }
    }

    pub fn status(&self) -> DroneStatus {
        self.status
    }

    pub fn current_order(&self) -> Option<OrderId> {
        self.current_order
    }

    pub fn reserve(&mut self, order_id: OrderId) -> Result<(), DomainError> {
        if self.status != DroneStatus::Idle {
            return Err(DomainError::InvalidTransition {
                from: self.status.as_str(),
                to: DroneStatus::EnRoutePickup.as_str(),
            });
        }
        self.status = DroneStatus::EnRoutePickup;
        self.current_order = Some(order_id);
        self.touch();
        Ok(())
    }

    pub fn start_delivery(&mut self) -> Result<(), DomainError> {
        if self.status != DroneStatus::EnRoutePickup {
            return Err(DomainError::InvalidTransition {
                from: self.status.as_str(),
                to: DroneStatus::EnRouteDelivery.as_str(),
            });
        }
        self.status = DroneStatus::EnRouteDelivery;
        self.touch();
        Ok(())
    }

    pub fn go_idle(&mut self) {
        self.status = DroneStatus::Idle;
        self.current_order = None;
        self.touch();
    }

    pub fn mark_broken(&mut self) -> Result<DroneBrokenEvent, DomainError> {
        if self.status == DroneStatus::Broken {
            return Err(DomainError::Conflict("drone is already broken".to_string()));
        }
        let event = DroneBrokenEvent {
            drone_id: self.id.clone(),
            location: self.location,
            order_id: self.current_order.take(),
        };
        self.status = DroneStatus::Broken;
        self.touch();
        Ok(event)
    }

    pub fn mark_fixed(&mut self) -> Result<(), DomainError> {
        if self.status != DroneStatus::Broken {
            return Err(DomainError::InvalidTransition {
                from: self.status.as_str(),
                to: DroneStatus::Idle.as_str(),
            });
        }
        self.status = DroneStatus::Idle;
        self.touch();
        Ok(())
    }

    pub fn update_location(&mut self, location: Location) {
        let now = Utc::now();
        self.location = location;
        self.last_heartbeat = Some(now);
        self.updated_at = now;
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drone() -> Drone {
        Drone::new(DroneId::new("drone-7"), Location::new(24.71, 46.67))
    }

    #[test]
    fn test_full_flight_cycle() {
        let mut d = drone();
        let order = OrderId::new();
        d.reserve(order).unwrap();
        assert_eq!(d.status(), DroneStatus::EnRoutePickup);
        assert_eq!(d.current_order(), Some(order));

        d.start_delivery().unwrap();
        assert_eq!(d.status(), DroneStatus::EnRouteDelivery);

        d.go_idle();
        assert_eq!(d.status(), DroneStatus::Idle);
        assert!(d.current_order().is_none());
    }

    #[test]
    fn test_reserve_requires_idle() {
        let mut d = drone();
        d.reserve(OrderId::new()).unwrap();
        let err = d.reserve(OrderId::new()).unwrap_err();
        assert_eq!(
            err,
            DomainError::InvalidTransition {
                from: "EN_ROUTE_PICKUP",
                to: "EN_ROUTE_PICKUP"
            }
        );
    }

    #[test]
    fn test_start_delivery_requires_pickup_leg() {
        let mut d = drone();
        assert!(d.start_delivery().is_err());
        assert_eq!(d.status(), DroneStatus::Idle);
    }

    #[test]
    fn test_mark_broken_emits_event_and_clears_order() {
        let mut d = drone();
        let order = OrderId::new();
        d.reserve(order).unwrap();

        let event = d.mark_broken().unwrap();
        assert_eq!(event.drone_id, DroneId::new("drone-7"));
        assert_eq!(event.order_id, Some(order));
        assert_eq!(event.location, Location::new(24.71, 46.67));
        assert_eq!(d.status(), DroneStatus::Broken);
        assert!(d.current_order().is_none());

        let err = d.mark_broken().unwrap_err();
        assert_eq!(err, DomainError::Conflict("drone is already broken".into()));
    }

    #[test]
    fn test_mark_broken_idle_has_no_order() {
        let mut d = drone();
        assert!(d.mark_broken().unwrap().order_id.is_none());
    }

    #[test]
    fn test_mark_fixed_only_from_broken() {
        let mut d = drone();
        assert!(d.mark_fixed().is_err());
        d.mark_broken().unwrap();
        d.mark_fixed().unwrap();
        assert_eq!(d.status(), DroneStatus::Idle);
    }

    #[test]
    fn test_update_location_stamps_heartbeat() {
        let mut d = drone();
        d.mark_broken().unwrap();
        let before = d.last_heartbeat;
        d.update_location(Location::new(24.72, 46.68));
        assert_eq!(d.location, Location::new(24.72, 46.68));
        assert!(d.last_heartbeat >= before);
        assert_eq!(d.status(), DroneStatus::Broken);
    }
}
