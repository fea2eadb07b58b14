// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Order Aggregate
//!
//! A customer's request to move a parcel from `origin` to `destination`.
//!
//! ```text
//! PENDING          ── Withdraw ──────► WITHDRAWN
//! PENDING          ── Assign ────────► ASSIGNED
//! AWAITING_HANDOFF ── Assign ────────► ASSIGNED
//! ASSIGNED         ── MarkPickedUp ──► PICKED_UP
//! PICKED_UP        ── MarkDelivered ─► DELIVERED
//! PICKED_UP        ── MarkFailed ────► FAILED
//! ASSIGNED         ── AwaitHandoff ──► AWAITING_HANDOFF
//! PICKED_UP        ── AwaitHandoff ──► AWAITING_HANDOFF
//! ```
//!
//! `status` and `assigned_drone` are private; they only move through the
//! transition methods below so the invariant "a drone is assigned iff the
//! order is `ASSIGNED` or `PICKED_UP`" cannot be broken from outside.
//! Storage adapters rebuild aggregates with [`Order::restore`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use crate::domain::drone::DroneId;
use crate::domain::error::DomainError;
use crate::domain::location::Location;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderId(pub Uuid);

impl OrderId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_string(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for OrderId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Pending,
    Assigned,
    PickedUp,
    Delivered,
    Failed,
    Withdrawn,
    AwaitingHandoff,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Assigned => "ASSIGNED",
            Self::PickedUp => "PICKED_UP",
            Self::Delivered => "DELIVERED",
            Self::Failed => "FAILED",
            Self::Withdrawn => "WITHDRAWN",
            Self::AwaitingHandoff => "AWAITING_HANDOFF",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Delivered | Self::Failed | Self::Withdrawn)
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "ASSIGNED" => Ok(Self::Assigned),
            "PICKED_UP" => Ok(Self::PickedUp),
            "DELIVERED" => Ok(Self::Delivered),
            "FAILED" => Ok(Self::Failed),
            "WITHDRAWN" => Ok(Self::Withdrawn),
            "AWAITING_HANDOFF" => Ok(Self::AwaitingHandoff),
            other => Err(DomainError::Validation(format!(
                "unknown order status: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Order {
    pub id: OrderId,
    pub submitted_by: String,
    pub origin: Location,
    pub destination: Location,
    status: OrderStatus,
    #[serde(rename = "assigned_drone_id", skip_serializing_if = "Option::is_none")]
    assigned_drone: Option<DroneId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn new(submitted_by: impl Into<String>, origin: Location, destination: Location) -> Self {
        let now = Utc::now();
        Self {
            id: OrderId::new(),
            submitted_by: submitted_by.into(),
            origin,
            destination,
            status: OrderStatus::Pending,
            assigned_drone: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Rehydrate a persisted order without running any transition checks.
    #[allow(clippy::too_many_arguments)]
    pub fn restore(
        id: OrderId,
        submitted_by: String,
        origin: Location,
        destination: Location,
        status: OrderStatus,
        assigned_drone: Option<DroneId>,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            submitted_by,
            origin,
            destination,
            status,
            assigned_drone,
            created_at,
            updated_at,
        }
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn assigned_drone(&self) -> Option<&DroneId> {
        self.assigned_drone.as_ref()
    }

    pub fn is_owned_by(&self, user: &str) -> bool {
        self.submitted_by == user
    }

    pub fn withdraw(&mut self) -> Result<(), DomainError> {
        self.require(&[OrderStatus::Pending], OrderStatus::Withdrawn.as_str())?;
        self.status = OrderStatus::Withdrawn;
        self.touch();
        Ok(())
    }

    pub fn assign(&mut self, drone_id: DroneId) -> Result<(), DomainError> {
        self.require(
            &[OrderStatus::Pending, OrderStatus::AwaitingHandoff],
            OrderStatus::Assigned.as_str(),
        )?;
        self.status = OrderStatus::Assigned;
        self.assigned_drone = Some(drone_id);
        self.touch();
        Ok(())
    }

    pub fn mark_picked_up(&mut self) -> Result<(), DomainError> {
        self.require(&[OrderStatus::Assigned], OrderStatus::PickedUp.as_str())?;
        self.status = OrderStatus::PickedUp;
        self.touch();
        Ok(())
    }

    pub fn mark_delivered(&mut self) -> Result<(), DomainError> {
        self.require(&[OrderStatus::PickedUp], OrderStatus::Delivered.as_str())?;
        self.status = OrderStatus::Delivered;
        self.assigned_drone = None;
        self.touch();
        Ok(())
    }

    pub fn mark_failed(&mut self) -> Result<(), DomainError> {
        self.require(&[OrderStatus::PickedUp], OrderStatus::Failed.as_str())?;
        self.status = OrderStatus::Failed;
        self.assigned_drone = None;
        self.touch();
        Ok(())
    }

    pub fn await_handoff(&mut self) -> Result<(), DomainError> {
        self.require(
            &[OrderStatus::Assigned, OrderStatus::PickedUp],
            OrderStatus::AwaitingHandoff.as_str(),
        )?;
        self.status = OrderStatus::AwaitingHandoff;
        self.assigned_drone = None;
        self.touch();
        Ok(())
    }

    pub fn update_origin(&mut self, origin: Location) -> Result<(), DomainError> {
        self.require_open("update_origin")?;
        self.origin = origin;
        self.touch();
        Ok(())
    }

    pub fn update_destination(&mut self, destination: Location) -> Result<(), DomainError> {
        self.require_open("update_destination")?;
        self.destination = destination;
        self.touch();
        Ok(())
    }

    fn require(&self, allowed: &[OrderStatus], to: &'static str) -> Result<(), DomainError> {
        if allowed.contains(&self.status) {
            Ok(())
        } else {
            Err(DomainError::InvalidTransition {
                from: self.status.as_str(),
                to,
            })
        }
    }

    fn require_open(&self, to: &'static str) -> Result<(), DomainError> {
        if self.status.is_terminal() {
            Err(DomainError::InvalidTransition {
                from: self.status.as_str(),
                to,
            })
        } else {
            Ok(())
        }
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order() -> Order {
        Order::new(
            "alice",
            Location::new(24.70, 46.67),
            Location::new(24.75, 46.70),
        )
    }

    fn drone(id: &str) -> DroneId {
        DroneId::new(id)
    }

    fn in_status(status: OrderStatus) -> Order {
        let mut o = order();
        match status {
            OrderStatus::Pending => {}
            OrderStatus::Assigned => o.assign(drone("d1")).unwrap(),
            OrderStatus::PickedUp => {
                o.assign(drone("d1")).unwrap();
                o.mark_picked_up().unwrap();
            }
            OrderStatus::Delivered => {
                o.assign(drone("d1")).unwrap();
                o.mark_picked_up().unwrap();
                o.mark_delivered().unwrap();
            }
            OrderStatus::Failed => {
                o.assign(drone("d1")).unwrap();
                o.mark_picked_up().unwrap();
                o.mark_failed().unwrap();
            }
            OrderStatus::Withdrawn => o.withdraw().unwrap(),
            OrderStatus::AwaitingHandoff => {
                o.assign(drone("d1")).unwrap();
                o.await_handoff().unwrap();
            }
        }
        o
    }

    const ALL: [OrderStatus; 7] = [
        OrderStatus::Pending,
        OrderStatus::Assigned,
        OrderStatus::PickedUp,
        OrderStatus::Delivered,
        OrderStatus::Failed,
        OrderStatus::Withdrawn,
        OrderStatus::AwaitingHandoff,
    ];

    #[test]
    fn test_new_order_is_pending_without_drone() {
        let o = order();
        assert_eq!(o.status(), OrderStatus::Pending);
        assert!(o.assigned_drone().is_none());
        assert!(o.is_owned_by("alice"));
    }

    #[test]
    fn test_withdraw_only_from_pending() {
        for status in ALL {
            let mut o = in_status(status);
            let before = o.clone();
            let result = o.withdraw();
            if status == OrderStatus::Pending {
                assert!(result.is_ok());
                assert_eq!(o.status(), OrderStatus::Withdrawn);
            } else {
                assert_eq!(
                    result.unwrap_err(),
                    DomainError::InvalidTransition {
                        from: status.as_str(),
                        to: "WITHDRAWN"
                    }
                );
                assert_eq!(o, before, "failed transition must not mutate");
            }
        }
    }

    #[test]
    fn test_assign_from_pending_and_awaiting_handoff() {
        for status in ALL {
            let mut o = in_status(status);
            let allowed = matches!(status, OrderStatus::Pending | OrderStatus::AwaitingHandoff);
            assert_eq!(o.assign(drone("d2")).is_ok(), allowed, "from {status}");
            if allowed {
                assert_eq!(o.status(), OrderStatus::Assigned);
                assert_eq!(o.assigned_drone(), Some(&drone("d2")));
            }
        }
    }

    #[test]
    fn test_pickup_and_finish() {
        let mut o = in_status(OrderStatus::Assigned);
        assert!(o.mark_delivered().is_err());
        o.mark_picked_up().unwrap();
        assert_eq!(o.assigned_drone(), Some(&drone("d1")));
        o.mark_delivered().unwrap();
        assert_eq!(o.status(), OrderStatus::Delivered);
        assert!(o.assigned_drone().is_none());

        let mut o = in_status(OrderStatus::PickedUp);
        o.mark_failed().unwrap();
        assert_eq!(o.status(), OrderStatus::Failed);
        assert!(o.assigned_drone().is_none());

        let mut o = in_status(OrderStatus::Pending);
        assert!(o.mark_picked_up().is_err());
        assert!(o.mark_failed().is_err());
    }

    #[test]
    fn test_await_handoff_clears_drone() {
        for status in [OrderStatus::Assigned, OrderStatus::PickedUp] {
            let mut o = in_status(status);
            o.await_handoff().unwrap();
            assert_eq!(o.status(), OrderStatus::AwaitingHandoff);
            assert!(o.assigned_drone().is_none());
        }
        let mut o = in_status(OrderStatus::Pending);
        assert!(o.await_handoff().is_err());
    }

    #[test]
    fn test_route_updates_blocked_when_terminal() {
        let dest = Location::new(24.8, 46.8);
        for status in ALL {
            let mut o = in_status(status);
            let result = o.update_destination(dest);
            if status.is_terminal() {
                assert_eq!(
                    result.unwrap_err(),
                    DomainError::InvalidTransition {
                        from: status.as_str(),
                        to: "update_destination"
                    }
                );
            } else {
                assert!(result.is_ok());
                assert_eq!(o.destination, dest);
            }
        }
        let mut o = in_status(OrderStatus::Withdrawn);
        assert!(o.update_origin(dest).is_err());
    }

    #[test]
    fn test_status_round_trips_through_str() {
        for status in ALL {
            assert_eq!(status.as_str().parse::<OrderStatus>().unwrap(), status);
        }
        assert!("SHIPPED".parse::<OrderStatus>().is_err());
    }
}
