// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Job Aggregate
//!
//! A dispatchable unit of work derived from an order. An order has at most one
//! active (`OPEN` or `RESERVED`) job at a time; a drone binding exists only
//! while the job is `RESERVED`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use crate::domain::drone::DroneId;
use crate::domain::error::DomainError;
use crate::domain::order::OrderId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_string(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Open,
    Reserved,
    Completed,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "OPEN",
            Self::Reserved => "RESERVED",
            Self::Completed => "COMPLETED",
            Self::Cancelled => "CANCELLED",
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Self::Open | Self::Reserved)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "OPEN" => Ok(Self::Open),
            "RESERVED" => Ok(Self::Reserved),
            "COMPLETED" => Ok(Self::Completed),
            "CANCELLED" => Ok(Self::Cancelled),
            other => Err(DomainError::Validation(format!("unknown job status: {other}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Job {
    pub id: JobId,
    pub order_id: OrderId,
    status: JobStatus,
    #[serde(rename = "reserved_by_drone_id", skip_serializing_if = "Option::is_none")]
    reserved_by: Option<DroneId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    pub fn new(order_id: OrderId) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            order_id,
            status: JobStatus::Open,
            reserved_by: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn restore(
        id: JobId,
        order_id: OrderId,
        status: JobStatus,
        reserved_by: Option<DroneId>,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            order_id,
            status,
            reserved_by,
            created_at,
            updated_at,
        }
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn reserved_by(&self) -> Option<&DroneId> {
        self.reserved_by.as_ref()
    }

    /// The losing side of a reservation race lands here with `Conflict`.
    pub fn reserve(&mut self, drone_id: DroneId) -> Result<(), DomainError> {
        if self.status != JobStatus::Open {
            return Err(DomainError::Conflict(
                "job is already reserved by another drone".to_string(),
            ));
        }
        self.status = JobStatus::Reserved;
        self.reserved_by = Some(drone_id);
        self.touch();
        Ok(())
    }

    pub fn complete(&mut self) -> Result<(), DomainError> {
        if self.status != JobStatus::Reserved {
            return Err(DomainError::InvalidTransition {
                from: self.status.as_str(),
                to: JobStatus::Completed.as_str(),
            });
        }
        self.status = JobStatus::Completed;
        self.reserved_by = None;
        self.touch();
        Ok(())
    }

    pub fn cancel(&mut self) -> Result<(), DomainError> {
        if !self.status.is_active() {
            return Err(DomainError::InvalidTransition {
                from: self.status.as_str(),
                to: JobStatus::Cancelled.as_str(),
            });
        }
        self.status = JobStatus::Cancelled;
        self.reserved_by = None;
        self.touch();
        Ok(())
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserve_then_complete() {
        let mut job = Job::new(OrderId::new());
        job.reserve(DroneId::new("d1")).unwrap();
        assert_eq!(job.status(), JobStatus::Reserved);
        assert_eq!(job.reserved_by(), Some(&DroneId::new("d1")));

        job.complete().unwrap();
        assert_eq!(job.status(), JobStatus::Completed);
        assert!(job.reserved_by().is_none());
    }

    #[test]
    fn test_second_reserve_conflicts() {
        let mut job = Job::new(OrderId::new());
        job.reserve(DroneId::new("d1")).unwrap();
        let err = job.reserve(DroneId::new("d2")).unwrap_err();
        assert_eq!(err.code(), "CONFLICT");
        assert_eq!(job.reserved_by(), Some(&DroneId::new("d1")));
    }

    #[test]
    fn test_complete_requires_reserved() {
        let mut job = Job::new(OrderId::new());
        assert_eq!(
            job.complete().unwrap_err(),
            DomainError::InvalidTransition {
                from: "OPEN",
                to: "COMPLETED"
            }
        );
    }

    #[test]
    fn test_cancel_active_only() {
        let mut open = Job::new(OrderId::new());
        open.cancel().unwrap();
        assert_eq!(open.status(), JobStatus::Cancelled);
        assert!(open.cancel().is_err());

        let mut reserved = Job::new(OrderId::new());
        reserved.reserve(DroneId::new("d1")).unwrap();
        reserved.cancel().unwrap();
        assert!(reserved.reserved_by().is_none());

        let mut done = Job::new(OrderId::new());
        done.reserve(DroneId::new("d1")).unwrap();
        done.complete().unwrap();
        assert!(done.cancel().is_err());
        assert!(done.reserve(DroneId::new("d2")).is_err());
    }
}
