// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Fleet administration: manual drone status changes.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;

use crate::application::orchestrator::{BrokenOutcome, DeliveryOrchestrator};
use crate::domain::drone::DroneId;
use crate::domain::error::DomainError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DroneStatusChange {
    Broken,
    Fixed,
}

impl FromStr for DroneStatusChange {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "broken" => Ok(Self::Broken),
            "fixed" => Ok(Self::Fixed),
            _ => Err(DomainError::Validation(
                "status must be 'broken' or 'fixed'".to_string(),
            )),
        }
    }
}

pub struct AdminService {
    orchestrator: Arc<DeliveryOrchestrator>,
}

impl AdminService {
    pub fn new(orchestrator: Arc<DeliveryOrchestrator>) -> Self {
        Self { orchestrator }
    }

    /// `Some` only for a `broken` change.
    pub async fn update_drone_status(
        &self,
        drone_id: &DroneId,
        status: &str,
    ) -> Result<Option<BrokenOutcome>, DomainError> {
        match status.parse::<DroneStatusChange>()? {
            DroneStatusChange::Broken => self.orchestrator.handle_drone_broken(drone_id).await.map(Some),
            DroneStatusChange::Fixed => {
                self.orchestrator.mark_drone_fixed(drone_id).await?;
                Ok(None)
            }
        }
    }
}
