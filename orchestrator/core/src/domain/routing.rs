// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Optional road-distance estimates used for ETA. Never on the control path.

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::domain::location::Location;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RouteEstimate {
    pub distance_km: f64,
    pub duration_min: f64,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RouteError {
    #[error("Route request failed: {0}")]
    Request(String),

    #[error("No route found")]
    NoRoute,

    #[error("Route service not configured")]
    NotConfigured,
}

impl From<reqwest::Error> for RouteError {
    fn from(err: reqwest::Error) -> Self {
        RouteError::Request(err.to_string())
    }
}

#[async_trait]
pub trait RouteDistanceProvider: Send + Sync {
    async fn estimate(&self, from: Location, to: Location) -> Result<RouteEstimate, RouteError>;
}
