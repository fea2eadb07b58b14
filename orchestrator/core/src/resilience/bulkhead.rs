// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Bulkheads
//!
//! One bounded pool per workload class so a flood of heartbeats cannot starve
//! order mutations (and vice versa). Admission never waits: when a pool is
//! full the caller is rejected immediately.
//!
//! A [`BulkheadPermit`] returns its slot when dropped, which covers normal
//! completion, early returns, cancelled futures and panics alike.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::domain::node_config::BulkheadConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkloadClass {
    Heartbeat,
    Mutation,
    Admin,
}

impl WorkloadClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Heartbeat => "heartbeat",
            Self::Mutation => "mutation",
            Self::Admin => "admin",
        }
    }
}

impl std::fmt::Display for WorkloadClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug)]
pub struct BulkheadPermit {
    _permit: OwnedSemaphorePermit,
}

#[derive(Debug)]
struct Pool {
    capacity: usize,
    semaphore: Arc<Semaphore>,
}

#[derive(Debug)]
pub struct BulkheadRegistry {
    pools: HashMap<WorkloadClass, Pool>,
}

impl BulkheadRegistry {
    pub fn new(heartbeat: usize, mutation: usize, admin: usize) -> Self {
        let pools = [
            (WorkloadClass::Heartbeat, heartbeat),
            (WorkloadClass::Mutation, mutation),
            (WorkloadClass::Admin, admin),
        ]
        .into_iter()
        .map(|(class, capacity)| {
            (
                class,
                Pool {
                    capacity,
                    semaphore: Arc::new(Semaphore::new(capacity)),
                },
            )
        })
        .collect();
        Self { pools }
    }

    pub fn from_config(config: &BulkheadConfig) -> Self {
        Self::new(config.heartbeat, config.mutation, config.admin)
    }

    /// `None` when the class is at capacity.
    pub fn try_acquire(&self, class: WorkloadClass) -> Option<BulkheadPermit> {
        let pool = self.pools.get(&class)?;
        pool.semaphore
            .clone()
            .try_acquire_owned()
            .ok()
            .map(|permit| BulkheadPermit { _permit: permit })
    }

    pub fn capacity(&self, class: WorkloadClass) -> usize {
        self.pools.get(&class).map_or(0, |p| p.capacity)
    }

    pub fn in_flight(&self, class: WorkloadClass) -> usize {
        self.pools
            .get(&class)
            .map_or(0, |p| p.capacity - p.semaphore.available_permits())
    }
}
