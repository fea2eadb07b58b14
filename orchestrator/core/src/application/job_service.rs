// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Read-side access to the job board. Reservation goes through
//! [`crate::application::orchestrator::DeliveryOrchestrator`].

use std::sync::Arc;

use crate::domain::error::DomainError;
use crate::domain::job::Job;
use crate::domain::repository::JobRepository;

pub struct JobService {
    jobs: Arc<dyn JobRepository>,
}

impl JobService {
    pub fn new(jobs: Arc<dyn JobRepository>) -> Self {
        Self { jobs }
    }

    pub async fn list_open(&self) -> Result<Vec<Job>, DomainError> {
        Ok(self.jobs.list_open().await?)
    }
}
