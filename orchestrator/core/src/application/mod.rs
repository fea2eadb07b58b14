// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod admin_service;
pub mod drone_service;
pub mod job_service;
pub mod orchestrator;
pub mod order_service;

pub use admin_service::AdminService;
pub use drone_service::DroneService;
pub use job_service::JobService;
pub use orchestrator::{BrokenOutcome, CancelOutcome, DeliveryOrchestrator};
pub use order_service::{OrderDetails, OrderService, OrderUpdate};
