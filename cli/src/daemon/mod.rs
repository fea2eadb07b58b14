// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Daemon mode implementation
//!
//! Handles:
//! - Backend selection (PostgreSQL / Redis or in-process)
//! - HTTP listener bootstrap
//! - Graceful shutdown

pub mod server;

pub use server::{start_daemon, ServeOverrides};
