// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! `skyhaul migrate` - apply the embedded PostgreSQL migrations and exit.

use anyhow::{Context, Result};
use colored::Colorize;
use std::path::PathBuf;

use skyhaul_core::domain::node_config::NodeConfig;
use skyhaul_core::infrastructure::db::Database;

pub async fn execute(config_path: Option<PathBuf>) -> Result<()> {
    let config = NodeConfig::load_or_default(config_path).context("Failed to load configuration")?;

    let url = config
        .database
        .url
        .as_deref()
        .context("No database configured (set DATABASE_URL or database.url)")?;

    let db = Database::new(url, config.database.max_connections).await?;
    db.migrate().await?;

    println!("{}", "✓ Migrations applied".green());
    Ok(())
}
