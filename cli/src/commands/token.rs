// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! `skyhaul token` - mint a bearer token signed with the configured secret.
//!
//! Equivalent to `POST /auth/token` without a running server.

use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;

use skyhaul_core::domain::node_config::NodeConfig;
use skyhaul_core::presentation::auth::{JwtIdentity, Role};

#[derive(Args)]
pub struct TokenCommand {
    /// Subject name; drones use their drone id
    #[arg(long)]
    pub name: String,

    /// enduser, drone or admin
    #[arg(long, default_value = "enduser")]
    pub role: String,
}

pub fn execute(command: TokenCommand, config_path: Option<PathBuf>) -> Result<()> {
    let config = NodeConfig::load_or_default(config_path).context("Failed to load configuration")?;
    let token = issue(&config, &command)?;
    println!("{}", token);
    Ok(())
}

fn issue(config: &NodeConfig, command: &TokenCommand) -> Result<String> {
    let role: Role = command.role.parse()?;
    let identity = JwtIdentity::new(&config.auth.jwt_secret, config.auth.token_expiry_hours);
    Ok(identity.issue(&command.name, role)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issued_token_verifies_with_same_secret() {
        let config = NodeConfig::default();
        let command = TokenCommand {
            name: "drone-7".to_string(),
            role: "drone".to_string(),
        };

        let token = issue(&config, &command).unwrap();
        let identity = JwtIdentity::new(&config.auth.jwt_secret, 1);
        let caller = identity.verify(&token).unwrap();
        assert_eq!(caller.subject, "drone-7");
        assert_eq!(caller.role, Role::Drone);
    }

    #[test]
    fn test_rejects_unknown_role() {
        let command = TokenCommand {
            name: "alice".to_string(),
            role: "pilot".to_string(),
        };
        assert!(issue(&NodeConfig::default(), &command).is_err());
    }
}
