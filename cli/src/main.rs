// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # Skyhaul CLI
//!
//! The `skyhaul` binary runs the drone dispatch HTTP service and a handful of
//! operator commands around it.
//!
//! ## Commands
//!
//! - `skyhaul serve [--in-memory]` - Run the HTTP service
//! - `skyhaul migrate` - Apply PostgreSQL migrations and exit
//! - `skyhaul token --name <NAME> --role <ROLE>` - Mint a bearer token
//! - `skyhaul config show|validate|generate` - Configuration management

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::path::PathBuf;

use skyhaul_cli::commands::{self, ConfigCommand};
use skyhaul_cli::daemon;

/// Skyhaul - drone delivery dispatch
#[derive(Parser)]
#[command(name = "skyhaul")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(
        short,
        long,
        global = true,
        env = "SKYHAUL_CONFIG_PATH",
        value_name = "FILE"
    )]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "SKYHAUL_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Log output format
    #[arg(
        long,
        global = true,
        env = "SKYHAUL_LOG_FORMAT",
        value_enum,
        default_value_t = LogFormat::Compact
    )]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Compact,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP service
    #[command(name = "serve")]
    Serve {
        /// Ignore database and cache URLs and keep all state in process
        #[arg(long)]
        in_memory: bool,

        /// HTTP port (overrides configuration)
        #[arg(long, env = "SKYHAUL_PORT")]
        port: Option<u16>,

        /// HTTP host (overrides configuration)
        #[arg(long, env = "SKYHAUL_HOST")]
        host: Option<String>,
    },

    /// Apply database migrations and exit
    #[command(name = "migrate")]
    Migrate,

    /// Issue a bearer token for local testing
    #[command(name = "token")]
    Token {
        #[command(flatten)]
        command: commands::TokenCommand,
    },

    /// Configuration management
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is normal outside development.
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    init_logging(&cli.log_level, cli.log_format)?;

    match cli.command {
        Some(Commands::Serve {
            in_memory,
            port,
            host,
        }) => {
            let overrides = daemon::ServeOverrides {
                in_memory,
                port,
                host,
            };
            daemon::start_daemon(cli.config, overrides).await
        }
        Some(Commands::Migrate) => commands::migrate::execute(cli.config).await,
        Some(Commands::Token { command }) => commands::token::execute(command, cli.config),
        Some(Commands::Config { command }) => {
            commands::config::handle_command(command, cli.config).await
        }
        None => {
            eprintln!("{}", "No command specified. Use --help for usage.".yellow());
            std::process::exit(1);
        }
    }
}

/// Initialize tracing subscriber for logging
fn init_logging(level: &str, format: LogFormat) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    match format {
        LogFormat::Compact => builder.with_target(false).compact().init(),
        LogFormat::Json => builder.json().init(),
    }

    Ok(())
}
