// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Daemon HTTP server implementation

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::oneshot;
use tracing::{info, warn};

use skyhaul_core::{
    domain::node_config::NodeConfig,
    domain::routing::RouteDistanceProvider,
    infrastructure::{
        db::Database,
        redis::{
            self as redis_cache, RedisDroneLocationCache, RedisIdempotencyStore,
            RedisRateLimitBackend,
        },
        repositories::{
            PostgresDeliveryStore, PostgresDroneRepository, PostgresJobRepository,
            PostgresOrderRepository,
        },
        MapboxRouteClient,
    },
    presentation::api::{app, AppState, Backends},
};

/// Command-line adjustments applied on top of the loaded configuration.
#[derive(Debug, Clone, Default)]
pub struct ServeOverrides {
    pub in_memory: bool,
    pub port: Option<u16>,
    pub host: Option<String>,
}

impl ServeOverrides {
    fn apply(&self, config: &mut NodeConfig) {
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(host) = &self.host {
            config.server.host = host.clone();
        }
        if self.in_memory {
            config.database.url = None;
            config.cache.url = None;
        }
    }
}

pub async fn start_daemon(config_path: Option<PathBuf>, overrides: ServeOverrides) -> Result<()> {
    let mut config = NodeConfig::load_or_default(config_path).context("Failed to load configuration")?;
    overrides.apply(&mut config);

    config.validate().context("Configuration validation failed")?;

    info!(
        "Skyhaul starting (PID: {}, version {})",
        std::process::id(),
        env!("CARGO_PKG_VERSION")
    );

    let backends = build_backends(&config).await?;
    let state = Arc::new(AppState::from_config(&config, backends));
    let app = app(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!("HTTP API listening on {}", addr);

    let (drain_tx, drain_rx) = oneshot::channel::<()>();
    let server = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        shutdown_signal().await;
        let _ = drain_tx.send(());
    });
    let mut server = tokio::spawn(async move { server.await });

    let grace = Duration::from_secs(config.server.shutdown_timeout_secs);
    tokio::select! {
        result = &mut server => {
            result.context("HTTP server task failed")?.context("HTTP server failed")?;
        }
        _ = async {
            if drain_rx.await.is_ok() {
                tokio::time::sleep(grace).await;
            } else {
                std::future::pending::<()>().await;
            }
        } => {
            warn!("In-flight requests still running after {}s; exiting", grace.as_secs());
            server.abort();
        }
    }

    info!("Skyhaul stopped");

    Ok(())
}

async fn build_backends(config: &NodeConfig) -> Result<Backends> {
    let mut backends = Backends::in_memory();

    match config.database.url.as_deref() {
        Some(url) => {
            let db = Database::new(url, config.database.max_connections).await?;
            db.migrate().await?;
            let pool = db.get_pool().clone();

            backends.store = Arc::new(PostgresDeliveryStore::new(pool.clone()));
            backends.orders = Arc::new(PostgresOrderRepository::new(pool.clone()));
            backends.drones = Arc::new(PostgresDroneRepository::new(pool.clone()));
            backends.jobs = Arc::new(PostgresJobRepository::new(pool));
            info!("Storage: PostgreSQL");
        }
        None => warn!("Storage: in-memory (state is lost on restart)"),
    }

    match config.cache.url.as_deref() {
        Some(url) => {
            let conn = redis_cache::connect(url).await?;
            backends.location_cache = Arc::new(RedisDroneLocationCache::new(conn.clone()));
            backends.rate_limit = Arc::new(RedisRateLimitBackend::new(conn.clone()));
            backends.idempotency = Arc::new(RedisIdempotencyStore::new(conn));
            info!("Cache: Redis");
        }
        None => info!("Cache: in-process"),
    }

    if config.routing.access_token.is_some() {
        let client = MapboxRouteClient::from_config(&config.routing)
            .context("Failed to build routing client")?;
        backends.routes = Some(Arc::new(client) as Arc<dyn RouteDistanceProvider>);
        info!("Routing: {}", config.routing.base_url);
    }

    Ok(backends)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_memory_flag_clears_backend_urls() {
        let mut config = NodeConfig::default();
        config.database.url = Some("postgres://localhost/skyhaul".to_string());
        config.cache.url = Some("redis://localhost".to_string());

        ServeOverrides {
            in_memory: true,
            port: Some(9090),
            host: None,
        }
        .apply(&mut config);

        assert!(config.database.url.is_none());
        assert!(config.cache.url.is_none());
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.server.host, "0.0.0.0");
    }

    #[tokio::test]
    async fn test_default_backends_are_in_memory() {
        let backends = build_backends(&NodeConfig::default()).await.unwrap();
        assert!(backends.routes.is_none());
        backends.store.ping().await.unwrap();
    }
}
