// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Node Configuration
//!
//! `skyhaul-config.yaml` schema plus the discovery and environment-override
//! rules used by the daemon and the `config` subcommands.
//!
//! Precedence, lowest to highest: built-in defaults, the YAML file, then
//! environment variables (`DATABASE_URL`, `REDIS_URL`, `JWT_SECRET`, ...).
//! Every section may be omitted from the file.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::domain::location::{DeliveryZone, Location};

pub const DEFAULT_JWT_SECRET: &str = "default-secret-change-me";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub auth: AuthConfig,

    #[serde(default)]
    pub resilience: ResilienceConfig,

    #[serde(default)]
    pub zone: ZoneConfig,

    #[serde(default)]
    pub drone: DroneConfig,

    #[serde(default)]
    pub routing: RoutingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Grace period for in-flight requests on shutdown
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,
}

/// PostgreSQL connection. No URL means the daemon runs on the in-memory store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

/// Redis connection. No URL means in-process caches.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default = "default_jwt_secret")]
    pub jwt_secret: String,

    #[serde(default = "default_token_expiry_hours")]
    pub token_expiry_hours: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResilienceConfig {
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerConfig,

    #[serde(default)]
    pub bulkhead: BulkheadConfig,

    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    #[serde(default)]
    pub idempotency: IdempotencyConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    #[serde(default = "default_cooldown")]
    pub cooldown_secs: u64,

    /// Per-route tuning keyed by method and route pattern, e.g. `DELETE /orders/{id}`
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub overrides: HashMap<String, CircuitBreakerOverride>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CircuitBreakerOverride {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_threshold: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub cooldown_secs: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkheadConfig {
    #[serde(default = "default_heartbeat_pool")]
    pub heartbeat: usize,

    #[serde(default = "default_mutation_pool")]
    pub mutation: usize,

    #[serde(default = "default_admin_pool")]
    pub admin: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_max_requests")]
    pub max_requests: u64,

    #[serde(default = "default_window")]
    pub window_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdempotencyConfig {
    #[serde(default = "default_idempotency_ttl")]
    pub ttl_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneConfig {
    #[serde(default = "default_center_lat")]
    pub center_lat: f64,

    #[serde(default = "default_center_lng")]
    pub center_lng: f64,

    #[serde(default = "default_radius_km")]
    pub radius_km: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DroneConfig {
    #[serde(default = "default_speed_kmh")]
    pub speed_kmh: f64,

    #[serde(default = "default_location_cache_ttl")]
    pub location_cache_ttl_secs: u64,
}

/// Mapbox Directions. Routing is disabled without an access token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingConfig {
    #[serde(default = "default_routing_base_url")]
    pub base_url: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,

    #[serde(default = "default_routing_timeout")]
    pub timeout_secs: u64,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_shutdown_timeout() -> u64 {
    5
}

fn default_max_connections() -> u32 {
    10
}

fn default_jwt_secret() -> String {
    DEFAULT_JWT_SECRET.to_string()
}

fn default_token_expiry_hours() -> u64 {
    24
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_cooldown() -> u64 {
    30
}

fn default_heartbeat_pool() -> usize {
    100
}

fn default_mutation_pool() -> usize {
    50
}

fn default_admin_pool() -> usize {
    20
}

fn default_max_requests() -> u64 {
    100
}

fn default_window() -> u64 {
    60
}

fn default_idempotency_ttl() -> u64 {
    300
}

fn default_center_lat() -> f64 {
    24.7136
}

fn default_center_lng() -> f64 {
    46.6753
}

fn default_radius_km() -> f64 {
    50.0
}

fn default_speed_kmh() -> f64 {
    50.0
}

fn default_location_cache_ttl() -> u64 {
    60
}

fn default_routing_base_url() -> String {
    "https://api.mapbox.com".to_string()
}

fn default_routing_timeout() -> u64 {
    3
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            shutdown_timeout_secs: default_shutdown_timeout(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: default_max_connections(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: default_jwt_secret(),
            token_expiry_hours: default_token_expiry_hours(),
        }
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            cooldown_secs: default_cooldown(),
            overrides: HashMap::new(),
        }
    }
}

impl Default for BulkheadConfig {
    fn default() -> Self {
        Self {
            heartbeat: default_heartbeat_pool(),
            mutation: default_mutation_pool(),
            admin: default_admin_pool(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: default_max_requests(),
            window_secs: default_window(),
        }
    }
}

impl Default for IdempotencyConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_idempotency_ttl(),
        }
    }
}

impl Default for ZoneConfig {
    fn default() -> Self {
        Self {
            center_lat: default_center_lat(),
            center_lng: default_center_lng(),
            radius_km: default_radius_km(),
        }
    }
}

impl Default for DroneConfig {
    fn default() -> Self {
        Self {
            speed_kmh: default_speed_kmh(),
            location_cache_ttl_secs: default_location_cache_ttl(),
        }
    }
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            base_url: default_routing_base_url(),
            access_token: None,
            timeout_secs: default_routing_timeout(),
        }
    }
}

impl ZoneConfig {
    pub fn delivery_zone(&self) -> DeliveryZone {
        DeliveryZone {
            center: Location::new(self.center_lat, self.center_lng),
            radius_km: self.radius_km,
        }
    }
}

impl CircuitBreakerConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }
}

impl NodeConfig {
    /// Load configuration from YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Parse configuration from YAML string
    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    pub fn to_yaml_string(&self) -> anyhow::Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Discover configuration file using precedence order
    /// 1. SKYHAUL_CONFIG_PATH environment variable
    /// 2. ./skyhaul-config.yaml (working directory)
    /// 3. /etc/skyhaul/config.yaml
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("SKYHAUL_CONFIG_PATH") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        Self::search_paths().into_iter().find(|p| p.exists())
    }

    pub fn search_paths() -> Vec<PathBuf> {
        vec![
            PathBuf::from("./skyhaul-config.yaml"),
            PathBuf::from("/etc/skyhaul/config.yaml"),
        ]
    }

    /// Load configuration with discovery, fallback to default
    pub fn load_or_default(cli_path: Option<PathBuf>) -> anyhow::Result<Self> {
        let mut config = if let Some(path) = cli_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            Self::from_yaml_file(&path)
                .map_err(|e| anyhow::anyhow!("Failed to load config at {:?}: {}", path, e))?
        } else if let Some(config_path) = Self::discover_config() {
            tracing::info!("Loading configuration from discovered path: {:?}", config_path);
            Self::from_yaml_file(config_path)?
        } else {
            tracing::warn!("No configuration file found in standard locations. Using defaults.");
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Same as [`NodeConfig::apply_env_overrides`] with an injectable lookup.
    pub fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("DATABASE_URL").filter(|v| !v.is_empty()) {
            tracing::info!("Environment override: DATABASE_URL");
            self.database.url = Some(url);
        }
        if let Some(url) = lookup("REDIS_URL").filter(|v| !v.is_empty()) {
            tracing::info!("Environment override: REDIS_URL");
            self.cache.url = Some(url);
        }
        if let Some(secret) = lookup("JWT_SECRET").filter(|v| !v.is_empty()) {
            tracing::info!("Environment override: JWT_SECRET");
            self.auth.jwt_secret = secret;
        }
        if let Some(token) = lookup("MAPBOX_ACCESS_TOKEN").filter(|v| !v.is_empty()) {
            tracing::info!("Environment override: MAPBOX_ACCESS_TOKEN");
            self.routing.access_token = Some(token);
        }
        if let Some(url) = lookup("MAPBOX_BASE_URL").filter(|v| !v.is_empty()) {
            tracing::info!("Environment override: MAPBOX_BASE_URL={}", url);
            self.routing.base_url = url;
        }

        override_parsed(&lookup, "PORT", &mut self.server.port);
        override_parsed(&lookup, "SHUTDOWN_TIMEOUT_SECONDS", &mut self.server.shutdown_timeout_secs);
        override_parsed(&lookup, "JWT_EXPIRY_HOURS", &mut self.auth.token_expiry_hours);

        let resilience = &mut self.resilience;
        override_parsed(&lookup, "RATE_LIMIT_MAX_REQUESTS", &mut resilience.rate_limit.max_requests);
        override_parsed(&lookup, "RATE_LIMIT_WINDOW_SECONDS", &mut resilience.rate_limit.window_secs);
        override_parsed(&lookup, "CB_FAILURE_THRESHOLD", &mut resilience.circuit_breaker.failure_threshold);
        override_parsed(&lookup, "CB_COOLDOWN_SECONDS", &mut resilience.circuit_breaker.cooldown_secs);
        override_parsed(&lookup, "BULKHEAD_HEARTBEAT_POOL", &mut resilience.bulkhead.heartbeat);
        override_parsed(&lookup, "BULKHEAD_MUTATION_POOL", &mut resilience.bulkhead.mutation);
        override_parsed(&lookup, "BULKHEAD_ADMIN_POOL", &mut resilience.bulkhead.admin);
        override_parsed(&lookup, "IDEMPOTENCY_TTL_SECONDS", &mut resilience.idempotency.ttl_secs);

        override_parsed(&lookup, "ZONE_CENTER_LAT", &mut self.zone.center_lat);
        override_parsed(&lookup, "ZONE_CENTER_LNG", &mut self.zone.center_lng);
        override_parsed(&lookup, "ZONE_RADIUS_KM", &mut self.zone.radius_km);
        override_parsed(&lookup, "DRONE_SPEED_KMH", &mut self.drone.speed_kmh);
        override_parsed(
            &lookup,
            "DRONE_LOCATION_CACHE_TTL_SECONDS",
            &mut self.drone.location_cache_ttl_secs,
        );
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.auth.jwt_secret.is_empty() {
            anyhow::bail!("auth.jwt_secret cannot be empty");
        }
        if self.auth.jwt_secret == DEFAULT_JWT_SECRET {
            tracing::warn!("auth.jwt_secret is the built-in default; set JWT_SECRET in production");
        }
        if self.auth.token_expiry_hours == 0 {
            anyhow::bail!("auth.token_expiry_hours must be greater than 0");
        }

        let cb = &self.resilience.circuit_breaker;
        if cb.failure_threshold == 0 {
            anyhow::bail!("resilience.circuit_breaker.failure_threshold must be greater than 0");
        }
        if cb.cooldown_secs == 0 {
            anyhow::bail!("resilience.circuit_breaker.cooldown_secs must be greater than 0");
        }
        for (route, o) in &cb.overrides {
            if o.failure_threshold == Some(0) || o.cooldown_secs == Some(0) {
                anyhow::bail!("circuit breaker override for '{}' must use positive values", route);
            }
        }

        let bh = &self.resilience.bulkhead;
        for (name, size) in [
            ("heartbeat", bh.heartbeat),
            ("mutation", bh.mutation),
            ("admin", bh.admin),
        ] {
            if size == 0 {
                anyhow::bail!("resilience.bulkhead.{} must be greater than 0", name);
            }
        }

        let rl = &self.resilience.rate_limit;
        if rl.max_requests == 0 || rl.window_secs == 0 {
            anyhow::bail!("resilience.rate_limit requires positive max_requests and window_secs");
        }
        if self.resilience.idempotency.ttl_secs == 0 {
            anyhow::bail!("resilience.idempotency.ttl_secs must be greater than 0");
        }

        if Location::new(self.zone.center_lat, self.zone.center_lng)
            .validate()
            .is_err()
        {
            anyhow::bail!(
                "zone center ({}, {}) is not a valid coordinate",
                self.zone.center_lat,
                self.zone.center_lng
            );
        }
        if self.zone.radius_km <= 0.0 {
            anyhow::bail!("zone.radius_km must be greater than 0");
        }
        if self.drone.speed_kmh <= 0.0 {
            anyhow::bail!("drone.speed_kmh must be greater than 0");
        }
        if self.drone.location_cache_ttl_secs == 0 {
            anyhow::bail!("drone.location_cache_ttl_secs must be greater than 0");
        }

        Ok(())
    }
}

fn override_parsed<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, target: &mut T)
where
    T: FromStr + std::fmt::Display,
{
    let Some(raw) = lookup(key) else {
        return;
    };
    match raw.trim().parse::<T>() {
        Ok(value) => {
            tracing::info!("Environment override: {}={}", key, value);
            *target = value;
        }
        Err(_) => {
            tracing::warn!("Invalid value for {}: '{}'. Ignoring.", key, raw);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = NodeConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.resilience.circuit_breaker.failure_threshold, 5);
        assert_eq!(config.resilience.circuit_breaker.cooldown_secs, 30);
        assert_eq!(config.resilience.bulkhead.heartbeat, 100);
        assert_eq!(config.resilience.bulkhead.mutation, 50);
        assert_eq!(config.resilience.bulkhead.admin, 20);
        assert_eq!(config.resilience.rate_limit.max_requests, 100);
        assert_eq!(config.resilience.rate_limit.window_secs, 60);
        assert_eq!(config.resilience.idempotency.ttl_secs, 300);
        assert_eq!(config.drone.location_cache_ttl_secs, 60);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let yaml = r#"
server:
  port: 9090
resilience:
  circuit_breaker:
    failure_threshold: 3
    overrides:
      "/drone/me/heartbeat":
        cooldown_secs: 5
zone:
  radius_km: 12.5
"#;
        let config = NodeConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.resilience.circuit_breaker.failure_threshold, 3);
        assert_eq!(config.resilience.circuit_breaker.cooldown_secs, 30);
        assert_eq!(
            config.resilience.circuit_breaker.overrides["/drone/me/heartbeat"].cooldown_secs,
            Some(5)
        );
        assert_eq!(config.zone.radius_km, 12.5);
        assert_eq!(config.zone.center_lat, 24.7136);
    }

    #[test]
    fn test_yaml_file_roundtrip() {
        let mut config = NodeConfig::default();
        config.database.url = Some("postgres://localhost/skyhaul".into());
        config.resilience.bulkhead.admin = 4;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(config.to_yaml_string().unwrap().as_bytes())
            .unwrap();

        let loaded = NodeConfig::load_or_default(Some(file.path().to_path_buf())).unwrap();
        assert_eq!(loaded.resilience.bulkhead.admin, 4);
        assert!(loaded.database.url.is_some());
    }

    #[test]
    fn test_missing_explicit_path_fails() {
        let result = NodeConfig::load_or_default(Some(PathBuf::from("/nonexistent/skyhaul.yaml")));
        assert!(result.is_err());
    }

    #[test]
    fn test_overrides_from_lookup() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("DATABASE_URL", "postgres://db/skyhaul"),
            ("REDIS_URL", "redis://cache:6379"),
            ("CB_FAILURE_THRESHOLD", "7"),
            ("BULKHEAD_MUTATION_POOL", "12"),
            ("ZONE_RADIUS_KM", "25.5"),
            ("RATE_LIMIT_WINDOW_SECONDS", "not-a-number"),
        ]);
        let mut config = NodeConfig::default();
        config.apply_overrides_from(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.database.url.as_deref(), Some("postgres://db/skyhaul"));
        assert_eq!(config.cache.url.as_deref(), Some("redis://cache:6379"));
        assert_eq!(config.resilience.circuit_breaker.failure_threshold, 7);
        assert_eq!(config.resilience.bulkhead.mutation, 12);
        assert_eq!(config.zone.radius_km, 25.5);
        // unparsable values leave the default in place
        assert_eq!(config.resilience.rate_limit.window_secs, 60);
    }

    #[test]
    fn test_validation() {
        let mut config = NodeConfig::default();
        config.resilience.bulkhead.mutation = 0;
        assert!(config.validate().is_err());

        let mut config = NodeConfig::default();
        config.zone.center_lat = 120.0;
        assert!(config.validate().is_err());

        let mut config = NodeConfig::default();
        config.auth.jwt_secret.clear();
        assert!(config.validate().is_err());

        let mut config = NodeConfig::default();
        config.resilience.circuit_breaker.overrides.insert(
            "/orders".into(),
            CircuitBreakerOverride {
                failure_threshold: Some(0),
                cooldown_secs: None,
            },
        );
        assert!(config.validate().is_err());
    }
}
