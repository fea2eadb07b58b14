// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Idempotent Replay
//!
//! Responses to mutations carrying an `Idempotency-Key` header are memoized
//! per `(caller, key)` for a bounded time. Only 2xx responses are stored, and
//! the first writer wins (`put_if_absent`). Store failures never reject a
//! request: a failed lookup executes the handler, a failed write skips
//! caching.
//!
//! While a keyed request runs, an [`InFlightClaim`] marks `(caller, key)` as
//! in progress on this process, and a duplicate arriving meanwhile is turned
//! away instead of executing twice. Claims are process-local: two replicas
//! sharing one Redis can still both miss and both execute, and the
//! `put_if_absent` write then keeps the first response.

use async_trait::async_trait;
use base64::Engine;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error};

use crate::domain::cache::CacheError;
use crate::domain::node_config::IdempotencyConfig;

pub const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

/// Response bytes captured exactly as first sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedResponse {
    pub status: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(serialize_with = "encode_body", deserialize_with = "decode_body")]
    pub body: Vec<u8>,
}

impl CachedResponse {
    pub fn is_cacheable(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

fn encode_body<S: Serializer>(body: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&base64::engine::general_purpose::STANDARD.encode(body))
}

fn decode_body<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
    let encoded = String::deserialize(deserializer)?;
    base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .map_err(serde::de::Error::custom)
}

#[async_trait]
pub trait IdempotencyStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<CachedResponse>, CacheError>;

    /// Returns `false` when a record already exists under `key`.
    async fn put_if_absent(
        &self,
        key: &str,
        response: &CachedResponse,
        ttl: Duration,
    ) -> Result<bool, CacheError>;
}

pub fn idempotency_key(subject: &str, client_key: &str) -> String {
    format!("idempotency:{subject}:{client_key}")
}

/// Marks a `(caller, key)` pair as executing until dropped.
#[derive(Debug)]
pub struct InFlightClaim {
    in_flight: Arc<DashMap<String, ()>>,
    key: String,
}

impl Drop for InFlightClaim {
    fn drop(&mut self) {
        self.in_flight.remove(&self.key);
    }
}

pub struct IdempotencyCache {
    store: Arc<dyn IdempotencyStore>,
    ttl: Duration,
    in_flight: Arc<DashMap<String, ()>>,
}

impl IdempotencyCache {
    pub fn new(store: Arc<dyn IdempotencyStore>, ttl: Duration) -> Self {
        Self {
            store,
            ttl,
            in_flight: Arc::new(DashMap::new()),
        }
    }

    pub fn from_config(store: Arc<dyn IdempotencyStore>, config: &IdempotencyConfig) -> Self {
        Self::new(store, Duration::from_secs(config.ttl_secs))
    }

    /// `None` when the same caller already has a request with this key running.
    pub fn claim(&self, subject: &str, client_key: &str) -> Option<InFlightClaim> {
        let key = idempotency_key(subject, client_key);
        match self.in_flight.entry(key.clone()) {
            Entry::Occupied(_) => None,
            Entry::Vacant(slot) => {
                slot.insert(());
                Some(InFlightClaim {
                    in_flight: self.in_flight.clone(),
                    key,
                })
            }
        }
    }

    pub async fn lookup(&self, subject: &str, client_key: &str) -> Option<CachedResponse> {
        let key = idempotency_key(subject, client_key);
        match self.store.get(&key).await {
            Ok(hit) => {
                if hit.is_none() {
                    debug!(key = %key, "Idempotency miss");
                }
                hit
            }
            Err(e) => {
                error!(key = %key, error = %e, "Idempotency lookup failed, executing request");
                None
            }
        }
    }

    /// Stores `response` if it is a success and nothing is stored yet.
    pub async fn remember(&self, subject: &str, client_key: &str, response: &CachedResponse) {
        if !response.is_cacheable() {
            return;
        }
        let key = idempotency_key(subject, client_key);
        match self.store.put_if_absent(&key, response, self.ttl).await {
            Ok(true) => debug!(key = %key, "Idempotent response stored"),
            Ok(false) => debug!(key = %key, "Idempotent response already stored"),
            Err(e) => error!(key = %key, error = %e, "Failed to store idempotent response"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashMap;

    #[derive(Default)]
    struct MapStore {
        entries: Mutex<HashMap<String, CachedResponse>>,
    }

    #[async_trait]
    impl IdempotencyStore for MapStore {
        async fn get(&self, key: &str) -> Result<Option<CachedResponse>, CacheError> {
            Ok(self.entries.lock().get(key).cloned())
        }

        async fn put_if_absent(
            &self,
            key: &str,
            response: &CachedResponse,
            _ttl: Duration,
        ) -> Result<bool, CacheError> {
            let mut entries = self.entries.lock();
            if entries.contains_key(key) {
                return Ok(false);
            }
            entries.insert(key.to_string(), response.clone());
            Ok(true)
        }
    }

    struct Broken;

    #[async_trait]
    impl IdempotencyStore for Broken {
        async fn get(&self, _key: &str) -> Result<Option<CachedResponse>, CacheError> {
            Err(CacheError::Backend("timeout".into()))
        }

        async fn put_if_absent(
            &self,
            _key: &str,
            _response: &CachedResponse,
            _ttl: Duration,
        ) -> Result<bool, CacheError> {
            Err(CacheError::Backend("timeout".into()))
        }
    }

    fn response(status: u16, body: &str) -> CachedResponse {
        CachedResponse {
            status,
            content_type: Some("application/json".into()),
            body: body.as_bytes().to_vec(),
        }
    }

    #[tokio::test]
    async fn test_only_success_is_remembered() {
        let store = Arc::new(MapStore::default());
        let cache = IdempotencyCache::new(store.clone(), Duration::from_secs(300));

        cache.remember("alice", "k1", &response(409, "{}")).await;
        assert!(cache.lookup("alice", "k1").await.is_none());

        cache.remember("alice", "k1", &response(201, r#"{"ok":true}"#)).await;
        cache.remember("alice", "k1", &response(200, r#"{"ok":false}"#)).await;
        let hit = cache.lookup("alice", "k1").await.unwrap();
        assert_eq!(hit.status, 201);
        assert_eq!(hit.body, br#"{"ok":true}"#);

        assert!(cache.lookup("bob", "k1").await.is_none(), "keys are per caller");
        assert!(store.entries.lock().contains_key("idempotency:alice:k1"));
    }

    #[tokio::test]
    async fn test_store_failures_are_swallowed() {
        let cache = IdempotencyCache::new(Arc::new(Broken), Duration::from_secs(300));
        assert!(cache.lookup("alice", "k1").await.is_none());
        cache.remember("alice", "k1", &response(200, "{}")).await;
    }

    #[test]
    fn test_claim_blocks_duplicates_until_released() {
        let cache = IdempotencyCache::new(Arc::new(MapStore::default()), Duration::from_secs(300));

        let claim = cache.claim("alice", "k1").expect("first claim");
        assert!(cache.claim("alice", "k1").is_none());
        assert!(cache.claim("bob", "k1").is_some(), "claims are per caller");

        drop(claim);
        assert!(cache.claim("alice", "k1").is_some());
    }

    #[test]
    fn test_body_survives_json_encoding() {
        let original = CachedResponse {
            status: 200,
            content_type: None,
            body: vec![0, 159, 146, 150, b'{'],
        };
        let json = serde_json::to_string(&original).unwrap();
        let decoded: CachedResponse = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, original);
    }
}
