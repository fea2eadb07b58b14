// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::Script;
use std::time::Duration;
use uuid::Uuid;

use crate::domain::cache::CacheError;
use crate::resilience::rate_limiter::{RateDecision, RateLimitBackend};

// Sorted set of request timestamps (ms). Trim, count, conditionally add and
// refresh expiry in one server-side step.
const SLIDING_WINDOW_LUA: &str = r#"
local key = KEYS[1]
local now = tonumber(ARGV[1])
local window = tonumber(ARGV[2])
local limit = tonumber(ARGV[3])
redis.call('ZREMRANGEBYSCORE', key, '-inf', now - window)
local count = redis.call('ZCARD', key)
local allowed = 0
if count < limit then
    redis.call('ZADD', key, now, ARGV[4])
    count = count + 1
    allowed = 1
end
redis.call('PEXPIRE', key, window)
return {allowed, count}
"#;

pub struct RedisRateLimitBackend {
    conn: ConnectionManager,
    script: Script,
}

impl RedisRateLimitBackend {
    pub fn new(conn: ConnectionManager) -> Self {
        Self {
            conn,
            script: Script::new(SLIDING_WINDOW_LUA),
        }
    }
}

#[async_trait]
impl RateLimitBackend for RedisRateLimitBackend {
    async fn check_and_record(
        &self,
        key: &str,
        limit: u64,
        window: Duration,
    ) -> Result<RateDecision, CacheError> {
        let now_ms = chrono::Utc::now().timestamp_millis();
        let member = format!("{now_ms}-{}", Uuid::new_v4());
        let mut conn = self.conn.clone();

        let (allowed, count): (i64, i64) = self
            .script
            .key(key)
            .arg(now_ms)
            .arg(window.as_millis() as i64)
            .arg(limit)
            .arg(member)
            .invoke_async(&mut conn)
            .await?;

        Ok(RateDecision {
            allowed: allowed == 1,
            count: count.max(0) as u64,
        })
    }
}
