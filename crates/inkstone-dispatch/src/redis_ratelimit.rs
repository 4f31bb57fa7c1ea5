//! Redis-backed sliding-window rate budget.
//!
//! One sorted set per credential fingerprint, scored by epoch milliseconds.
//! Expired members are removed before each decision; the set itself expires
//! `window + 10s` after the last touch so idle credentials leave no garbage.

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use tracing::{debug, info, warn};

use inkstone_types::config::DispatchConfig;

use crate::error::Result;
use crate::pool::mask_key;
use crate::ratelimit::{RateBudget, fingerprint};

const RATE_LIMIT_PREFIX: &str = "ratelimit:";

/// Shared-remote rate budget on Redis sorted sets.
pub struct RedisRateBudget {
    conn: ConnectionManager,
    window_seconds: u64,
    max_requests: usize,
}

impl RedisRateBudget {
    /// Connect to Redis using the configured URL.
    ///
    /// # Errors
    ///
    /// [`DispatchError::Redis`](crate::DispatchError::Redis) when the
    /// connection cannot be established.
    pub async fn connect(config: &DispatchConfig) -> Result<Self> {
        let client = redis::Client::open(config.redis_url.as_str())?;
        let conn = client.get_connection_manager().await?;
        info!(url = %config.redis_url, "redis rate budget connected");
        Ok(Self {
            conn,
            window_seconds: config.rate_limit_window_seconds,
            max_requests: config.rate_limit_max_requests,
        })
    }

    fn slot(key: &str) -> String {
        format!("{RATE_LIMIT_PREFIX}{}", fingerprint(key))
    }

    fn now_millis() -> i64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0)
    }
}

#[async_trait]
impl RateBudget for RedisRateBudget {
    async fn try_acquire(&self, key: &str) -> bool {
        let slot = Self::slot(key);
        let now = Self::now_millis();
        let window_start = now - (self.window_seconds as i64) * 1000;
        let mut conn = self.conn.clone();

        let cleanup: redis::RedisResult<()> =
            conn.zrembyscore(&slot, 0, window_start).await;
        if let Err(e) = cleanup {
            warn!(error = %e, "rate window cleanup failed; admitting");
            return true;
        }

        let count: usize = conn.zcard(&slot).await.unwrap_or(0);
        if count >= self.max_requests {
            debug!(
                key = %mask_key(key),
                used = count,
                max = self.max_requests,
                "rate budget rejected admission"
            );
            return false;
        }

        // Member must be unique even when two instances admit in the same
        // millisecond.
        let member = format!("{now}:{}", inkstone_types::id::short_uuid());
        let added: redis::RedisResult<()> = conn.zadd(&slot, member, now).await;
        if let Err(e) = added {
            warn!(error = %e, "rate window append failed");
        }
        let _: redis::RedisResult<()> = conn
            .expire(&slot, (self.window_seconds + 10) as i64)
            .await;
        true
    }

    async fn remaining_quota(&self, key: &str) -> usize {
        let slot = Self::slot(key);
        let window_start = Self::now_millis() - (self.window_seconds as i64) * 1000;
        let mut conn = self.conn.clone();

        let _: redis::RedisResult<()> = conn.zrembyscore(&slot, 0, window_start).await;
        let used: usize = conn.zcard(&slot).await.unwrap_or(0);
        self.max_requests.saturating_sub(used)
    }
}
