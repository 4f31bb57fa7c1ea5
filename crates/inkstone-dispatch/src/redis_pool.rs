//! Redis-backed credential pool for multi-instance deployments.
//!
//! The available and failed queues live in two Redis lists so every
//! dispatcher instance shares one rotation. Borrow uses `BLPOP` with the
//! configured timeout; return and recovery use `RPUSH` so rotation stays
//! FIFO across instances.

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use tracing::{debug, info, warn};

use inkstone_types::config::DispatchConfig;

use crate::error::{DispatchError, Result};
use crate::pool::{CredentialPool, mask_key};

/// Shared-remote credential pool on Redis lists.
pub struct RedisCredentialPool {
    conn: ConnectionManager,
    pool_key: String,
    failed_key: String,
    borrow_timeout_seconds: u64,
}

impl RedisCredentialPool {
    /// Connect to Redis using the configured URL.
    ///
    /// # Errors
    ///
    /// [`DispatchError::Redis`] when the connection cannot be established.
    pub async fn connect(config: &DispatchConfig) -> Result<Self> {
        let client = redis::Client::open(config.redis_url.as_str())?;
        let conn = client.get_connection_manager().await?;
        info!(url = %config.redis_url, "redis credential pool connected");
        Ok(Self {
            conn,
            pool_key: config.key_pool_name.clone(),
            failed_key: config.failed_key_pool_name.clone(),
            borrow_timeout_seconds: config.key_borrow_timeout_seconds,
        })
    }
}

#[async_trait]
impl CredentialPool for RedisCredentialPool {
    async fn borrow_key(&self) -> Result<String> {
        let mut conn = self.conn.clone();
        let popped: Option<(String, String)> = conn
            .blpop(&self.pool_key, self.borrow_timeout_seconds as f64)
            .await?;
        match popped {
            Some((_, key)) => {
                debug!(key = %mask_key(&key), "credential borrowed");
                Ok(key)
            }
            None => Err(DispatchError::Exhausted(
                "no credential available within borrow timeout".into(),
            )),
        }
    }

    async fn return_key(&self, key: String) {
        debug!(key = %mask_key(&key), "credential returned");
        let mut conn = self.conn.clone();
        let result: redis::RedisResult<()> = conn.rpush(&self.pool_key, &key).await;
        if let Err(e) = result {
            warn!(error = %e, "failed to return credential to redis pool");
        }
    }

    async fn mark_failed(&self, key: String) {
        warn!(key = %mask_key(&key), "credential marked failed");
        let mut conn = self.conn.clone();
        let result: redis::RedisResult<()> = conn.rpush(&self.failed_key, &key).await;
        if let Err(e) = result {
            warn!(error = %e, "failed to push credential to failed queue");
        }
    }

    async fn add_keys(&self, keys: Vec<String>) {
        let mut conn = self.conn.clone();
        let mut added = 0usize;
        for key in keys {
            let in_pool: redis::RedisResult<Option<usize>> =
                conn.lpos(&self.pool_key, &key, redis::LposOptions::default()).await;
            if matches!(in_pool, Ok(Some(_))) {
                continue;
            }
            let result: redis::RedisResult<()> = conn.rpush(&self.pool_key, &key).await;
            if result.is_ok() {
                added += 1;
            }
        }
        info!(count = added, "credentials added to redis pool");
    }

    async fn available_count(&self) -> usize {
        let mut conn = self.conn.clone();
        conn.llen(&self.pool_key).await.unwrap_or(0)
    }

    async fn failed_count(&self) -> usize {
        let mut conn = self.conn.clone();
        conn.llen(&self.failed_key).await.unwrap_or(0)
    }

    async fn recover_failed_keys(&self) -> usize {
        let mut conn = self.conn.clone();
        let mut recovered = 0usize;
        loop {
            let popped: redis::RedisResult<Option<String>> =
                conn.lpop(&self.failed_key, None).await;
            match popped {
                Ok(Some(key)) => {
                    let result: redis::RedisResult<()> =
                        conn.rpush(&self.pool_key, &key).await;
                    if result.is_err() {
                        // Put it back rather than losing the credential.
                        let _: redis::RedisResult<()> =
                            conn.rpush(&self.failed_key, &key).await;
                        break;
                    }
                    recovered += 1;
                }
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "recovery drain interrupted");
                    break;
                }
            }
        }
        if recovered > 0 {
            info!(count = recovered, "failed credentials recovered");
        }
        recovered
    }
}
