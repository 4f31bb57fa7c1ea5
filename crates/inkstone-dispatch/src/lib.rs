//! Credential pooling, sliding-window rate budgets and bounded-concurrency
//! dispatch for upstream AI calls.
//!
//! # Architecture
//!
//! - [`CredentialPool`] -- blocking borrow/return of API credentials with a
//!   failed queue and periodic recovery
//! - [`RateBudget`] -- per-credential sliding-window admission
//! - [`Dispatcher`] -- semaphore-bounded fan-out with retry and automatic
//!   credential lease handling
//! - [`RecoveryTicker`] -- moves cooled-down credentials back into rotation
//!
//! Both the pool and the budget come in two variants selected by
//! [`StorageType`](inkstone_types::config::StorageType): in-process queues for
//! single-node deployments, Redis-backed structures when several dispatcher
//! instances must share one credential pool.

pub mod dispatcher;
pub mod error;
pub mod pool;
pub mod ratelimit;
pub mod recovery;
pub mod redis_pool;
pub mod redis_ratelimit;

use std::sync::Arc;

use inkstone_types::config::{DispatchConfig, StorageType};

pub use dispatcher::Dispatcher;
pub use error::{DispatchError, Result};
pub use pool::{CredentialPool, InMemoryCredentialPool, mask_key};
pub use ratelimit::{InMemoryRateBudget, RateBudget};
pub use recovery::RecoveryTicker;
pub use redis_pool::RedisCredentialPool;
pub use redis_ratelimit::RedisRateBudget;

/// Build the credential pool variant selected by the configuration.
///
/// # Errors
///
/// Returns [`DispatchError::Redis`] when the Redis variant is selected and the
/// connection cannot be established.
pub async fn build_pool(config: &DispatchConfig) -> Result<Arc<dyn CredentialPool>> {
    match config.storage_type {
        StorageType::Memory => Ok(Arc::new(InMemoryCredentialPool::new(config))),
        StorageType::Redis => Ok(Arc::new(RedisCredentialPool::connect(config).await?)),
    }
}

/// Build the rate budget variant selected by the configuration.
///
/// # Errors
///
/// Returns [`DispatchError::Redis`] when the Redis variant is selected and the
/// connection cannot be established.
pub async fn build_budget(config: &DispatchConfig) -> Result<Arc<dyn RateBudget>> {
    match config.storage_type {
        StorageType::Memory => Ok(Arc::new(InMemoryRateBudget::new(config))),
        StorageType::Redis => Ok(Arc::new(RedisRateBudget::connect(config).await?)),
    }
}
