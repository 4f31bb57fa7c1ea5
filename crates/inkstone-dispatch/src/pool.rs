//! The credential pool: blocking borrow/return of API keys.
//!
//! A credential is in exactly one place at any instant: the available queue,
//! the failed queue, or leased to a task. Every successful borrow must be
//! balanced by exactly one `return_key` or `mark_failed`.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use inkstone_types::config::DispatchConfig;

use crate::error::{DispatchError, Result};

/// Mask a credential for logging: at most the leading 8 characters survive.
pub fn mask_key(key: &str) -> String {
    if key.chars().count() <= 8 {
        return "***".into();
    }
    let head: String = key.chars().take(8).collect();
    format!("{head}***")
}

/// Rotating pool of upstream API credentials.
///
/// `borrow_key` blocks up to the configured timeout; returned keys go to the
/// tail so fresh borrowers prefer the longest-idle credential.
#[async_trait]
pub trait CredentialPool: Send + Sync {
    /// Borrow a credential from the head of the available queue.
    ///
    /// # Errors
    ///
    /// [`DispatchError::Exhausted`] when no credential becomes available
    /// within the borrow timeout.
    async fn borrow_key(&self) -> Result<String>;

    /// Return a credential to the tail of the available queue.
    async fn return_key(&self, key: String);

    /// Move a credential to the failed queue. It stays there until the next
    /// recovery tick.
    async fn mark_failed(&self, key: String);

    /// Append credentials to the available queue, skipping any already
    /// present in the pool.
    async fn add_keys(&self, keys: Vec<String>);

    /// Best-effort size of the available queue.
    async fn available_count(&self) -> usize;

    /// Best-effort size of the failed queue.
    async fn failed_count(&self) -> usize;

    /// Drain the failed queue back into the available queue.
    /// Returns the number of credentials recovered.
    async fn recover_failed_keys(&self) -> usize;
}

/// In-process pool backed by two queues, for single-node deployments.
pub struct InMemoryCredentialPool {
    available: Mutex<VecDeque<String>>,
    failed: Mutex<VecDeque<String>>,
    notify: Notify,
    borrow_timeout: Duration,
}

impl InMemoryCredentialPool {
    pub fn new(config: &DispatchConfig) -> Self {
        Self {
            available: Mutex::new(VecDeque::new()),
            failed: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            borrow_timeout: Duration::from_secs(config.key_borrow_timeout_seconds),
        }
    }
}

#[async_trait]
impl CredentialPool for InMemoryCredentialPool {
    async fn borrow_key(&self) -> Result<String> {
        let deadline = Instant::now() + self.borrow_timeout;
        loop {
            // Register interest before checking the queue so a concurrent
            // return cannot slip between the check and the wait.
            let notified = self.notify.notified();
            {
                let mut queue = self.available.lock().await;
                if let Some(key) = queue.pop_front() {
                    if !queue.is_empty() {
                        // Cascade the wakeup: Notify stores a single permit.
                        self.notify.notify_one();
                    }
                    debug!(key = %mask_key(&key), "credential borrowed");
                    return Ok(key);
                }
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero()
                || tokio::time::timeout(remaining, notified).await.is_err()
            {
                return Err(DispatchError::Exhausted(
                    "no credential available within borrow timeout".into(),
                ));
            }
        }
    }

    async fn return_key(&self, key: String) {
        debug!(key = %mask_key(&key), "credential returned");
        self.available.lock().await.push_back(key);
        self.notify.notify_one();
    }

    async fn mark_failed(&self, key: String) {
        warn!(key = %mask_key(&key), "credential marked failed");
        self.failed.lock().await.push_back(key);
    }

    async fn add_keys(&self, keys: Vec<String>) {
        let mut added = 0usize;
        {
            let mut available = self.available.lock().await;
            let failed = self.failed.lock().await;
            for key in keys {
                if available.contains(&key) || failed.contains(&key) {
                    continue;
                }
                available.push_back(key);
                added += 1;
            }
        }
        for _ in 0..added {
            self.notify.notify_one();
        }
        info!(count = added, "credentials added to pool");
    }

    async fn available_count(&self) -> usize {
        self.available.lock().await.len()
    }

    async fn failed_count(&self) -> usize {
        self.failed.lock().await.len()
    }

    async fn recover_failed_keys(&self) -> usize {
        let mut recovered = 0usize;
        loop {
            let Some(key) = self.failed.lock().await.pop_front() else {
                break;
            };
            self.available.lock().await.push_back(key);
            self.notify.notify_one();
            recovered += 1;
        }
        if recovered > 0 {
            info!(count = recovered, "failed credentials recovered");
        }
        recovered
    }
}
