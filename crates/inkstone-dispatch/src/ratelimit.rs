//! Per-credential sliding-window rate budget.
//!
//! Each credential is indexed by a stable fingerprint (hash) so the plaintext
//! key is never retained in the admission structure. Admission discards
//! timestamps older than the window and rejects once the remaining count
//! reaches the per-window maximum; the cleanup-and-append step is atomic per
//! credential, so at most `max` acquisitions succeed in any sliding window.

use std::collections::{HashMap, VecDeque};
use std::hash::{DefaultHasher, Hash, Hasher};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

use inkstone_types::config::DispatchConfig;

use crate::pool::mask_key;

/// Stable fingerprint of a credential, used as the window index.
pub fn fingerprint(key: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    hasher.finish()
}

/// Sliding-window admission per credential.
#[async_trait]
pub trait RateBudget: Send + Sync {
    /// Try to admit one request on this credential.
    /// Returns `false` when the window is full.
    async fn try_acquire(&self, key: &str) -> bool;

    /// Requests left in the current window for this credential.
    async fn remaining_quota(&self, key: &str) -> usize;
}

/// In-process budget: a timestamp queue per credential fingerprint.
pub struct InMemoryRateBudget {
    windows: Mutex<HashMap<u64, VecDeque<Instant>>>,
    window: Duration,
    max_requests: usize,
}

impl InMemoryRateBudget {
    pub fn new(config: &DispatchConfig) -> Self {
        Self {
            windows: Mutex::new(HashMap::new()),
            window: Duration::from_secs(config.rate_limit_window_seconds),
            max_requests: config.rate_limit_max_requests,
        }
    }

    fn evict_expired(window: Duration, timestamps: &mut VecDeque<Instant>, now: Instant) {
        while let Some(first) = timestamps.front() {
            if now.duration_since(*first) > window {
                timestamps.pop_front();
            } else {
                break;
            }
        }
    }
}

#[async_trait]
impl RateBudget for InMemoryRateBudget {
    async fn try_acquire(&self, key: &str) -> bool {
        let slot = fingerprint(key);
        let now = Instant::now();
        let mut windows = self.windows.lock().await;
        let timestamps = windows.entry(slot).or_default();

        Self::evict_expired(self.window, timestamps, now);

        if timestamps.len() >= self.max_requests {
            debug!(
                key = %mask_key(key),
                used = timestamps.len(),
                max = self.max_requests,
                "rate budget rejected admission"
            );
            return false;
        }

        timestamps.push_back(now);
        true
    }

    async fn remaining_quota(&self, key: &str) -> usize {
        let slot = fingerprint(key);
        let now = Instant::now();
        let mut windows = self.windows.lock().await;
        let Some(timestamps) = windows.get_mut(&slot) else {
            return self.max_requests;
        };

        Self::evict_expired(self.window, timestamps, now);
        if timestamps.is_empty() {
            // Drop idle windows so the map does not grow with dead keys.
            windows.remove(&slot);
            return self.max_requests;
        }
        self.max_requests.saturating_sub(timestamps.len())
    }
}
