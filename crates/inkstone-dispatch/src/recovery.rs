//! Periodic recovery of failed credentials.
//!
//! Keys marked failed sit out one cooldown interval, then rejoin the
//! available queue. A transiently broken key (quota blip, upstream 5xx)
//! comes back on its own; a permanently dead key just cycles.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::pool::CredentialPool;

/// Ticker that drains the failed queue back into rotation at a fixed
/// interval.
pub struct RecoveryTicker {
    pool: Arc<dyn CredentialPool>,
    interval: Duration,
}

impl RecoveryTicker {
    pub fn new(pool: Arc<dyn CredentialPool>, cooldown_seconds: u64) -> Self {
        Self {
            pool,
            interval: Duration::from_secs(cooldown_seconds),
        }
    }

    /// Run the recovery loop until the token is cancelled.
    pub async fn run(&self, cancel: CancellationToken) {
        info!(
            interval_secs = self.interval.as_secs(),
            "credential recovery ticker started"
        );
        let mut interval = tokio::time::interval(self.interval);
        // The first tick fires immediately; skip it so fresh failures get a
        // full cooldown.
        interval.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("credential recovery ticker shutting down");
                    return;
                }
                _ = interval.tick() => {
                    let failed = self.pool.failed_count().await;
                    if failed > 0 {
                        info!(failed, "recovering failed credentials");
                        let recovered = self.pool.recover_failed_keys().await;
                        let available = self.pool.available_count().await;
                        info!(
                            recovered,
                            available,
                            "recovery tick complete"
                        );
                    }
                }
            }
        }
    }

    /// Spawn the loop as a background task, returning its cancellation token.
    pub fn spawn(self: Arc<Self>) -> CancellationToken {
        let cancel = CancellationToken::new();
        let child = cancel.clone();
        tokio::spawn(async move {
            self.run(child).await;
        });
        cancel
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::InMemoryCredentialPool;
    use inkstone_types::config::DispatchConfig;

    #[tokio::test(start_paused = true)]
    async fn recovers_after_cooldown() {
        let config = DispatchConfig {
            key_borrow_timeout_seconds: 1,
            ..DispatchConfig::default()
        };
        let pool = Arc::new(InMemoryCredentialPool::new(&config));
        pool.add_keys(vec!["k1".into()]).await;
        pool.mark_failed(pool.borrow_key().await.unwrap()).await;
        assert_eq!(pool.failed_count().await, 1);

        let ticker = Arc::new(RecoveryTicker::new(
            pool.clone() as Arc<dyn CredentialPool>,
            60,
        ));
        let cancel = ticker.spawn();

        // Before the cooldown elapses nothing moves.
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(pool.failed_count().await, 1);

        // One full interval later the key is back.
        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(pool.failed_count().await, 0);
        assert_eq!(pool.available_count().await, 1);

        cancel.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_stops_the_loop() {
        let config = DispatchConfig::default();
        let pool = Arc::new(InMemoryCredentialPool::new(&config));
        let ticker = Arc::new(RecoveryTicker::new(
            pool.clone() as Arc<dyn CredentialPool>,
            5,
        ));
        let cancel = ticker.spawn();
        cancel.cancel();

        // A failure after cancellation stays failed.
        pool.add_keys(vec!["k1".into()]).await;
        pool.mark_failed(pool.borrow_key().await.unwrap()).await;
        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(pool.failed_count().await, 1);
    }
}
