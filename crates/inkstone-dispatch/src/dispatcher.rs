//! Bounded-concurrency dispatch with credential leasing and retry.
//!
//! Every dispatched attempt is pool-balanced: a borrowed credential is
//! either returned (success, or rate-limit rejection during admission) or
//! marked failed (task error). Retries absorb transient upstream failures
//! and short credential contention.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use inkstone_types::GradeError;
use inkstone_types::config::DispatchConfig;

use crate::error::{DispatchError, Result};
use crate::pool::CredentialPool;
use crate::ratelimit::RateBudget;

/// Concurrency-bounded executor over the credential pool.
///
/// Cheap to clone; clones share the same pool and budget.
#[derive(Clone)]
pub struct Dispatcher {
    pool: Arc<dyn CredentialPool>,
    budget: Arc<dyn RateBudget>,
    config: DispatchConfig,
}

impl Dispatcher {
    pub fn new(
        pool: Arc<dyn CredentialPool>,
        budget: Arc<dyn RateBudget>,
        config: DispatchConfig,
    ) -> Self {
        Self {
            pool,
            budget,
            config,
        }
    }

    /// The credential pool this dispatcher leases from.
    pub fn pool(&self) -> &Arc<dyn CredentialPool> {
        &self.pool
    }

    /// Run `runner(item, credential)` for every item concurrently.
    ///
    /// Concurrency is `min(available credentials, max_concurrent, items)`,
    /// at least 1. Results are returned in input order; items whose retries
    /// were exhausted appear as `None`.
    /// Items beyond `max_characters_per_batch` are not dispatched and come
    /// back as `None`.
    pub async fn dispatch_all<T, R, F, Fut>(&self, items: Vec<T>, runner: F) -> Vec<Option<R>>
    where
        T: Clone + Send + 'static,
        R: Send + 'static,
        F: Fn(T, String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<R, GradeError>> + Send,
    {
        let requested = items.len();
        if requested == 0 {
            return Vec::new();
        }

        let cap = self.config.max_characters_per_batch.max(1);
        let mut items = items;
        if requested > cap {
            warn!(requested, cap, "batch exceeds fan-out cap, excess items skipped");
            items.truncate(cap);
        }
        let total = items.len();

        let key_count = self.pool.available_count().await.max(1);
        let concurrency = key_count
            .min(self.config.max_concurrent)
            .min(total)
            .max(1);

        info!(
            tasks = total,
            available_keys = key_count,
            concurrency,
            "dispatching batch"
        );

        let semaphore = Arc::new(Semaphore::new(concurrency));
        let completed = Arc::new(AtomicUsize::new(0));
        let succeeded = Arc::new(AtomicUsize::new(0));
        let runner = Arc::new(runner);

        let mut handles = Vec::with_capacity(total);
        for (index, item) in items.into_iter().enumerate() {
            let dispatcher = self.clone();
            let semaphore = Arc::clone(&semaphore);
            let completed = Arc::clone(&completed);
            let succeeded = Arc::clone(&succeeded);
            let runner = Arc::clone(&runner);

            handles.push(tokio::spawn(async move {
                // Queue patiently for a slot instead of failing fast; this
                // is what makes single-key deployments viable.
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return None;
                };

                let outcome = dispatcher.execute_with_retry(item, runner.as_ref()).await;
                let result = match outcome {
                    Ok(result) => {
                        succeeded.fetch_add(1, Ordering::SeqCst);
                        Some(result)
                    }
                    Err(err) => {
                        warn!(task = index, error = %err, "task permanently failed");
                        None
                    }
                };

                let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                if done % 5 == 0 || done == total {
                    info!(
                        done,
                        total,
                        succeeded = succeeded.load(Ordering::SeqCst),
                        "batch progress"
                    );
                }
                result
            }));
        }

        let mut results = Vec::with_capacity(requested);
        for handle in handles {
            match handle.await {
                Ok(result) => results.push(result),
                Err(e) => {
                    warn!(error = %e, "dispatched task panicked");
                    results.push(None);
                }
            }
        }
        // Skipped overflow items still occupy their input positions.
        results.resize_with(requested, || None);

        info!(
            succeeded = succeeded.load(Ordering::SeqCst),
            total,
            "batch complete"
        );
        results
    }

    /// Run one task with the full retry policy.
    ///
    /// Up to `retry_count + 1` attempts. Credential exhaustion backs off
    /// `2000ms x attempt` without penalizing any key; any other task failure
    /// marks the leased credential failed and backs off `1000ms x attempt`.
    ///
    /// # Errors
    ///
    /// [`DispatchError::RetriesExhausted`] after the final attempt fails.
    pub async fn execute_with_retry<T, R, F, Fut>(&self, item: T, runner: &F) -> Result<R>
    where
        T: Clone,
        F: Fn(T, String) -> Fut,
        Fut: Future<Output = std::result::Result<R, GradeError>>,
    {
        let max_retries = self.config.retry_count;
        let mut last_message = String::from("no attempt made");

        for attempt in 0..=max_retries {
            let key = match self.borrow_with_rate().await {
                Ok(key) => key,
                Err(DispatchError::Exhausted(msg)) => {
                    debug!(attempt = attempt + 1, "credential unavailable, backing off");
                    last_message = msg;
                    sleep(Duration::from_millis(2000 * (attempt as u64 + 1))).await;
                    continue;
                }
                Err(other) => {
                    last_message = other.to_string();
                    sleep(Duration::from_millis(1000 * (attempt as u64 + 1))).await;
                    continue;
                }
            };

            match runner(item.clone(), key.clone()).await {
                Ok(result) => {
                    self.pool.return_key(key).await;
                    return Ok(result);
                }
                Err(err) => {
                    warn!(
                        attempt = attempt + 1,
                        attempts = max_retries + 1,
                        error = %err,
                        "task attempt failed"
                    );
                    last_message = err.to_string();
                    self.pool.mark_failed(key).await;
                    sleep(Duration::from_millis(1000 * (attempt as u64 + 1))).await;
                }
            }
        }

        Err(DispatchError::RetriesExhausted {
            attempts: max_retries + 1,
            message: last_message,
        })
    }

    /// Borrow a credential that also passes rate admission.
    ///
    /// Up to 3 sub-attempts: a key that fails admission is returned to the
    /// pool and the borrower pauses 1s before trying the next one.
    ///
    /// # Errors
    ///
    /// [`DispatchError::Exhausted`] when the pool times out or every
    /// sub-attempt was rate-rejected.
    pub async fn borrow_with_rate(&self) -> Result<String> {
        const ADMISSION_ATTEMPTS: u32 = 3;

        for _ in 0..ADMISSION_ATTEMPTS {
            let key = self.pool.borrow_key().await?;
            if self.budget.try_acquire(&key).await {
                return Ok(key);
            }
            self.pool.return_key(key).await;
            debug!("credential at rate limit, pausing before next borrow");
            sleep(Duration::from_secs(1)).await;
        }

        Err(DispatchError::Exhausted(
            "all credentials rate limited, try again later".into(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::InMemoryCredentialPool;
    use crate::ratelimit::InMemoryRateBudget;
    use tokio::sync::Mutex;

    async fn seeded_dispatcher(config: DispatchConfig, keys: &[&str]) -> Arc<Dispatcher> {
        let pool = Arc::new(InMemoryCredentialPool::new(&config));
        let budget = Arc::new(InMemoryRateBudget::new(&config));
        let dispatcher = Arc::new(Dispatcher::new(pool, budget, config));
        let keys: Vec<String> = keys.iter().map(|k| k.to_string()).collect();
        dispatcher.pool().add_keys(keys).await;
        dispatcher
    }

    #[tokio::test]
    async fn round_robin_over_two_keys() {
        let config = DispatchConfig {
            key_borrow_timeout_seconds: 5,
            ..DispatchConfig::default()
        };
        let dispatcher = seeded_dispatcher(config, &["k1", "k2"]).await;

        let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let seen_in_runner = Arc::clone(&seen);

        let results = dispatcher
            .dispatch_all(vec![1, 2, 3, 4], move |_item: i32, key: String| {
                let seen = Arc::clone(&seen_in_runner);
                async move {
                    seen.lock().await.push(key.clone());
                    Ok::<String, GradeError>(key)
                }
            })
            .await;

        assert_eq!(results.len(), 4);
        assert!(results.iter().all(Option::is_some));
        assert_eq!(dispatcher.pool().available_count().await, 2);
        assert_eq!(
            *seen.lock().await,
            vec!["k1".to_string(), "k2".into(), "k1".into(), "k2".into()]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn third_task_waits_out_the_rate_window() {
        let config = DispatchConfig {
            key_borrow_timeout_seconds: 5,
            rate_limit_window_seconds: 4,
            rate_limit_max_requests: 2,
            retry_count: 3,
            ..DispatchConfig::default()
        };
        let dispatcher = seeded_dispatcher(config, &["k1"]).await;

        let started = tokio::time::Instant::now();
        let results = dispatcher
            .dispatch_all(vec![1, 2, 3], |item: i32, _key: String| async move {
                Ok::<i32, GradeError>(item)
            })
            .await;

        assert_eq!(results, vec![Some(1), Some(2), Some(3)]);
        // The third task could only be admitted after the window slid.
        assert!(started.elapsed() >= Duration::from_secs(4));
        assert!(started.elapsed() < Duration::from_secs(30));
        assert_eq!(dispatcher.pool().available_count().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failing_task_marks_key_and_exhausts_retries() {
        let config = DispatchConfig {
            key_borrow_timeout_seconds: 1,
            retry_count: 3,
            ..DispatchConfig::default()
        };
        let dispatcher = seeded_dispatcher(config, &["k1"]).await;

        let err = dispatcher
            .execute_with_retry((), &|_item: (), _key: String| async move {
                Err::<(), GradeError>(GradeError::Upstream("HTTP 500".into()))
            })
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            DispatchError::RetriesExhausted { attempts: 4, .. }
        ));
        // k1 failed on the first attempt; later attempts found the pool empty.
        assert_eq!(dispatcher.pool().available_count().await, 0);
        assert_eq!(dispatcher.pool().failed_count().await, 1);

        // After a recovery tick the key is usable again.
        assert_eq!(dispatcher.pool().recover_failed_keys().await, 1);
        assert_eq!(dispatcher.pool().borrow_key().await.unwrap(), "k1");
    }

    #[tokio::test(start_paused = true)]
    async fn borrow_with_rate_gives_up_after_three_rejections() {
        let config = DispatchConfig {
            key_borrow_timeout_seconds: 5,
            rate_limit_window_seconds: 600,
            rate_limit_max_requests: 1,
            ..DispatchConfig::default()
        };
        let dispatcher = seeded_dispatcher(config, &["k1"]).await;

        // Use up the only admission in the window.
        let key = dispatcher.borrow_with_rate().await.unwrap();
        dispatcher.pool().return_key(key).await;

        let err = dispatcher.borrow_with_rate().await.unwrap_err();
        assert!(matches!(err, DispatchError::Exhausted(_)));
        // The rejected key was returned each time, never lost.
        assert_eq!(dispatcher.pool().available_count().await, 1);
    }

    #[tokio::test]
    async fn batch_cap_skips_overflow_items() {
        let config = DispatchConfig {
            key_borrow_timeout_seconds: 5,
            max_characters_per_batch: 2,
            ..DispatchConfig::default()
        };
        let dispatcher = seeded_dispatcher(config, &["k1"]).await;

        let results = dispatcher
            .dispatch_all(vec![1, 2, 3, 4], |item: i32, _key: String| async move {
                Ok::<i32, GradeError>(item)
            })
            .await;

        assert_eq!(results, vec![Some(1), Some(2), None, None]);
    }

    #[tokio::test]
    async fn empty_batch_returns_empty() {
        let config = DispatchConfig::default();
        let dispatcher = seeded_dispatcher(config, &["k1"]).await;
        let results = dispatcher
            .dispatch_all(Vec::<i32>::new(), |item: i32, _key: String| async move {
                Ok::<i32, GradeError>(item)
            })
            .await;
        assert!(results.is_empty());
    }
}
