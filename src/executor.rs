use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::time::timeout;
use tracing::{debug, instrument};

/// Why a job produced no value.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JobError {
    #[error("timed out after {limit:?}")]
    Timeout { limit: Duration },

    #[error("task panicked: {0}")]
    Panicked(String),

    #[error("task cancelled: {0}")]
    Cancelled(String),

    #[error("executor closed")]
    Closed,
}

/// Runs one async job per item with at most `concurrency_limit` in flight.
pub struct EnrichmentExecutor {
    semaphore: Arc<Semaphore>,
    concurrency_limit: usize,
    job_timeout: Duration,
}

impl EnrichmentExecutor {
    /// A limit of zero is raised to one.
    pub fn new(concurrency_limit: usize) -> Self {
        let concurrency_limit = concurrency_limit.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(concurrency_limit)),
            concurrency_limit,
            job_timeout: Duration::from_secs(300),
        }
    }

    /// Bounds each job; the clock starts once the job holds a permit.
    pub fn with_timeout(mut self, job_timeout: Duration) -> Self {
        self.job_timeout = job_timeout;
        self
    }

    pub fn concurrency_limit(&self) -> usize {
        self.concurrency_limit
    }

    /// Runs `job` for every item and returns the results in submission order.
    ///
    /// A job that times out or panics yields a [`JobError`] for its item only.
    #[instrument(skip_all, fields(jobs = items.len(), limit = self.concurrency_limit))]
    pub async fn run_all<T, R, F, Fut>(&self, items: Vec<T>, job: F) -> Vec<(T, Result<R, JobError>)>
    where
        T: Clone + Send + 'static,
        R: Send + 'static,
        F: Fn(T) -> Fut,
        Fut: Future<Output = R> + Send + 'static,
    {
        let mut handles = Vec::with_capacity(items.len());
        for item in items {
            let semaphore = Arc::clone(&self.semaphore);
            let job_timeout = self.job_timeout;
            let fut = job(item.clone());
            let handle = tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.map_err(|_| JobError::Closed)?;
                timeout(job_timeout, fut).await.map_err(|_| JobError::Timeout {
                    limit: job_timeout,
                })
            });
            handles.push((item, handle));
        }

        let mut results = Vec::with_capacity(handles.len());
        for (item, handle) in handles {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(e) if e.is_panic() => Err(JobError::Panicked(e.to_string())),
                Err(e) => Err(JobError::Cancelled(e.to_string())),
            };
            if let Err(e) = &outcome {
                debug!(error = %e, "job did not complete");
            }
            results.push((item, outcome));
        }
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_results_in_submission_order() {
        let executor = EnrichmentExecutor::new(3);
        let items: Vec<u64> = (0..10).collect();

        let results = executor
            .run_all(items, |n| async move {
                tokio::time::sleep(Duration::from_millis(20 - n * 2)).await;
                n * 10
            })
            .await;

        let values: Vec<_> = results.into_iter().map(|(n, r)| (n, r.unwrap())).collect();
        let expected: Vec<_> = (0..10).map(|n| (n, n * 10)).collect();
        assert_eq!(values, expected);
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let executor = EnrichmentExecutor::new(2);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let results = executor
            .run_all((0..8).collect::<Vec<u32>>(), |_| {
                let running = Arc::clone(&running);
                let peak = Arc::clone(&peak);
                async move {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                }
            })
            .await;

        assert_eq!(results.len(), 8);
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_timeout_affects_only_slow_job() {
        let executor = EnrichmentExecutor::new(4).with_timeout(Duration::from_millis(50));

        let results = executor
            .run_all(vec![1u64, 1000], |ms| async move {
                tokio::time::sleep(Duration::from_millis(ms)).await;
                ms
            })
            .await;

        assert_eq!(results[0].1, Ok(1));
        let err = results[1].1.clone().unwrap_err();
        assert_eq!(
            err,
            JobError::Timeout {
                limit: Duration::from_millis(50)
            }
        );
        assert_eq!(err.to_string(), "timed out after 50ms");
    }

    #[tokio::test]
    async fn test_panic_is_contained() {
        let executor = EnrichmentExecutor::new(2);

        let results = executor
            .run_all(vec![true, false], |explode| async move {
                if explode {
                    panic!("boom");
                }
                "ok"
            })
            .await;

        assert!(matches!(results[0].1, Err(JobError::Panicked(_))));
        assert_eq!(results[1].1, Ok("ok"));
    }

    #[test]
    fn test_zero_limit_is_raised() {
        assert_eq!(EnrichmentExecutor::new(0).concurrency_limit(), 1);
    }
}
