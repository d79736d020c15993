use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Semaphore};
use tokio::time::Instant;

/// Per-source call scheduler.
///
/// At most `max_concurrent` tasks run at once and two consecutive task starts
/// are at least `min_interval` apart. Waiters are served in arrival order since
/// both the tokio semaphore and mutex are fair.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    permits: Arc<Semaphore>,
    next_start: Arc<Mutex<Option<Instant>>>,
    min_interval: Duration,
    max_concurrent: usize,
}

impl RateLimiter {
    /// `max_concurrent` of zero is treated as one
    pub fn new(min_interval: Duration, max_concurrent: usize) -> Self {
        let max_concurrent = max_concurrent.max(1);
        Self {
            permits: Arc::new(Semaphore::new(max_concurrent)),
            next_start: Arc::new(Mutex::new(None)),
            min_interval,
            max_concurrent,
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Runs `task` once a concurrency slot and a start slot are free and hands
    /// back whatever it returns
    pub async fn schedule<F, Fut, T>(&self, task: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        // the semaphore is never closed
        let _permit = self.permits.acquire().await.ok();

        {
            let mut next_start = self.next_start.lock().await;
            if let Some(at) = *next_start {
                tokio::time::sleep_until(at).await;
            }
            *next_start = Some(Instant::now() + self.min_interval);
        }

        task().await
    }
}
