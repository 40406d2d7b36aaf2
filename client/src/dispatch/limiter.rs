//! Interval limiter: runs tasks one at a time, FIFO, with a minimum gap between the previous
//! task's completion and the next task's start.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinError;
use tokio::time::Instant;

/// Sequential task queue with interval pacing.
///
/// Queue order is the order in which callers reach [`schedule`](Self::schedule) (tokio's
/// mutex is fair). A caller dropped while still queued leaves without running; a task that
/// has started is spawned and runs to completion regardless of its caller.
#[derive(Debug)]
pub struct IntervalLimiter {
    interval: Duration,
    /// Completion time of the last task; holding the lock is holding the run slot.
    last_finished: Arc<Mutex<Option<Instant>>>,
}

impl IntervalLimiter {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_finished: Arc::new(Mutex::new(None)),
        }
    }

    /// Waits for this task's turn, paces it, runs it, and returns its output.
    ///
    /// The task's own errors are part of `T` and never stall the queue. `Err` only reports a
    /// task that panicked or was cancelled by runtime shutdown.
    pub async fn schedule<F, T>(&self, task: F) -> Result<T, JoinError>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let mut slot = Arc::clone(&self.last_finished).lock_owned().await;
        if let Some(finished) = *slot {
            let ready_at = finished + self.interval;
            if ready_at > Instant::now() {
                tracing::debug!(
                    wait_ms = (ready_at - Instant::now()).as_millis() as u64,
                    "pacing queued request"
                );
                tokio::time::sleep_until(ready_at).await;
            }
        }
        tokio::spawn(async move {
            let output = task.await;
            *slot = Some(Instant::now());
            output
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn starts_are_spaced_by_interval_after_completion() {
        let limiter = Arc::new(IntervalLimiter::new(Duration::from_millis(100)));
        let starts = Arc::new(StdMutex::new(Vec::new()));

        let mut handles = Vec::new();
        for _ in 0..4 {
            let limiter = limiter.clone();
            let starts = starts.clone();
            handles.push(tokio::spawn(async move {
                limiter
                    .schedule(async move {
                        starts.lock().unwrap().push(Instant::now());
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    })
                    .await
            }));
            tokio::task::yield_now().await;
        }
        for h in handles {
            h.await.unwrap().unwrap();
        }

        let starts = starts.lock().unwrap();
        assert_eq!(starts.len(), 4);
        for pair in starts.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_millis(110));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn first_task_starts_immediately() {
        let limiter = IntervalLimiter::new(Duration::from_secs(10));
        let before = Instant::now();
        limiter.schedule(async {}).await.unwrap();
        assert!(Instant::now() - before < Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn task_errors_do_not_halt_the_queue() {
        let limiter = IntervalLimiter::new(Duration::from_millis(5));
        let first: Result<(), &str> = limiter.schedule(async { Err("boom") }).await.unwrap();
        assert_eq!(first, Err("boom"));
        let second: Result<u8, &str> = limiter.schedule(async { Ok(7) }).await.unwrap();
        assert_eq!(second, Ok(7));
    }

    #[tokio::test(start_paused = true)]
    async fn runs_in_fifo_order() {
        let limiter = Arc::new(IntervalLimiter::new(Duration::from_millis(1)));
        let order = Arc::new(StdMutex::new(Vec::new()));
        let mut handles = Vec::new();
        for i in 0..5 {
            let limiter = limiter.clone();
            let order = order.clone();
            handles.push(tokio::spawn(async move {
                limiter
                    .schedule(async move { order.lock().unwrap().push(i) })
                    .await
            }));
            tokio::task::yield_now().await;
        }
        for h in handles {
            h.await.unwrap().unwrap();
        }
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    }
}
