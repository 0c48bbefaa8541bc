//! One-for-one task supervision: a periodic worker owns no externally
//! consumed resource (just clones of shared state), so a panic can be
//! recovered by simply spawning a fresh instance in its place, the way a
//! supervisor restarts a crashed child rather than leaving it dead.

use crate::internal_events;
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use tokio::task::{AbortHandle, JoinHandle};
use tracing::warn;

/// Wraps a task factory so the running task is respawned whenever it
/// panics. A task that returns normally (rather than panicking) ends the
/// supervision loop — periodic workers are written as infinite loops, so
/// this only happens on deliberate early return.
pub struct SupervisedTask {
    outer: JoinHandle<()>,
    inner_abort: Arc<Mutex<Option<AbortHandle>>>,
}

impl SupervisedTask {
    pub fn spawn<F, Fut>(mut make: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let inner_abort: Arc<Mutex<Option<AbortHandle>>> = Arc::new(Mutex::new(None));
        let inner_abort_task = inner_abort.clone();

        let outer = tokio::spawn(async move {
            loop {
                let handle = tokio::spawn(make());
                *inner_abort_task.lock() = Some(handle.abort_handle());
                match handle.await {
                    Ok(()) => break,
                    Err(join_err) if join_err.is_cancelled() => break,
                    Err(join_err) => {
                        warn!(
                            error = %join_err,
                            message = %internal_events::SUPERVISED_TASK_RESTARTED
                        );
                    }
                }
            }
        });

        Self { outer, inner_abort }
    }

    /// Aborts both the currently running child and the supervising loop
    /// itself, so no further restart is attempted.
    pub fn abort(&self) {
        if let Some(handle) = self.inner_abort.lock().as_ref() {
            handle.abort();
        }
        self.outer.abort();
    }
}

impl Drop for SupervisedTask {
    fn drop(&mut self) {
        self.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn respawns_after_a_panic() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let task = {
            let attempts = attempts.clone();
            SupervisedTask::spawn(move || {
                let attempts = attempts.clone();
                async move {
                    let n = attempts.fetch_add(1, Ordering::SeqCst);
                    if n == 0 {
                        panic!("boom");
                    }
                    // second run: park forever so the test controls teardown.
                    std::future::pending::<()>().await;
                }
            })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(attempts.load(Ordering::SeqCst) >= 2);
        task.abort();
    }

    #[tokio::test]
    async fn abort_stops_further_restarts() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let task = {
            let attempts = attempts.clone();
            SupervisedTask::spawn(move || {
                let attempts = attempts.clone();
                async move {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    std::future::pending::<()>().await;
                }
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        task.abort();
        let seen = attempts.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(attempts.load(Ordering::SeqCst), seen);
    }
}
