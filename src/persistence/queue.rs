//! Serialized write queue
//!
//! Every submitted task runs on a single background worker, one at a time,
//! in the order `submit` was called. A task's result (or panic) is delivered
//! to its own submitter and never affects the tasks queued behind it.

use futures::FutureExt;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

type Job = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Queue errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    /// The worker is gone, typically because the runtime shut down
    #[error("Task queue is closed")]
    Closed,

    /// The task panicked while running
    #[error("Queued task panicked")]
    TaskPanicked,

    /// No tokio runtime to run the worker on
    #[error("Task queue requires a tokio runtime")]
    NoRuntime,
}

/// FIFO queue that runs async tasks strictly one after another
///
/// Cloning yields another handle onto the same worker.
#[derive(Clone)]
pub struct TaskQueue {
    sender: mpsc::UnboundedSender<Job>,
}

impl TaskQueue {
    /// Start a queue worker on the current tokio runtime
    ///
    /// Fails with `NoRuntime` when called outside one.
    pub fn new() -> Result<Self, QueueError> {
        let handle = Handle::try_current().map_err(|_| QueueError::NoRuntime)?;
        let (sender, receiver) = mpsc::unbounded_channel();
        handle.spawn(Self::run(receiver));
        Ok(Self { sender })
    }

    async fn run(mut receiver: mpsc::UnboundedReceiver<Job>) {
        debug!("Task queue worker started");
        let mut processed = 0u64;
        while let Some(job) = receiver.recv().await {
            job.await;
            processed += 1;
        }
        debug!("Task queue worker stopped after {} task(s)", processed);
    }

    /// Enqueue `task` and return a future for its output
    ///
    /// The task is queued immediately, before the returned future is polled,
    /// and runs even if that future is dropped.
    pub fn submit<F, T>(&self, task: F) -> impl Future<Output = Result<T, QueueError>> + Send + 'static
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let job: Job = Box::pin(async move {
            let outcome = AssertUnwindSafe(task)
                .catch_unwind()
                .await
                .map_err(|_| QueueError::TaskPanicked);
            // The submitter may have stopped waiting; the task still ran.
            let _ = tx.send(outcome);
        });
        let queued = self.sender.send(job).is_ok();

        async move {
            if !queued {
                return Err(QueueError::Closed);
            }
            match rx.await {
                Ok(outcome) => outcome,
                Err(_) => Err(QueueError::Closed),
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

impl fmt::Debug for TaskQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskQueue")
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    #[tokio::test]
    async fn test_tasks_run_in_submission_order() {
        let queue = TaskQueue::new().unwrap();
        let log = Arc::new(Mutex::new(Vec::new()));

        let mut pending = Vec::new();
        for i in 0..10u64 {
            let log = Arc::clone(&log);
            // Earlier tasks sleep longer, so any overlap would reorder the log
            pending.push(queue.submit(async move {
                tokio::time::sleep(Duration::from_millis(10 - i)).await;
                log.lock().unwrap().push(i);
                i
            }));
        }

        let results = futures::future::join_all(pending).await;
        let results: Vec<u64> = results.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(results, (0..10).collect::<Vec<_>>());
        assert_eq!(*log.lock().unwrap(), (0..10).collect::<Vec<_>>());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_at_most_one_task_in_flight() {
        let queue = TaskQueue::new().unwrap();
        let in_flight = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let queue = queue.clone();
            let in_flight = Arc::clone(&in_flight);
            let max_seen = Arc::clone(&max_seen);
            handles.push(tokio::spawn(async move {
                for _ in 0..5 {
                    let in_flight = Arc::clone(&in_flight);
                    let max_seen = Arc::clone(&max_seen);
                    queue
                        .submit(async move {
                            let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                            max_seen.fetch_max(now, Ordering::SeqCst);
                            tokio::task::yield_now().await;
                            in_flight.fetch_sub(1, Ordering::SeqCst);
                        })
                        .await
                        .unwrap();
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failing_task_does_not_poison_queue() {
        let queue = TaskQueue::new().unwrap();

        let failed = queue.submit(async { Err::<u32, String>("boom".to_string()) });
        let next = queue.submit(async { Ok::<u32, String>(7) });

        assert_eq!(failed.await.unwrap(), Err("boom".to_string()));
        assert_eq!(next.await.unwrap(), Ok(7));
    }

    #[tokio::test]
    async fn test_panicking_task_is_isolated() {
        let queue = TaskQueue::new().unwrap();

        let panicked = queue.submit(async {
            if true {
                panic!("task exploded");
            }
            1u32
        });
        let next = queue.submit(async { 2u32 });

        assert_eq!(panicked.await, Err(QueueError::TaskPanicked));
        assert_eq!(next.await, Ok(2));
    }

    #[test]
    fn test_new_outside_runtime() {
        assert_eq!(TaskQueue::new().err(), Some(QueueError::NoRuntime));
    }

    #[tokio::test]
    async fn test_dropped_submission_still_runs() {
        let queue = TaskQueue::new().unwrap();
        let ran = Arc::new(AtomicUsize::new(0));

        {
            let ran = Arc::clone(&ran);
            drop(queue.submit(async move {
                ran.fetch_add(1, Ordering::SeqCst);
            }));
        }
        // A later task completing implies the earlier one already ran
        queue.submit(async {}).await.unwrap();

        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }
}
