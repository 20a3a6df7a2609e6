//! Serial execution queue.
//!
//! Remote tree mutations are not safe to interleave: a delete racing ahead
//! of an earlier upload for the same path leaves the remote in a state the
//! local tree never had. [`SerialQueue`] drains enqueued units of work with
//! a single worker, strictly in submission order, starting entry N+1 only
//! after entry N has settled. The queue never inspects an entry's outcome;
//! entries log their own failures and the queue always advances.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::trace;

type Task = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Errors from the queue.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    /// The worker is gone; no further work is accepted.
    #[error("queue is closed")]
    Closed,
}

/// FIFO queue with a single draining worker.
pub struct SerialQueue {
    tx: mpsc::UnboundedSender<Task>,
    pending: Arc<AtomicUsize>,
    idle: Arc<tokio::sync::Notify>,
    worker: tokio::task::JoinHandle<()>,
}

impl Default for SerialQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl SerialQueue {
    /// Creates the queue and spawns its worker.
    pub fn new() -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Task>();
        let pending = Arc::new(AtomicUsize::new(0));
        let idle = Arc::new(tokio::sync::Notify::new());

        let pending_w = Arc::clone(&pending);
        let idle_w = Arc::clone(&idle);
        let worker = tokio::spawn(async move {
            // One entry in flight at a time: the next recv happens only
            // after the previous task has settled.
            while let Some(task) = rx.recv().await {
                task.await;
                if pending_w.fetch_sub(1, Ordering::SeqCst) == 1 {
                    idle_w.notify_waiters();
                }
                trace!("queue advanced");
            }
        });

        Self {
            tx,
            pending,
            idle,
            worker,
        }
    }

    /// Appends a unit of work to the queue.
    ///
    /// Runs immediately if the queue is idle, otherwise after everything
    /// already queued has settled. A unit that never completes stalls the
    /// queue permanently; there is no internal timeout.
    pub fn enqueue<F>(&self, task: F) -> Result<(), QueueError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.pending.fetch_add(1, Ordering::SeqCst);
        self.tx.send(Box::pin(task)).map_err(|_| {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            QueueError::Closed
        })
    }

    /// Number of entries submitted but not yet settled.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// Waits until every entry submitted so far has settled.
    pub async fn drained(&self) {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            // The worker signals with notify_waiters, which only reaches
            // already-registered futures: register before reading the count
            // so a settlement in between cannot slip past unobserved.
            notified.as_mut().enable();
            if self.pending.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Drains remaining entries, then stops the worker.
    pub async fn shutdown(self) {
        self.drained().await;
        drop(self.tx);
        let _ = self.worker.await;
    }
}
